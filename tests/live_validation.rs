use std::{env, sync::Arc, sync::Once};

use pagemerge::{
    config,
    processing::{Pipeline, PipelineOptions, ProcessorType},
    processors::{Document, HttpProcessor, HttpProcessorConfig, NativeTextProcessor, Processor},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("PAGEMERGE_OCR_URL", "http://127.0.0.1:8001");
        set_default_env("PAGEMERGE_LAYOUT_URL", "http://127.0.0.1:8002");
        config::init_config().expect("live configuration");
    });
    config::get_config()
}

fn remote(url: &str, kind: ProcessorType) -> HttpProcessor {
    HttpProcessor::new(HttpProcessorConfig::new(url, kind)).expect("client builds")
}

#[tokio::test]
#[ignore = "Requires a live OCR service"]
async fn live_ocr_service_answers_health_and_page() {
    let config = init_config_once();
    let url = config.ocr_url.as_deref().expect("OCR url configured");
    let ocr = remote(url, ProcessorType::Ocr);
    ocr.start().await.expect("OCR service should be healthy");

    let document = Document::from_text("live.txt", "The quick brown fox jumps over the lazy dog.");
    let result = ocr.invoke(&document, 0).await.expect("OCR extraction");
    assert_eq!(result.page_number, 0);
    assert!((0.0..=1.0).contains(&result.confidence_score));
}

#[tokio::test]
#[ignore = "Requires live OCR and layout services"]
async fn live_pipeline_merges_native_and_remote_reads() {
    let config = init_config_once();
    let mut processors: Vec<Arc<dyn Processor>> = vec![Arc::new(NativeTextProcessor::default())];
    if let Some(url) = config.ocr_url.as_deref() {
        processors.push(Arc::new(remote(url, ProcessorType::Ocr)));
    }
    if let Some(url) = config.layout_url.as_deref() {
        processors.push(Arc::new(remote(url, ProcessorType::LayoutAnalysis)));
    }

    let pipeline = Pipeline::new(PipelineOptions::from_config(config)).expect("pipeline");
    let document = Document::from_text(
        "live.txt",
        "Page one has a short paragraph of ordinary prose for the services to read.\u{c}Page two follows it.",
    );
    let outcome = pipeline
        .run(&document, &processors, &[0, 1])
        .await
        .expect("live run");

    assert_eq!(outcome.merged.len() + outcome.failed_pages.len(), 2);
    assert!(!outcome.chunks.is_empty(), "expected chunks: {outcome:?}");
}
