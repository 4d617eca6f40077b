use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pagemerge::{
    config::{self, Config},
    logging,
    processing::{CancellationHandle, Pipeline, PipelineError, PipelineOptions, ProcessorType},
    processors::{Document, HttpProcessor, HttpProcessorConfig, NativeTextProcessor, ProcessorSet},
};
use serde_json::json;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "pagemerge",
    version,
    about = "Extract, reconcile, and chunk document pages"
)]
struct Cli {
    /// Text files, or directories walked recursively for `.txt` files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Page indices to process (comma separated); defaults to every page.
    #[arg(long, value_delimiter = ',')]
    pages: Vec<u32>,
    /// Base URL of a remote OCR service.
    #[arg(long)]
    ocr_url: Option<String>,
    /// Base URL of a remote layout-analysis service.
    #[arg(long)]
    layout_url: Option<String>,
    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "pagemerge failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;

    let files = collect_inputs(&cli.inputs)?;
    if files.is_empty() {
        bail!("no .txt inputs found");
    }

    let processors = build_processors(config, &cli)?;
    let started = processors.start_all().await;
    tracing::info!(processors = processors.len(), started, "Processors ready");

    let pipeline = Pipeline::new(PipelineOptions::from_config(config))
        .context("invalid pipeline configuration")?;
    let cancellation = CancellationHandle::new();
    spawn_interrupt_listener(cancellation.clone());

    let mut outcomes = Vec::with_capacity(files.len());
    for path in &files {
        if cancellation.is_cancelled() {
            tracing::info!(path = %path.display(), "Skipping input after cancellation");
            continue;
        }
        let document = load_document(path).await?;
        if document.page_count == 0 {
            tracing::warn!(path = %path.display(), "Skipping empty document");
            continue;
        }
        let pages: Vec<u32> = if cli.pages.is_empty() {
            (0..document.page_count).collect()
        } else {
            cli.pages.clone()
        };

        match pipeline
            .run_with_cancellation(&document, processors.as_slice(), &pages, &cancellation)
            .await
        {
            Ok(outcome) => outcomes.push(outcome),
            Err(PipelineError::Aborted) => {
                processors.shutdown_all().await;
                bail!("processing aborted");
            }
            Err(err) => {
                processors.shutdown_all().await;
                return Err(err).with_context(|| format!("failed to process {}", path.display()));
            }
        }
    }

    processors.shutdown_all().await;

    let report = json!({
        "outcomes": outcomes,
        "metrics": pipeline.metrics().snapshot(),
    });
    let rendered = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    match &cli.output {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn build_processors(config: &Config, cli: &Cli) -> Result<ProcessorSet> {
    let mut processors = ProcessorSet::new().with(Arc::new(NativeTextProcessor::default()));
    let remotes = [
        (
            cli.ocr_url.as_ref().or(config.ocr_url.as_ref()),
            ProcessorType::Ocr,
        ),
        (
            cli.layout_url.as_ref().or(config.layout_url.as_ref()),
            ProcessorType::LayoutAnalysis,
        ),
    ];
    for (url, kind) in remotes {
        let Some(url) = url else { continue };
        let processor = HttpProcessor::new(HttpProcessorConfig {
            max_retries: config.http_max_retries,
            retry_backoff: Duration::from_millis(config.http_retry_backoff_ms),
            ..HttpProcessorConfig::new(url.clone(), kind)
        })
        .with_context(|| format!("failed to configure {kind} processor at {url}"))?;
        processors.push(Arc::new(processor));
    }
    Ok(processors)
}

fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| {
                    entry.file_type().is_file()
                        && entry.path().extension().is_some_and(|ext| ext == "txt")
                })
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("input {} does not exist", input.display());
        }
    }
    Ok(files)
}

async fn load_document(path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    };
    let document = match String::from_utf8(bytes) {
        Ok(text) => Document::from_text(name, &text),
        // Opaque payloads are still handed to remote processors as a single page.
        Err(err) => Document::from_bytes(name, err.into_bytes(), 1),
    };
    tracing::debug!(
        path = %path.display(),
        document = %document.id,
        pages = document.page_count,
        checksum = %document.checksum,
        "Loaded document"
    );
    Ok(document)
}

fn spawn_interrupt_listener(cancellation: CancellationHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received; finishing completed work (Ctrl-C again aborts)");
        cancellation.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received; aborting");
            cancellation.abort();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_walked_for_text_files_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("nested")).expect("nested dir");
        for name in ["b.txt", "a.txt", "nested/c.txt", "notes.md"] {
            std::fs::write(dir.path().join(name), "text").expect("fixture");
        }

        let files = collect_inputs(&[dir.path().to_path_buf()]).expect("inputs");
        let expected: Vec<PathBuf> = ["a.txt", "b.txt", "nested/c.txt"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn missing_input_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(collect_inputs(&[dir.path().join("absent.txt")]).is_err());
    }

    #[tokio::test]
    async fn text_files_are_paged_by_form_feeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "first page\u{c}second page\u{c}").expect("fixture");

        let document = load_document(&path).await.expect("document");
        assert_eq!(document.name, "report.txt");
        assert_eq!(document.page_count, 2);
    }

    #[tokio::test]
    async fn binary_files_become_a_single_opaque_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.txt");
        std::fs::write(&path, [0xff_u8, 0xfe, 0x00, 0x81]).expect("fixture");

        let document = load_document(&path).await.expect("document");
        assert_eq!(document.page_count, 1);
        assert_eq!(document.bytes.len(), 4);
    }
}
