use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagemerge::processing::{
    BoundingBox, CancellationHandle, ChunkerConfig, ExtractionResult, MergeError, MergeStrategy,
    OrchestratorConfig, Pipeline, PipelineError, PipelineOptions, ProcessorType, TaskError,
};
use pagemerge::processors::{Document, Processor, ProcessorFailure, ProcessorSet};

#[derive(Clone)]
enum Reply {
    Text {
        text: String,
        confidence: f64,
        boxes: Option<Vec<BoundingBox>>,
    },
    Fail,
}

/// Processor that answers from a fixed per-page script, optionally after a delay.
struct Scripted {
    kind: ProcessorType,
    name: &'static str,
    delay: Duration,
    replies: BTreeMap<u32, Reply>,
}

impl Scripted {
    fn new(kind: ProcessorType, name: &'static str) -> Self {
        Self {
            kind,
            name,
            delay: Duration::ZERO,
            replies: BTreeMap::new(),
        }
    }

    fn text(mut self, page: u32, text: &str, confidence: f64) -> Self {
        self.replies.insert(
            page,
            Reply::Text {
                text: text.to_string(),
                confidence,
                boxes: None,
            },
        );
        self
    }

    fn boxed(mut self, page: u32, text: &str, confidence: f64, bbox: BoundingBox) -> Self {
        self.replies.insert(
            page,
            Reply::Text {
                text: text.to_string(),
                confidence,
                boxes: Some(vec![bbox]),
            },
        );
        self
    }

    fn failing(mut self, page: u32) -> Self {
        self.replies.insert(page, Reply::Fail);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn shared(self) -> Arc<dyn Processor> {
        Arc::new(self)
    }
}

#[async_trait]
impl Processor for Scripted {
    fn kind(&self) -> ProcessorType {
        self.kind
    }

    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(
        &self,
        _document: &Document,
        page_number: u32,
    ) -> Result<ExtractionResult, ProcessorFailure> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.replies.get(&page_number).cloned() {
            Some(Reply::Text {
                text,
                confidence,
                boxes,
            }) => {
                let result = ExtractionResult::new(self.kind, page_number, text, confidence);
                Ok(match boxes {
                    Some(boxes) => result.with_bounding_boxes(boxes),
                    None => result,
                })
            }
            Some(Reply::Fail) => Err(ProcessorFailure::Remote("scripted failure".into())),
            None => Err(ProcessorFailure::MissingPage(page_number)),
        }
    }
}

fn document(pages: usize) -> Document {
    Document::from_text("fixture.txt", &vec!["placeholder"; pages].join("\u{c}"))
}

fn pipeline() -> Pipeline {
    Pipeline::new(PipelineOptions::default()).expect("default options are valid")
}

fn pipeline_with(task_timeout: Duration, document_timeout: Option<Duration>) -> Pipeline {
    Pipeline::new(PipelineOptions {
        orchestrator: OrchestratorConfig {
            max_parallelism: 4,
            task_timeout,
            document_timeout,
        },
        ..PipelineOptions::default()
    })
    .expect("valid options")
}

#[tokio::test]
async fn near_duplicate_reads_keep_the_best_text() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(1, "This is a test document.", 0.9)
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(1, "This is a test docment.", 0.7)
            .shared(),
    ];
    let outcome = pipeline()
        .run(&document(2), &processors, &[1])
        .await
        .expect("run succeeds");

    assert_eq!(outcome.merged.len(), 1);
    let merged = &outcome.merged[0];
    assert_eq!(merged.page_number, 1);
    assert_eq!(merged.text_content, "This is a test document.");
    assert_eq!(merged.confidence_score, 0.9);
    assert_eq!(merged.strategy, MergeStrategy::NearDuplicate);
    assert_eq!(outcome.chunks.len(), 1);
    assert_eq!(outcome.chunks[0].content, "This is a test document.");
}

#[tokio::test]
async fn overlapping_boxes_merge_into_one() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .boxed(
                1,
                "Invoice total",
                0.9,
                BoundingBox::new(10.0, 10.0, 100.0, 50.0),
            )
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .boxed(
                1,
                "Invoice total",
                0.8,
                BoundingBox::new(12.0, 11.0, 98.0, 48.0),
            )
            .shared(),
    ];
    let outcome = pipeline()
        .run(&document(2), &processors, &[1])
        .await
        .expect("run succeeds");

    let boxes = outcome.merged[0]
        .bounding_boxes
        .as_ref()
        .expect("boxes survive merging");
    assert_eq!(boxes.len(), 1);
    assert!(boxes[0].x >= 10.0 && boxes[0].x <= 12.0);
}

#[tokio::test]
async fn low_confidence_page_is_reported_failed() {
    let processors = vec![
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Readable page.", 0.9)
            .text(1, "smudged", 0.3)
            .shared(),
        Scripted::new(ProcessorType::LayoutAnalysis, "layout")
            .text(0, "Readable page.", 0.9)
            .text(1, "smudgd", 0.2)
            .shared(),
    ];
    let outcome = pipeline()
        .run(&document(2), &processors, &[0, 1])
        .await
        .expect("run succeeds");

    assert_eq!(outcome.merged.len(), 1);
    assert_eq!(outcome.merged[0].page_number, 0);
    assert_eq!(outcome.failed_pages.len(), 1);
    assert_eq!(
        outcome.failed_pages[0].error,
        MergeError::NoViableSource {
            page_number: 1,
            considered: 2,
            excluded: 2
        }
    );
    assert!(!outcome.quality.contains_key(&1));
}

#[tokio::test]
async fn long_page_is_cut_into_overlapping_windows() {
    let text = (0..2500)
        .map(|index| format!("word{index}"))
        .collect::<Vec<_>>()
        .join(" ");
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(0, &text, 0.95)
            .shared(),
    ];
    let pipeline = Pipeline::new(PipelineOptions {
        chunker: ChunkerConfig {
            max_chunk_size: 1000,
            min_chunk_size: 250,
            overlap: 100,
            respect_paragraphs: false,
        },
        ..PipelineOptions::default()
    })
    .expect("valid options");

    let outcome = pipeline
        .run(&document(1), &processors, &[0])
        .await
        .expect("run succeeds");

    assert_eq!(outcome.chunks.len(), 3);
    assert!(outcome.chunks.iter().all(|chunk| chunk.word_count <= 1000));
    assert!(!outcome.chunks[0].has_overlap);
    assert!(outcome.chunks[1].has_overlap);
    assert!(outcome.chunks[2].has_overlap);
}

#[tokio::test]
async fn one_failing_processor_leaves_a_partial_failure() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(0, "Native text for page zero.", 0.9)
            .text(1, "Native text for page one.", 0.9)
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Native text for page zero.", 0.85)
            .failing(1)
            .shared(),
    ];
    let outcome = pipeline()
        .run(&document(2), &processors, &[0, 1])
        .await
        .expect("run succeeds");

    assert_eq!(outcome.merged.len(), 2);
    assert!(outcome.failed_pages.is_empty());
    assert_eq!(outcome.partial_failures.len(), 1);
    let failure = &outcome.partial_failures[0];
    assert_eq!(failure.page_number, 1);
    assert_eq!(failure.processor_name, "ocr");
    assert!(matches!(failure.error, TaskError::Failed(_)));
}

#[tokio::test]
async fn page_where_every_processor_fails_carries_its_causes() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(0, "Fine.", 0.9)
            .failing(1)
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Fine.", 0.9)
            .failing(1)
            .shared(),
    ];
    let outcome = pipeline()
        .run(&document(2), &processors, &[0, 1])
        .await
        .expect("run succeeds");

    assert_eq!(outcome.failed_pages.len(), 1);
    let failed = &outcome.failed_pages[0];
    assert_eq!(failed.page_number, 1);
    assert_eq!(failed.task_failures.len(), 2);
    assert!(outcome.partial_failures.is_empty());
}

#[tokio::test]
async fn slow_processor_times_out_and_page_still_merges() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(0, "Quick answer.", 0.9)
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Quick answer.", 0.9)
            .delayed(Duration::from_secs(10))
            .shared(),
    ];
    let outcome = pipeline_with(Duration::from_millis(100), None)
        .run(&document(1), &processors, &[0])
        .await
        .expect("run succeeds");

    assert_eq!(outcome.merged.len(), 1);
    assert_eq!(outcome.merged[0].source_count, 1);
    assert!(matches!(outcome.partial_failures[0].error, TaskError::Timeout { .. }));
}

#[tokio::test]
async fn graceful_cancellation_keeps_completed_pages() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(0, "Finished before cancellation.", 0.9)
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Never arrives.", 0.9)
            .delayed(Duration::from_secs(10))
            .shared(),
    ];
    let handle = CancellationHandle::new();
    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let outcome = pipeline_with(Duration::from_secs(30), None)
        .run_with_cancellation(&document(1), &processors, &[0], &handle)
        .await
        .expect("graceful cancellation still yields an outcome");

    assert!(outcome.cancelled);
    assert_eq!(outcome.merged.len(), 1);
    assert_eq!(
        outcome.merged[0].text_content,
        "Finished before cancellation."
    );
    assert_eq!(outcome.partial_failures[0].error, TaskError::Cancelled);
}

#[tokio::test]
async fn document_timeout_behaves_like_graceful_cancellation() {
    let processors = vec![
        Scripted::new(ProcessorType::TextExtraction, "native")
            .text(0, "In time.", 0.9)
            .shared(),
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Too late.", 0.9)
            .delayed(Duration::from_secs(10))
            .shared(),
    ];
    let outcome = pipeline_with(Duration::from_secs(30), Some(Duration::from_millis(100)))
        .run(&document(1), &processors, &[0])
        .await
        .expect("run succeeds");

    assert!(outcome.cancelled);
    assert_eq!(outcome.merged[0].text_content, "In time.");
}

#[tokio::test]
async fn hard_cancellation_aborts_and_is_counted() {
    let processors = vec![
        Scripted::new(ProcessorType::Ocr, "ocr")
            .text(0, "Never arrives.", 0.9)
            .delayed(Duration::from_secs(10))
            .shared(),
    ];
    let handle = CancellationHandle::new();
    let aborter = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        aborter.abort();
    });

    let pipeline = pipeline_with(Duration::from_secs(30), None);
    let result = pipeline
        .run_with_cancellation(&document(1), &processors, &[0], &handle)
        .await;

    assert!(matches!(result, Err(PipelineError::Aborted)));
    assert_eq!(pipeline.metrics().snapshot().runs_aborted, 1);
}

#[tokio::test]
async fn out_of_range_pages_fail_before_dispatch() {
    let processors = vec![Scripted::new(ProcessorType::Ocr, "ocr").shared()];
    let result = pipeline().run(&document(2), &processors, &[0, 5]).await;
    assert!(matches!(result, Err(PipelineError::InvalidPageRange { .. })));

    let empty = pipeline().run(&document(2), &processors, &[]).await;
    assert!(matches!(empty, Err(PipelineError::InvalidPageRange { .. })));
}

#[tokio::test]
async fn repeated_runs_produce_identical_results() {
    let set = ProcessorSet::new()
        .with(
            Scripted::new(ProcessorType::TextExtraction, "native")
                .text(0, "Column one text.", 0.8)
                .text(1, "Second page body.", 0.9)
                .shared(),
        )
        .with(
            Scripted::new(ProcessorType::Ocr, "ocr")
                .text(0, "Column two, read by OCR.", 0.85)
                .text(1, "Second page bdy.", 0.75)
                .delayed(Duration::from_millis(5))
                .shared(),
        )
        .with(
            Scripted::new(ProcessorType::LayoutAnalysis, "layout")
                .text(0, "Column one text", 0.8)
                .text(1, "Second page body.", 0.8)
                .shared(),
        );
    set.start_all().await;

    let pipeline = pipeline();
    let first = pipeline
        .run(&document(2), set.as_slice(), &[1, 0])
        .await
        .expect("first run");
    let second = pipeline
        .run(&document(2), set.as_slice(), &[0, 1])
        .await
        .expect("second run");
    set.shutdown_all().await;

    assert_eq!(first.merged, second.merged);
    assert_eq!(first.chunks, second.chunks);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(pipeline.metrics().snapshot().documents_processed, 2);
}
