//! Core data types and error definitions for the reconciliation pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::processors::ProcessorFailure;

/// Provenance and diagnostic metadata attached to a result.
///
/// A `BTreeMap` keeps serialization and merge order stable across runs.
pub type Metadata = BTreeMap<String, Value>;

/// Kind of processor that produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorType {
    /// Native text layer extraction.
    TextExtraction,
    /// Optical character recognition.
    Ocr,
    /// Layout analysis (regions, reading order).
    LayoutAnalysis,
    /// Table structure detection.
    TableDetection,
    /// Abstractive or extractive summarization.
    Summarization,
}

impl ProcessorType {
    /// Stable snake_case label used in logs and provenance keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextExtraction => "text_extraction",
            Self::Ocr => "ocr",
            Self::LayoutAnalysis => "layout_analysis",
            Self::TableDetection => "table_detection",
            Self::Summarization => "summarization",
        }
    }

    /// Ordering used when complementary text carries no spatial information.
    ///
    /// Lower values come first: native text before OCR before layout analysis.
    pub fn priority(&self) -> u8 {
        match self {
            Self::TextExtraction => 0,
            Self::Ocr => 1,
            Self::LayoutAnalysis => 2,
            Self::TableDetection => 3,
            Self::Summarization => 4,
        }
    }
}

impl fmt::Display for ProcessorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessorType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text_extraction" | "text" => Ok(Self::TextExtraction),
            "ocr" => Ok(Self::Ocr),
            "layout_analysis" | "layout" => Ok(Self::LayoutAnalysis),
            "table_detection" | "table" => Ok(Self::TableDetection),
            "summarization" => Ok(Self::Summarization),
            _ => Err(()),
        }
    }
}

/// Axis-aligned rectangle in page coordinates (origin top-left, y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl BoundingBox {
    /// Construct a box from its top-left corner and extent.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Covered area; zero for degenerate boxes.
    pub fn area(&self) -> f64 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    /// Whether every coordinate is finite and the extent is non-negative.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|value| value.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// Output of one processor for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Processor that produced the result.
    pub processor_type: ProcessorType,
    /// Page index within the document.
    pub page_number: u32,
    /// Extracted text; may be empty.
    pub text_content: String,
    /// Processor-reported reliability in `[0.0, 1.0]`.
    pub confidence_score: f64,
    /// Provenance such as engine name, language, or timings.
    #[serde(default)]
    pub metadata: Metadata,
    /// Spatial regions backing the text, when the processor reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
}

impl ExtractionResult {
    /// Build a result, clamping the confidence into `[0, 1]`.
    ///
    /// Non-finite confidences collapse to `0.0`; use [`RawExtraction::validate`] when the
    /// value comes from an untrusted source and should be rejected instead.
    pub fn new(
        processor_type: ProcessorType,
        page_number: u32,
        text_content: impl Into<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            processor_type,
            page_number,
            text_content: text_content.into(),
            confidence_score: clamp_confidence(confidence_score),
            metadata: Metadata::new(),
            bounding_boxes: None,
        }
    }

    /// Attach metadata, replacing any existing entries.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach bounding boxes.
    pub fn with_bounding_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.bounding_boxes = Some(boxes);
        self
    }
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Untrusted extraction payload as returned by a remote service.
///
/// Every field is optional on the wire; [`RawExtraction::validate`] enforces the
/// [`ExtractionResult`] contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    /// Reported processor kind.
    #[serde(default)]
    pub processor_type: Option<ProcessorType>,
    /// Reported page index.
    #[serde(default, alias = "page")]
    pub page_number: Option<u32>,
    /// Extracted text.
    #[serde(default, alias = "text")]
    pub text_content: Option<String>,
    /// Reported reliability.
    #[serde(default, alias = "confidence")]
    pub confidence_score: Option<f64>,
    /// Provenance metadata.
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Spatial regions.
    #[serde(default)]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
}

impl RawExtraction {
    /// Validate the payload for `expected_page`, filling the processor kind when absent.
    pub fn validate(
        self,
        expected_page: u32,
        fallback_type: ProcessorType,
    ) -> Result<ExtractionResult, MalformedResult> {
        let Some(page_number) = self.page_number else {
            return Err(MalformedResult::MissingPageNumber);
        };
        if page_number != expected_page {
            return Err(MalformedResult::PageMismatch {
                expected: expected_page,
                actual: page_number,
            });
        }
        let text_content = self.text_content.ok_or(MalformedResult::MissingText)?;
        let confidence_score = match self.confidence_score {
            None => 0.0,
            Some(value) if !value.is_finite() => {
                return Err(MalformedResult::InvalidConfidence(value));
            }
            Some(value) => value.clamp(0.0, 1.0),
        };
        if let Some(boxes) = &self.bounding_boxes
            && let Some(index) = boxes.iter().position(|bbox| !bbox.is_well_formed())
        {
            return Err(MalformedResult::InvalidBoundingBox { index });
        }

        Ok(ExtractionResult {
            processor_type: self.processor_type.unwrap_or(fallback_type),
            page_number,
            text_content,
            confidence_score,
            metadata: self.metadata.unwrap_or_default(),
            bounding_boxes: self.bounding_boxes,
        })
    }
}

/// How the text of a merged page was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Exactly one source contributed.
    SingleSource,
    /// All contributing texts were near-duplicates; the best read was kept.
    NearDuplicate,
    /// Disjoint texts were concatenated in reading or priority order.
    Complementary,
}

/// The single reconciled result for a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    /// Processor type of the primary (highest-confidence) source.
    pub processor_type: ProcessorType,
    /// Page index within the document.
    pub page_number: u32,
    /// Reconciled text.
    pub text_content: String,
    /// Reconciled confidence in `[0.0, 1.0]`.
    pub confidence_score: f64,
    /// Union of contributing metadata with provenance-qualified alternates.
    pub merged_metadata: Metadata,
    /// Reconciled spatial regions in reading order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
    /// Number of processor results that contributed.
    pub source_count: usize,
    /// Contributing processor kinds, in contribution order.
    pub sources: Vec<ProcessorType>,
    /// Reconciliation path taken for the text.
    pub strategy: MergeStrategy,
}

impl MergedResult {
    /// Wrap a lone result without altering its content.
    pub fn from_single(result: ExtractionResult) -> Self {
        Self {
            processor_type: result.processor_type,
            page_number: result.page_number,
            text_content: result.text_content,
            confidence_score: result.confidence_score,
            merged_metadata: result.metadata,
            bounding_boxes: result.bounding_boxes,
            source_count: 1,
            sources: vec![result.processor_type],
            strategy: MergeStrategy::SingleSource,
        }
    }
}

/// Bounded unit of page text handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Normalized chunk text (words joined by single spaces).
    pub content: String,
    /// Page the chunk was cut from.
    pub page_number: u32,
    /// Zero-based position within the page.
    pub chunk_index: usize,
    /// Number of words in `content`.
    pub word_count: usize,
    /// Number of characters in `content`.
    pub character_count: usize,
    /// Whether the chunk repeats trailing words of its predecessor.
    pub has_overlap: bool,
    /// Count of leading words repeated from the previous chunk.
    pub overlap_words: usize,
    /// Word offset of the first word in the normalized page text.
    pub start_offset: usize,
    /// Word offset one past the last word.
    pub end_offset: usize,
    /// Hex-encoded SHA-256 digest of `content`.
    pub chunk_hash: String,
}

/// Sub-metric breakdown produced by the quality scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Length relative to the expected baseline and sentence termination.
    pub completeness: f64,
    /// Formatting consistency (casing, whitespace, register).
    pub coherence: f64,
    /// Fraction of non-alphabetic, non-punctuation characters.
    pub noise_level: f64,
    /// Whitespace-delimited word count.
    pub word_count: usize,
    /// Weighted aggregate in `[0.0, 1.0]`.
    pub score: f64,
}

impl QualityMetrics {
    /// Metrics reported for empty text.
    pub const fn empty() -> Self {
        Self {
            completeness: 0.0,
            coherence: 0.0,
            noise_level: 0.0,
            word_count: 0,
            score: 0.0,
        }
    }
}

/// Reasons a processor payload violates the extraction contract.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MalformedResult {
    /// The payload omitted its page number.
    #[error("result is missing its page number")]
    MissingPageNumber,
    /// The payload answered for a different page than requested.
    #[error("result reports page {actual} but page {expected} was requested")]
    PageMismatch {
        /// Page the task asked for.
        expected: u32,
        /// Page the payload claims.
        actual: u32,
    },
    /// The payload carried no text at all (null or absent).
    #[error("result has no text content")]
    MissingText,
    /// Confidence could not be clamped into range.
    #[error("confidence {0} is not a finite number")]
    InvalidConfidence(f64),
    /// A bounding box had non-finite coordinates or a negative extent.
    #[error("bounding box {index} is malformed")]
    InvalidBoundingBox {
        /// Position of the offending box.
        index: usize,
    },
}

/// Invalid construction parameters for a pipeline component.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Chunks must hold at least one word.
    #[error("max_chunk_size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new words in every window.
    #[error("overlap ({overlap}) must be smaller than max_chunk_size ({max_chunk_size})")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested maximum chunk size.
        max_chunk_size: usize,
    },
    /// The minimum chunk size cannot exceed the maximum.
    #[error("min_chunk_size ({min_chunk_size}) exceeds max_chunk_size ({max_chunk_size})")]
    MinChunkExceedsMax {
        /// Requested minimum chunk size.
        min_chunk_size: usize,
        /// Requested maximum chunk size.
        max_chunk_size: usize,
    },
    /// A ratio or threshold fell outside `[0, 1]`.
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// Quality weights must be non-negative with a positive sum.
    #[error("quality weights must be non-negative and sum to a positive value")]
    InvalidWeights,
    /// At least one task must be allowed to run.
    #[error("max_parallelism must be greater than zero")]
    InvalidParallelism,
    /// Timeouts must be non-zero.
    #[error("{name} must be greater than zero")]
    InvalidTimeout {
        /// Parameter name.
        name: &'static str,
    },
}

/// Check that `value` lies in `[0, 1]`.
pub(crate) fn ensure_unit_interval(
    name: &'static str,
    value: f64,
) -> Result<(), ConfigurationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::ThresholdOutOfRange { name, value })
    }
}

/// Fatal errors returned by the orchestrator and pipeline entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Requested pages were empty or beyond the document bounds.
    #[error("invalid page range: {reason}")]
    InvalidPageRange {
        /// Human-readable description of the violation.
        reason: String,
    },
    /// No processors were supplied.
    #[error("at least one processor is required")]
    NoProcessors,
    /// A component rejected its configuration.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The run was hard-cancelled; no merged results were produced.
    #[error("processing aborted")]
    Aborted,
}

/// Why a single (page, processor) task did not yield a result.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    /// The task exceeded the per-task timeout.
    #[error("task timed out after {elapsed_ms} ms")]
    Timeout {
        /// Time spent before the task was abandoned.
        elapsed_ms: u64,
    },
    /// The processor reported a failure.
    #[error("processor failed: {0}")]
    Failed(#[from] ProcessorFailure),
    /// The task was cancelled before completing.
    #[error("task cancelled")]
    Cancelled,
    /// The processor panicked; the panic was contained to this task.
    #[error("processor panicked: {0}")]
    Panicked(String),
}

/// A recorded per-task failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    /// Page the task was processing.
    pub page_number: u32,
    /// Position of the processor in the caller's processor list.
    pub processor_index: usize,
    /// Kind of the failing processor.
    pub processor_type: ProcessorType,
    /// Name reported by the failing processor.
    pub processor_name: String,
    /// Classified cause.
    pub error: TaskError,
}

/// Errors raised while reconciling a page.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeError {
    /// Every source failed or was excluded by the confidence gate.
    #[error(
        "no viable source for page {page_number} ({considered} considered, {excluded} below confidence gate)"
    )]
    NoViableSource {
        /// Page that could not be merged.
        page_number: u32,
        /// Results offered to the merger.
        considered: usize,
        /// Results excluded by the confidence gate.
        excluded: usize,
    },
}

/// A page that produced no merged result, with every cause that led there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageFailure {
    /// The failed page.
    pub page_number: u32,
    /// Page-level reason.
    pub error: MergeError,
    /// Task failures recorded for the page.
    pub task_failures: Vec<TaskFailure>,
}

/// Per-page quality annotation emitted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageQuality {
    /// Sub-metric breakdown and aggregate.
    #[serde(flatten)]
    pub metrics: QualityMetrics,
    /// Whether the aggregate fell below the configured quality threshold.
    pub below_threshold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(page: Option<u32>, text: Option<&str>, confidence: Option<f64>) -> RawExtraction {
        RawExtraction {
            processor_type: None,
            page_number: page,
            text_content: text.map(str::to_string),
            confidence_score: confidence,
            metadata: None,
            bounding_boxes: None,
        }
    }

    #[test]
    fn validate_clamps_confidence_and_fills_type() {
        let result = raw(Some(2), Some("hello"), Some(1.7))
            .validate(2, ProcessorType::Ocr)
            .expect("valid payload");
        assert_eq!(result.confidence_score, 1.0);
        assert_eq!(result.processor_type, ProcessorType::Ocr);

        let low = raw(Some(2), Some("hello"), Some(-0.3))
            .validate(2, ProcessorType::Ocr)
            .expect("valid payload");
        assert_eq!(low.confidence_score, 0.0);
    }

    #[test]
    fn validate_defaults_missing_confidence_to_zero() {
        let result = raw(Some(0), Some("text"), None)
            .validate(0, ProcessorType::LayoutAnalysis)
            .expect("valid payload");
        assert_eq!(result.confidence_score, 0.0);
    }

    #[test]
    fn validate_rejects_contract_violations() {
        assert_eq!(
            raw(None, Some("x"), Some(0.5)).validate(1, ProcessorType::Ocr),
            Err(MalformedResult::MissingPageNumber)
        );
        assert_eq!(
            raw(Some(3), Some("x"), Some(0.5)).validate(1, ProcessorType::Ocr),
            Err(MalformedResult::PageMismatch {
                expected: 1,
                actual: 3
            })
        );
        assert_eq!(
            raw(Some(1), None, Some(0.5)).validate(1, ProcessorType::Ocr),
            Err(MalformedResult::MissingText)
        );
        assert!(matches!(
            raw(Some(1), Some("x"), Some(f64::NAN)).validate(1, ProcessorType::Ocr),
            Err(MalformedResult::InvalidConfidence(_))
        ));
    }

    #[test]
    fn validate_rejects_negative_box_extent() {
        let mut payload = raw(Some(1), Some("x"), Some(0.5));
        payload.bounding_boxes = Some(vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(0.0, 0.0, -1.0, 10.0),
        ]);
        assert_eq!(
            payload.validate(1, ProcessorType::Ocr),
            Err(MalformedResult::InvalidBoundingBox { index: 1 })
        );
    }

    #[test]
    fn raw_extraction_accepts_short_field_aliases() {
        let payload: RawExtraction = serde_json::from_value(json!({
            "page": 4,
            "text": "scanned",
            "confidence": 0.82,
            "metadata": { "ocr_engine": "tesseract" }
        }))
        .expect("deserialize");
        let result = payload.validate(4, ProcessorType::Ocr).expect("valid");
        assert_eq!(result.text_content, "scanned");
        assert_eq!(result.metadata["ocr_engine"], json!("tesseract"));
    }

    #[test]
    fn processor_type_round_trips_labels() {
        for kind in [
            ProcessorType::TextExtraction,
            ProcessorType::Ocr,
            ProcessorType::LayoutAnalysis,
            ProcessorType::TableDetection,
            ProcessorType::Summarization,
        ] {
            assert_eq!(kind.as_str().parse::<ProcessorType>(), Ok(kind));
        }
        assert!("unknown".parse::<ProcessorType>().is_err());
    }

    #[test]
    fn new_result_clamps_non_finite_confidence() {
        let result = ExtractionResult::new(ProcessorType::Ocr, 0, "x", f64::INFINITY);
        assert_eq!(result.confidence_score, 0.0);
    }
}
