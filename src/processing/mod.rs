//! Reconciliation pipeline: orchestration, merging, quality scoring, and chunking.

mod boxes;
pub mod cancel;
pub mod chunking;
pub mod merger;
pub mod orchestrator;
pub mod quality;
mod service;
pub mod similarity;
pub mod types;

pub use boxes::{overlap_ratio, reconcile_boxes};
pub use cancel::{CancelSignal, CancellationHandle};
pub use chunking::{Chunker, ChunkerConfig};
pub use merger::{MergeBatch, Merger, MergerConfig};
pub use orchestrator::{OrchestrationReport, Orchestrator, OrchestratorConfig};
pub use quality::{QualityConfig, QualityScorer, QualityWeights, Scorable};
pub use service::{Pipeline, PipelineOptions, PipelineOutcome};
pub use types::{
    BoundingBox, ConfigurationError, ExtractionResult, MalformedResult, MergeError,
    MergeStrategy, MergedResult, Metadata, PageFailure, PageQuality, PipelineError,
    ProcessorType, QualityMetrics, RawExtraction, TaskError, TaskFailure, TextChunk,
};
