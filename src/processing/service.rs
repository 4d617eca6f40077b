//! Pipeline service coordinating extraction, merging, scoring, and chunking.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::metrics::PipelineMetrics;
use crate::processing::{
    cancel::CancellationHandle,
    chunking::{Chunker, ChunkerConfig},
    merger::{Merger, MergerConfig},
    orchestrator::{Orchestrator, OrchestratorConfig},
    quality::{QualityConfig, QualityScorer},
    types::{
        ConfigurationError, MergedResult, PageFailure, PageQuality, PipelineError, TaskFailure,
        TextChunk, ensure_unit_interval,
    },
};
use crate::processors::{Document, Processor};

/// Every tunable of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOptions {
    /// Merge heuristics.
    pub merger: MergerConfig,
    /// Chunk sizing.
    pub chunker: ChunkerConfig,
    /// Concurrency and deadlines.
    pub orchestrator: OrchestratorConfig,
    /// Quality scorer weights and baselines.
    pub quality: QualityConfig,
    /// Pages whose aggregate quality falls below this are flagged.
    pub quality_threshold: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            merger: MergerConfig::default(),
            chunker: ChunkerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            quality: QualityConfig::default(),
            quality_threshold: 0.5,
        }
    }
}

impl PipelineOptions {
    /// Map environment configuration onto pipeline options.
    pub fn from_config(config: &Config) -> Self {
        let mut chunker = ChunkerConfig::with_max_chunk_size(config.max_chunk_size);
        if let Some(min) = config.min_chunk_size {
            chunker.min_chunk_size = min;
        }
        if let Some(overlap) = config.chunk_overlap {
            chunker.overlap = overlap;
        }
        chunker.respect_paragraphs = config.respect_paragraphs;

        Self {
            merger: MergerConfig {
                min_confidence: config.min_confidence,
                similarity_threshold: config.similarity_threshold,
                overlap_threshold: config.overlap_threshold,
                ..MergerConfig::default()
            },
            chunker,
            orchestrator: OrchestratorConfig {
                max_parallelism: config.max_parallelism,
                task_timeout: Duration::from_secs(config.task_timeout_secs),
                document_timeout: config.document_timeout_secs.map(Duration::from_secs),
            },
            quality: QualityConfig::default(),
            quality_threshold: config.quality_threshold,
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// Identifier of the processed document.
    pub document_id: String,
    /// Name of the processed document.
    pub document_name: String,
    /// Hex-encoded SHA-256 of the document payload.
    pub checksum: String,
    /// One merged result per successful page, ascending by page.
    pub merged: Vec<MergedResult>,
    /// Chunks of every merged page, in page then chunk order.
    pub chunks: Vec<TextChunk>,
    /// Quality annotation per merged page.
    pub quality: BTreeMap<u32, PageQuality>,
    /// Pages without a merged result, with their causes.
    pub failed_pages: Vec<PageFailure>,
    /// Task failures on pages that still merged.
    pub partial_failures: Vec<TaskFailure>,
    /// Whether the run was cancelled gracefully before every task finished.
    pub cancelled: bool,
    /// RFC 3339 completion timestamp.
    pub completed_at: String,
    /// Wall-clock duration of the run.
    pub elapsed_ms: u64,
}

/// Reconciliation pipeline: orchestrate, merge, score, chunk.
///
/// Construct once and reuse; a run keeps no state beyond its outcome, so concurrent runs
/// on the same pipeline are independent.
#[derive(Debug, Clone)]
pub struct Pipeline {
    orchestrator: Orchestrator,
    merger: Merger,
    scorer: QualityScorer,
    chunker: Chunker,
    quality_threshold: f64,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Validate `options` and assemble the pipeline components.
    pub fn new(options: PipelineOptions) -> Result<Self, ConfigurationError> {
        ensure_unit_interval("quality_threshold", options.quality_threshold)?;
        let scorer = QualityScorer::new(options.quality)?;
        Ok(Self {
            orchestrator: Orchestrator::new(options.orchestrator)?,
            merger: Merger::new(options.merger)?.with_quality_scorer(scorer.clone()),
            scorer,
            chunker: Chunker::new(options.chunker)?,
            quality_threshold: options.quality_threshold,
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Share an existing metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics registry updated by every run.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Process `pages` of `document` with `processors`.
    pub async fn run(
        &self,
        document: &Document,
        processors: &[Arc<dyn Processor>],
        pages: &[u32],
    ) -> Result<PipelineOutcome, PipelineError> {
        self.run_with_cancellation(document, processors, pages, &CancellationHandle::new())
            .await
    }

    /// Like [`Pipeline::run`], observing `cancellation`.
    pub async fn run_with_cancellation(
        &self,
        document: &Document,
        processors: &[Arc<dyn Processor>],
        pages: &[u32],
        cancellation: &CancellationHandle,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "pipeline_run",
            run_id = %run_id,
            document = %document.id,
            name = %document.name
        );
        self.execute(run_id, document, processors, pages, cancellation)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        document: &Document,
        processors: &[Arc<dyn Processor>],
        pages: &[u32],
        cancellation: &CancellationHandle,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        tracing::info!(
            pages = pages.len(),
            processors = processors.len(),
            "Pipeline run started"
        );

        let mut report = match self
            .orchestrator
            .process_with_cancellation(document, processors, pages, cancellation)
            .await
        {
            Ok(report) => report,
            Err(PipelineError::Aborted) => {
                self.metrics.record_aborted();
                tracing::warn!("Pipeline run aborted");
                return Err(PipelineError::Aborted);
            }
            Err(error) => return Err(error),
        };

        let batch = self.merger.merge_all(&report.results);

        let mut quality = BTreeMap::new();
        let mut chunks = Vec::new();
        for merged in &batch.merged {
            let metrics = self.scorer.score_detailed(merged);
            let below_threshold = metrics.score < self.quality_threshold;
            if below_threshold {
                tracing::debug!(
                    page = merged.page_number,
                    score = metrics.score,
                    "Page quality below threshold"
                );
            }
            quality.insert(
                merged.page_number,
                PageQuality {
                    metrics,
                    below_threshold,
                },
            );
            chunks.extend(self.chunker.chunk_merged(merged));
        }

        let failed_pages: Vec<PageFailure> = batch
            .failures
            .into_iter()
            .map(|(page_number, error)| PageFailure {
                page_number,
                error,
                task_failures: report.failures.remove(&page_number).unwrap_or_default(),
            })
            .collect();
        let partial_failures: Vec<TaskFailure> = report.failures.into_values().flatten().collect();

        let outcome = PipelineOutcome {
            run_id,
            document_id: document.id.clone(),
            document_name: document.name.clone(),
            checksum: document.checksum.clone(),
            merged: batch.merged,
            chunks,
            quality,
            failed_pages,
            partial_failures,
            cancelled: report.cancelled,
            completed_at: current_timestamp_rfc3339(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.metrics.record_outcome(&outcome);

        tracing::info!(
            merged = outcome.merged.len(),
            failed = outcome.failed_pages.len(),
            chunks = outcome.chunks.len(),
            partial_failures = outcome.partial_failures.len(),
            cancelled = outcome.cancelled,
            elapsed_ms = outcome.elapsed_ms,
            "Pipeline run finished"
        );
        Ok(outcome)
    }
}

pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
