//! Concurrent fan-out of (page, processor) extraction tasks.
//!
//! Every pair runs as its own tokio task inside a `JoinSet`, bounded by a semaphore of
//! `max_parallelism` permits. The per-task timeout starts once the permit is held, so time
//! spent queueing never counts against a processor. Failures, timeouts, and panics are
//! recorded per pair and never abort sibling tasks.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;

use super::cancel::{CancelSignal, CancellationHandle};
use super::types::{
    ConfigurationError, ExtractionResult, PipelineError, TaskError, TaskFailure, clamp_confidence,
};
use crate::processors::{Document, Processor};

/// Concurrency and deadline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of tasks invoking processors at once.
    pub max_parallelism: usize,
    /// Budget for a single invocation, measured from permit acquisition.
    pub task_timeout: Duration,
    /// Budget for the whole document; expiry cancels outstanding tasks gracefully.
    pub document_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            task_timeout: Duration::from_secs(30),
            document_timeout: None,
        }
    }
}

impl OrchestratorConfig {
    /// Reject zero parallelism and zero timeouts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_parallelism == 0 {
            return Err(ConfigurationError::InvalidParallelism);
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigurationError::InvalidTimeout {
                name: "task_timeout",
            });
        }
        if self.document_timeout == Some(Duration::ZERO) {
            return Err(ConfigurationError::InvalidTimeout {
                name: "document_timeout",
            });
        }
        Ok(())
    }
}

/// Everything the orchestrator learned about a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestrationReport {
    /// Successful results per requested page, ordered by processor position.
    pub results: BTreeMap<u32, Vec<ExtractionResult>>,
    /// Task failures per page, ordered by processor position.
    pub failures: BTreeMap<u32, Vec<TaskFailure>>,
    /// Requested pages for which no processor succeeded.
    pub failed_pages: BTreeSet<u32>,
    /// Whether the run was cancelled gracefully (by the caller or the document deadline).
    pub cancelled: bool,
}

impl OrchestrationReport {
    /// Total number of recorded task failures.
    pub fn failure_count(&self) -> usize {
        self.failures.values().map(Vec::len).sum()
    }
}

type TaskKey = (u32, usize);
type TaskOutcome = Result<ExtractionResult, TaskError>;

/// Dispatches processors over pages.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build an orchestrator after validating its configuration.
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every processor over every requested page.
    pub async fn process(
        &self,
        document: &Document,
        processors: &[Arc<dyn Processor>],
        pages: &[u32],
    ) -> Result<OrchestrationReport, PipelineError> {
        self.process_with_cancellation(document, processors, pages, &CancellationHandle::new())
            .await
    }

    /// Like [`Orchestrator::process`], observing `cancellation`.
    pub async fn process_with_cancellation(
        &self,
        document: &Document,
        processors: &[Arc<dyn Processor>],
        pages: &[u32],
        cancellation: &CancellationHandle,
    ) -> Result<OrchestrationReport, PipelineError> {
        let pages = validate_pages(document, pages)?;
        if processors.is_empty() {
            return Err(PipelineError::NoProcessors);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks: JoinSet<(TaskKey, TaskOutcome)> = JoinSet::new();
        let mut keys: HashMap<task::Id, TaskKey> = HashMap::new();

        for &page in &pages {
            for (index, processor) in processors.iter().enumerate() {
                let processor = Arc::clone(processor);
                let document = document.clone();
                let semaphore = Arc::clone(&semaphore);
                let stop = stop_rx.clone();
                let task_timeout = self.config.task_timeout;
                let handle = tasks.spawn(async move {
                    let outcome =
                        run_task(processor, document, page, semaphore, stop, task_timeout).await;
                    ((page, index), outcome)
                });
                keys.insert(handle.id(), (page, index));
            }
        }

        tracing::info!(
            document = %document.id,
            pages = pages.len(),
            processors = processors.len(),
            tasks = tasks.len(),
            max_parallelism = self.config.max_parallelism,
            "Dispatched extraction tasks"
        );

        let mut external = cancellation.subscribe();
        let mut external_open = true;
        let deadline = self
            .config
            .document_timeout
            .map(|timeout| Instant::now() + timeout);
        let mut cancelled = false;
        let mut outcomes: Vec<(TaskKey, TaskOutcome)> = Vec::with_capacity(tasks.len());

        match cancellation.signal() {
            CancelSignal::Hard => return Err(abort(&mut tasks).await),
            CancelSignal::Graceful => {
                cancelled = true;
                stop_tx.send_replace(true);
            }
            CancelSignal::Running => {}
        }

        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((_, entry))) => outcomes.push(entry),
                    Some(Err(error)) => {
                        tracing::error!(error = %error, "Extraction task terminated abnormally");
                        outcomes.extend(join_failure(&keys, error));
                    }
                },
                changed = external.changed(), if external_open => {
                    if changed.is_err() {
                        external_open = false;
                        continue;
                    }
                    let signal = *external.borrow_and_update();
                    match signal {
                        CancelSignal::Hard => {
                            tracing::warn!(
                                document = %document.id,
                                "Hard cancellation requested; aborting tasks"
                            );
                            return Err(abort(&mut tasks).await);
                        }
                        CancelSignal::Graceful if !cancelled => {
                            tracing::info!(
                                document = %document.id,
                                "Graceful cancellation requested"
                            );
                            cancelled = true;
                            stop_tx.send_replace(true);
                        }
                        _ => {}
                    }
                },
                () = deadline_elapsed(deadline), if !cancelled => {
                    tracing::warn!(
                        document = %document.id,
                        timeout_ms = self
                            .config
                            .document_timeout
                            .map(|timeout| timeout.as_millis() as u64),
                        "Document timeout elapsed; cancelling outstanding tasks"
                    );
                    cancelled = true;
                    stop_tx.send_replace(true);
                }
            }
        }

        Ok(build_report(&pages, processors, outcomes, cancelled))
    }
}

fn validate_pages(document: &Document, pages: &[u32]) -> Result<Vec<u32>, PipelineError> {
    if pages.is_empty() {
        return Err(PipelineError::InvalidPageRange {
            reason: "no pages requested".to_string(),
        });
    }
    if let Some(page) = pages.iter().find(|page| **page >= document.page_count) {
        return Err(PipelineError::InvalidPageRange {
            reason: format!(
                "page {page} is out of bounds for a document with {} pages",
                document.page_count
            ),
        });
    }
    let unique: BTreeSet<u32> = pages.iter().copied().collect();
    Ok(unique.into_iter().collect())
}

async fn run_task(
    processor: Arc<dyn Processor>,
    document: Document,
    page: u32,
    semaphore: Arc<Semaphore>,
    mut stop: watch::Receiver<bool>,
    task_timeout: Duration,
) -> TaskOutcome {
    let _permit = tokio::select! {
        biased;
        () = stopped(&mut stop) => return Err(TaskError::Cancelled),
        permit = semaphore.acquire_owned() => permit.map_err(|_| TaskError::Cancelled)?,
    };

    let started = Instant::now();
    let invocation = processor.invoke(&document, page);
    let guarded = AssertUnwindSafe(invocation).catch_unwind();
    tokio::select! {
        biased;
        () = stopped(&mut stop) => Err(TaskError::Cancelled),
        finished = tokio::time::timeout(task_timeout, guarded) => match finished {
            Err(_) => Err(TaskError::Timeout {
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(panic)) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(outcome)) => outcome
                .map(|mut result| {
                    result.confidence_score = clamp_confidence(result.confidence_score);
                    result
                })
                .map_err(TaskError::from),
        },
    }
}

/// Resolves once the stop flag is raised; never resolves if the sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn abort(tasks: &mut JoinSet<(TaskKey, TaskOutcome)>) -> PipelineError {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    PipelineError::Aborted
}

/// Attribute a task that died outside its panic guard to its (page, processor) pair.
fn join_failure(
    keys: &HashMap<task::Id, TaskKey>,
    error: JoinError,
) -> Option<(TaskKey, TaskOutcome)> {
    let key = *keys.get(&error.id())?;
    let message = if error.is_panic() {
        panic_message(error.into_panic().as_ref())
    } else {
        error.to_string()
    };
    Some((key, Err(TaskError::Panicked(message))))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn build_report(
    pages: &[u32],
    processors: &[Arc<dyn Processor>],
    mut outcomes: Vec<(TaskKey, TaskOutcome)>,
    cancelled: bool,
) -> OrchestrationReport {
    outcomes.sort_by_key(|(key, _)| *key);

    let mut report = OrchestrationReport {
        cancelled,
        ..OrchestrationReport::default()
    };
    for page in pages {
        report.results.insert(*page, Vec::new());
    }

    for ((page, index), outcome) in outcomes {
        match outcome {
            Ok(result) => report.results.entry(page).or_default().push(result),
            Err(error) => {
                let processor = &processors[index];
                tracing::warn!(
                    page,
                    processor = processor.name(),
                    kind = %processor.kind(),
                    error = %error,
                    "Extraction task failed"
                );
                report.failures.entry(page).or_default().push(TaskFailure {
                    page_number: page,
                    processor_index: index,
                    processor_type: processor.kind(),
                    processor_name: processor.name().to_string(),
                    error,
                });
            }
        }
    }

    report.failed_pages = report
        .results
        .iter()
        .filter(|(_, results)| results.is_empty())
        .map(|(page, _)| *page)
        .collect();
    report
}
