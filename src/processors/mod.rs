//! Extraction processors and the documents they read.
//!
//! A [`Processor`] turns one page of a [`Document`] into an [`ExtractionResult`]. The
//! orchestrator invokes processors concurrently, so implementations must be `Send + Sync`
//! and must not rely on shared mutable state between invocations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::processing::{ExtractionResult, MalformedResult, ProcessorType};

mod native;
mod remote;

pub use native::{NativeTextConfig, NativeTextProcessor};
pub use remote::{HttpProcessor, HttpProcessorConfig};

/// Page separator used by plain-text renditions of paged documents.
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Immutable handle to the document being processed.
///
/// Cloning is cheap: the payload is reference counted and shared by every task.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier reported in outcomes and logs.
    pub id: String,
    /// Human-readable name, usually the source file name.
    pub name: String,
    /// Raw document payload.
    pub bytes: Arc<[u8]>,
    /// Number of addressable pages.
    pub page_count: u32,
    /// Hex-encoded SHA-256 digest of `bytes`.
    pub checksum: String,
}

impl Document {
    /// Wrap raw bytes with a known page count.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        page_count: u32,
    ) -> Self {
        let bytes = bytes.into();
        let checksum = hex::encode(Sha256::digest(&bytes));
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            bytes,
            page_count,
            checksum,
        }
    }

    /// Wrap UTF-8 text whose pages are separated by form feeds.
    ///
    /// A trailing separator does not open an extra page.
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        let page_count = count_pages(text);
        Self::from_bytes(name, text.as_bytes(), page_count)
    }

    /// Replace the generated identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

fn count_pages(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let mut pages = text.split(PAGE_SEPARATOR).count();
    if text.ends_with(PAGE_SEPARATOR) {
        pages -= 1;
    }
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Classified reasons a processor invocation failed.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProcessorFailure {
    /// The processor gave up waiting on its backend.
    #[error("processor timed out")]
    Timeout,
    /// The document payload could not be decoded.
    #[error("failed to decode document: {0}")]
    Decode(String),
    /// The requested page does not exist in the payload.
    #[error("page {0} is not present in the document")]
    MissingPage(u32),
    /// Transport-level failure talking to a remote service.
    #[error("remote processor error: {0}")]
    Remote(String),
    /// A remote service answered with a non-success status.
    #[error("remote processor returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The processor is not running.
    #[error("processor unavailable: {0}")]
    Unavailable(String),
    /// The processor produced a payload that violates the extraction contract.
    #[error("malformed result: {0}")]
    Malformed(#[from] MalformedResult),
}

/// A page-level extraction engine.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Kind of output this processor produces.
    fn kind(&self) -> ProcessorType;

    /// Instance name used in logs and failure records.
    fn name(&self) -> &str;

    /// Extract one page.
    async fn invoke(
        &self,
        document: &Document,
        page_number: u32,
    ) -> Result<ExtractionResult, ProcessorFailure>;

    /// Acquire backing resources before the first invocation.
    async fn start(&self) -> Result<(), ProcessorFailure> {
        Ok(())
    }

    /// Release backing resources; later invocations may fail with `Unavailable`.
    async fn shutdown(&self) {}
}

/// Ordered collection of processors sharing one lifecycle.
#[derive(Clone, Default)]
pub struct ProcessorSet {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor; its position becomes its processor index.
    pub fn push(&mut self, processor: Arc<dyn Processor>) {
        self.processors.push(processor);
    }

    /// Builder-style [`ProcessorSet::push`].
    pub fn with(mut self, processor: Arc<dyn Processor>) -> Self {
        self.push(processor);
        self
    }

    /// Processors in registration order.
    pub fn as_slice(&self) -> &[Arc<dyn Processor>] {
        &self.processors
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether no processor is registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Start every processor, returning how many started cleanly.
    ///
    /// A processor that fails to start stays registered; its invocations are expected to
    /// fail and are recorded per task.
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        for processor in &self.processors {
            match processor.start().await {
                Ok(()) => {
                    tracing::debug!(
                        processor = processor.name(),
                        kind = %processor.kind(),
                        "Processor started"
                    );
                    started += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        processor = processor.name(),
                        error = %error,
                        "Processor failed to start"
                    );
                }
            }
        }
        started
    }

    /// Shut every processor down.
    pub async fn shutdown_all(&self) {
        for processor in &self.processors {
            processor.shutdown().await;
            tracing::debug!(processor = processor.name(), "Processor shut down");
        }
    }
}

impl std::fmt::Debug for ProcessorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|processor| processor.name()))
            .finish()
    }
}
