//! HTTP client for remote OCR and layout-analysis services.
//!
//! A service exposes `POST <base>/process_page`, taking the document as a multipart `file`
//! part plus a `page_number` field, and answering with a JSON extraction payload. An optional
//! `GET <base>/health` is checked at start-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

use super::{Document, Processor, ProcessorFailure};
use crate::processing::{ExtractionResult, ProcessorType, RawExtraction};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Connection settings for an [`HttpProcessor`].
#[derive(Debug, Clone)]
pub struct HttpProcessorConfig {
    /// Base URL of the service, e.g. `http://localhost:8001`.
    pub base_url: String,
    /// Kind reported for results that omit `processor_type`.
    pub kind: ProcessorType,
    /// Instance name for logs; defaults to the kind label.
    pub name: Option<String>,
    /// Additional attempts after a retryable failure.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Optional per-request timeout enforced by the HTTP client.
    pub request_timeout: Option<Duration>,
}

impl HttpProcessorConfig {
    /// Settings with default retry behaviour for the given service.
    pub fn new(base_url: impl Into<String>, kind: ProcessorType) -> Self {
        Self {
            base_url: base_url.into(),
            kind,
            name: None,
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            request_timeout: None,
        }
    }
}

/// Remote page processor speaking the `process_page` protocol.
pub struct HttpProcessor {
    client: Client,
    base_url: String,
    kind: ProcessorType,
    name: String,
    max_retries: u32,
    retry_backoff: Duration,
    running: AtomicBool,
}

enum Attempt {
    Retryable(ProcessorFailure),
    Fatal(ProcessorFailure),
}

impl HttpProcessor {
    /// Build a processor with its own HTTP client.
    pub fn new(config: HttpProcessorConfig) -> Result<Self, ProcessorFailure> {
        let mut builder = Client::builder().user_agent("pagemerge/0.1");
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| ProcessorFailure::Unavailable(err.to_string()))?;
        let base_url =
            normalize_base_url(&config.base_url).map_err(ProcessorFailure::Unavailable)?;
        let name = config
            .name
            .unwrap_or_else(|| config.kind.as_str().to_string());

        tracing::debug!(
            url = %base_url,
            processor = %name,
            kind = %config.kind,
            "Initialized HTTP processor"
        );

        Ok(Self {
            client,
            base_url,
            kind: config.kind,
            name,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            running: AtomicBool::new(true),
        })
    }

    /// Service base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn attempt(
        &self,
        document: &Document,
        page_number: u32,
    ) -> Result<ExtractionResult, Attempt> {
        let part = Part::bytes(document.bytes.to_vec()).file_name(document.name.clone());
        let form = Form::new()
            .part("file", part)
            .text("page_number", page_number.to_string())
            .text("processor_type", self.kind.as_str());

        let response = self
            .client
            .post(format_endpoint(&self.base_url, "process_page"))
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate(response.text().await.unwrap_or_default());
            let failure = ProcessorFailure::Status {
                status: status.as_u16(),
                body,
            };
            return Err(if is_retryable_status(status) {
                Attempt::Retryable(failure)
            } else {
                Attempt::Fatal(failure)
            });
        }

        let raw: RawExtraction = response
            .json()
            .await
            .map_err(|err| Attempt::Fatal(ProcessorFailure::Decode(err.to_string())))?;
        raw.validate(page_number, self.kind)
            .map_err(|err| Attempt::Fatal(err.into()))
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    fn kind(&self) -> ProcessorType {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        document: &Document,
        page_number: u32,
    ) -> Result<ExtractionResult, ProcessorFailure> {
        if !self.running.load(Ordering::Acquire) {
            return Err(ProcessorFailure::Unavailable(format!(
                "{} has been shut down",
                self.name
            )));
        }

        let mut retries = 0;
        loop {
            match self.attempt(document, page_number).await {
                Ok(result) => return Ok(result),
                Err(Attempt::Retryable(failure)) if retries < self.max_retries => {
                    retries += 1;
                    let delay = self.retry_backoff * retries;
                    tracing::warn!(
                        processor = %self.name,
                        page = page_number,
                        attempt = retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %failure,
                        "Retrying remote processor"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Attempt::Retryable(failure) | Attempt::Fatal(failure)) => {
                    tracing::debug!(
                        processor = %self.name,
                        page = page_number,
                        error = %failure,
                        "Remote processor failed"
                    );
                    return Err(failure);
                }
            }
        }
    }

    async fn start(&self) -> Result<(), ProcessorFailure> {
        let response = self
            .client
            .get(format_endpoint(&self.base_url, "health"))
            .send()
            .await
            .map_err(|err| ProcessorFailure::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ProcessorFailure::Unavailable(format!(
                "health check returned {}",
                response.status()
            )));
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }
}

fn classify_transport_error(err: reqwest::Error) -> Attempt {
    if err.is_timeout() {
        Attempt::Retryable(ProcessorFailure::Timeout)
    } else if err.is_connect() || err.is_request() {
        Attempt::Retryable(ProcessorFailure::Remote(err.to_string()))
    } else {
        Attempt::Fatal(ProcessorFailure::Remote(err.to_string()))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn truncate(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body
    } else {
        body.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
