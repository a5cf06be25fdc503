//! Eager (whole-batch) extraction entry points.
//!
//! This module provides the simpler API: process every document, then
//! return a complete [`ProcessingJob`]. Use [`crate::stream::extract_stream`]
//! instead to receive each [`DocumentResult`] as soon as it is ready.
//!
//! ## Per-document state machine
//!
//! ```text
//! Auto:                  DirectOcr ──Success/Failure──▶ done
//!                        DirectOcr ──Escalate──▶ DocumentUnderstanding ──▶ done
//! DirectOcr:             one attempt; Escalate is reported as a failure
//! DocumentUnderstanding: one attempt; never escalates
//! ```
//!
//! There is at most one escalation per document and no retries.

use crate::config::{ExtractionConfig, OperationMode};
use crate::document::{DocumentRef, NamedDocument};
use crate::error::{DocExtractError, ItemError, TransportError};
use crate::output::{BatchStats, DocumentResult, ExtractedText, ExtractionOutcome, ProcessingJob};
use crate::pipeline::input;
use crate::pipeline::normalize::normalize;
use crate::pipeline::request::{build_request, Attempt};
use crate::pipeline::transport::{self, HttpTransport, KeyStatus, Transport};
use crate::stream::{extract_stream, DocumentStream};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of one attempt, before the state machine decides what happens next.
enum Step {
    Done(Result<ExtractedText, ItemError>),
    Escalate {
        reason: String,
        raw: Option<String>,
        signed_url: Option<String>,
    },
}

/// Extract a single document according to `config.mode`.
///
/// Never fails as a whole: every error lands in [`DocumentResult::outcome`].
pub async fn extract_document(
    transport: &dyn Transport,
    document: &NamedDocument,
    config: &ExtractionConfig,
) -> DocumentResult {
    run_isolated(transport, document, config, 0, 1).await
}

/// Extract every document, strictly one after another.
///
/// The returned job has exactly one result per input document, in input
/// order. A fixed delay of `config.inter_document_delay_ms` separates
/// consecutive documents.
pub async fn extract_batch(
    transport: &dyn Transport,
    documents: Vec<NamedDocument>,
    config: &ExtractionConfig,
) -> ProcessingJob {
    let start = Instant::now();
    let total = documents.len();
    info!("Starting batch of {} document(s), mode {:?}", total, config.mode);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut job = ProcessingJob::new(documents);
    for index in 0..total {
        if index > 0 {
            pause(config).await;
        }
        let result = {
            let document = &job.documents[index];
            run_isolated(transport, document, config, index, total).await
        };
        job.push(result);
    }

    let stats = job.stats();
    info!(
        "Batch complete: {}/{} succeeded, {} escalated, {}ms total",
        stats.succeeded,
        stats.total,
        stats.escalated,
        start.elapsed().as_millis()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, stats.succeeded);
    }
    job
}

/// Resolve `inputs` (paths, URLs, data URIs) and extract them over HTTP.
///
/// # Errors
/// Fatal only: missing API key, unusable input, HTTP client setup.
pub async fn extract(
    inputs: &[String],
    config: &ExtractionConfig,
) -> Result<ProcessingJob, DocExtractError> {
    let documents = input::resolve_inputs(inputs, None).await?;
    let extractor = Extractor::from_config(config.clone())?;
    Ok(extractor.extract_batch(documents).await)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    inputs: &[String],
    config: &ExtractionConfig,
) -> Result<ProcessingJob, DocExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(inputs, config))
}

/// Write the combined Markdown of a job to `path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_combined(
    job: &ProcessingJob,
    path: impl AsRef<Path>,
) -> Result<BatchStats, DocExtractError> {
    let path = path.as_ref();
    let write_err = |e| DocExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, job.combined_markdown())
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(job.stats())
}

/// A transport plus the configuration to drive it.
#[derive(Clone)]
pub struct Extractor {
    transport: Arc<dyn Transport>,
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(transport: Arc<dyn Transport>, config: ExtractionConfig) -> Self {
        Self { transport, config }
    }

    /// Build an extractor backed by [`HttpTransport`].
    pub fn from_config(config: ExtractionConfig) -> Result<Self, DocExtractError> {
        if config.api_key.trim().is_empty() {
            return Err(DocExtractError::MissingApiKey {
                hint: "Set MISTRAL_API_KEY, pass --api-key, or add it to the secrets file.".into(),
            });
        }
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub async fn extract(&self, document: &NamedDocument) -> DocumentResult {
        extract_document(self.transport.as_ref(), document, &self.config).await
    }

    pub async fn extract_batch(&self, documents: Vec<NamedDocument>) -> ProcessingJob {
        extract_batch(self.transport.as_ref(), documents, &self.config).await
    }

    pub fn stream(&self, documents: Vec<NamedDocument>) -> DocumentStream {
        extract_stream(self.transport(), documents, self.config.clone())
    }

    pub async fn validate_key(&self) -> Result<KeyStatus, TransportError> {
        self.transport.validate_key().await
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) async fn pause(config: &ExtractionConfig) {
    if config.inter_document_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.inter_document_delay_ms)).await;
    }
}

/// Run one document with panic isolation so the batch always gets a result.
pub(crate) async fn run_isolated(
    transport: &dyn Transport,
    document: &NamedDocument,
    config: &ExtractionConfig,
    index: usize,
    total: usize,
) -> DocumentResult {
    let run = run_document(transport, document, config, index, total);
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Document {} ({}) panicked: {}", index + 1, document.display_name, message);
            let err = ItemError::Panicked(message);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(index, total, &document.display_name, &err.to_string());
            }
            DocumentResult::failed(index, &document.display_name, err)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_document(
    transport: &dyn Transport,
    document: &NamedDocument,
    config: &ExtractionConfig,
    index: usize,
    total: usize,
) -> DocumentResult {
    let start = Instant::now();
    let name = document.display_name.as_str();
    info!("Document {}/{}: {}", index + 1, total, name);
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(index, total, name);
    }

    let mut attempt = match config.mode {
        OperationMode::DocumentUnderstanding => Attempt::DocumentUnderstanding,
        OperationMode::DirectOcr | OperationMode::Auto => Attempt::DirectOcr,
    };
    let mut escalated = false;
    let mut signed_url: Option<String> = None;

    let outcome = loop {
        match run_attempt(transport, &document.document, signed_url.as_deref(), attempt, config).await {
            Step::Done(outcome) => break outcome,
            Step::Escalate {
                reason,
                raw,
                signed_url: url,
            } => {
                let may_escalate = config.mode == OperationMode::Auto
                    && attempt == Attempt::DirectOcr
                    && !escalated;
                if !may_escalate {
                    break Err(ItemError::UpstreamLogical {
                        message: reason,
                        raw,
                    });
                }
                warn!("{}: direct OCR reported '{}', escalating", name, reason);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_escalation(index, name, &reason);
                }
                escalated = true;
                attempt = Attempt::DocumentUnderstanding;
                signed_url = url;
            }
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &outcome {
        Ok(text) => {
            info!(
                "{}: {} chars ({:?}) in {}ms",
                name,
                text.text.len(),
                text.source_format,
                duration_ms
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_complete(index, total, name, text.text.len());
            }
        }
        Err(e) => {
            warn!("{}: {}", name, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_error(index, total, name, &e.to_string());
            }
        }
    }

    DocumentResult {
        index,
        display_name: document.display_name.clone(),
        outcome,
        mode_used: attempt.into(),
        escalated,
        duration_ms,
    }
}

/// Build, send and normalise one attempt.
async fn run_attempt(
    transport: &dyn Transport,
    document: &DocumentRef,
    signed_url: Option<&str>,
    attempt: Attempt,
    config: &ExtractionConfig,
) -> Step {
    // After an upload, the escalated attempt points at the signed URL
    // instead of re-embedding the bytes.
    let uploaded;
    let target = match (attempt, signed_url) {
        (Attempt::DocumentUnderstanding, Some(url)) => {
            uploaded = DocumentRef::remote(document.kind(), url);
            &uploaded
        }
        _ => document,
    };

    let request = match build_request(target, attempt, config) {
        Ok(r) => r,
        Err(e) => return Step::Done(Err(e)),
    };
    debug!("{:?} attempt, request {:?}", attempt, request_kind(&request));

    let executed = transport::execute(transport, &request).await;
    let body = match executed.body {
        Ok(body) => body,
        Err(e)
            if config.mode == OperationMode::Auto
                && attempt == Attempt::DirectOcr
                && is_ocr_not_found(&e) =>
        {
            return Step::Escalate {
                reason: e.to_string(),
                raw: None,
                signed_url: executed.signed_url,
            };
        }
        Err(e) => return Step::Done(Err(e.into())),
    };

    match normalize(&body, attempt, config.escalation_scope) {
        ExtractionOutcome::Success {
            text,
            source_format,
        } => Step::Done(Ok(ExtractedText {
            text,
            source_format,
        })),
        ExtractionOutcome::Escalate { reason } => Step::Escalate {
            reason,
            raw: Some(body),
            signed_url: executed.signed_url,
        },
        ExtractionOutcome::Failure(e) => Step::Done(Err(e)),
    }
}

/// A 404 from the OCR endpoint itself means the operation is unavailable for
/// this account, which the chat endpoint can still serve.
fn is_ocr_not_found(err: &TransportError) -> bool {
    matches!(err, TransportError::Http { operation, status: 404, .. } if operation == "ocr")
}

fn request_kind(request: &crate::pipeline::request::ExtractionRequest<'_>) -> &'static str {
    use crate::pipeline::request::ExtractionRequest;
    match request {
        ExtractionRequest::Ocr(_) => "ocr",
        ExtractionRequest::UploadThenOcr(_) => "upload+ocr",
        ExtractionRequest::Chat(_) => "chat",
    }
}
