//! Error types for the docextract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocExtractError`] — **Fatal**: the call cannot proceed at all
//!   (bad configuration, no credential, unreadable input path). Returned as
//!   `Err(DocExtractError)` from the top-level entry points.
//!
//! * [`ItemError`] — **Non-fatal**: a single document failed (timeout, HTTP
//!   error, unrecognised response) but the rest of the batch is fine. Stored
//!   inside [`crate::output::DocumentResult`] so the job keeps one entry per
//!   submitted document.
//!
//! Transport failures have their own taxonomy, [`TransportError`], which is
//! wrapped by [`ItemError::Transport`] once it reaches the batch boundary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Longest response body kept inside an error value.
pub const MAX_ERROR_BODY: usize = 500;

/// Raw bodies larger than this are referenced by size, never inlined in messages.
pub const INLINE_PAYLOAD_MAX_BYTES: usize = 5000;

/// All fatal errors returned by the docextract library.
#[derive(Debug, Error)]
pub enum DocExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file was read but is neither a PDF nor a recognised image.
    #[error("Unsupported input '{input}': {reason}")]
    UnsupportedInput { input: String, reason: String },

    // ── Credential errors ─────────────────────────────────────────────────
    /// No API key could be resolved from any source.
    #[error("No API key found.\n{hint}")]
    MissingApiKey { hint: String },

    /// The secrets file exists but could not be parsed.
    #[error("Failed to read secrets file '{path}': {detail}")]
    SecretsFile { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be created.
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One failed outbound call.
///
/// Timeouts, connection failures and non-2xx statuses are kept apart so a
/// caller can tell "the backend said no" from "the backend never answered".
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransportError {
    /// The request exceeded its connect or total timeout.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// DNS, TLS, refused connection or a body that could not be read.
    #[error("{operation} connection failed: {detail}")]
    Connection { operation: String, detail: String },

    /// The backend answered with a non-success status.
    #[error("{operation} returned HTTP {status}{}: {body}", status_hint(.status))]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    /// A 2xx answer whose JSON lacks the field this step needs.
    #[error("{operation} returned an unusable response: {detail}")]
    InvalidResponse { operation: String, detail: String },

    /// The document could not be written to local staging before upload.
    #[error("{operation} could not stage the document: {detail}")]
    Staging { operation: String, detail: String },

    /// The HTTP client itself could not be built.
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

fn status_hint(status: &u16) -> &'static str {
    match *status {
        401 | 403 => " (unauthorized, check the API key)",
        404 => " (not found)",
        413 => " (file too large)",
        429 => " (rate limited)",
        _ => "",
    }
}

impl TransportError {
    /// Build an [`TransportError::Http`], truncating the body.
    pub fn http(operation: impl Into<String>, status: u16, body: &str) -> Self {
        TransportError::Http {
            operation: operation.into(),
            status,
            body: truncate(body, MAX_ERROR_BODY),
        }
    }

    /// HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// A non-fatal error for a single document.
///
/// Stored alongside [`crate::output::DocumentResult`] when a document fails.
/// The batch continues regardless.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// The document reference was empty or malformed; nothing was sent.
    #[error("invalid document: {0}")]
    Build(String),

    /// The outbound call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered 2xx but the body reports an error.
    #[error("backend reported an error: {message}")]
    UpstreamLogical {
        message: String,
        raw: Option<String>,
    },

    /// A known response shape was present but carried only blank text.
    #[error("no text found in response ({shape})")]
    NoText { shape: String, raw: Option<String> },

    /// JSON parsed but no extraction rule found any text.
    #[error("unrecognized response format ({size} bytes)")]
    UnrecognizedShape { size: usize, raw: Option<String> },

    /// The body was neither JSON nor plausible plain text.
    #[error("could not parse response: {preview}")]
    Parse { preview: String },

    /// The pipeline panicked while processing this document.
    #[error("internal failure while processing document: {0}")]
    Panicked(String),
}

impl ItemError {
    /// Raw backend body attached to this error, if any.
    pub fn raw(&self) -> Option<&str> {
        match self {
            ItemError::UpstreamLogical { raw, .. }
            | ItemError::NoText { raw, .. }
            | ItemError::UnrecognizedShape { raw, .. } => raw.as_deref(),
            ItemError::Transport(TransportError::Http { body, .. }) => Some(body),
            _ => None,
        }
    }

    /// Human-readable message for the caller's UI.
    ///
    /// The raw body is only appended when `verbose` is set, and only when it
    /// fits in [`INLINE_PAYLOAD_MAX_BYTES`]; larger bodies are referenced by size.
    pub fn user_message(&self, display_name: &str, verbose: bool) -> String {
        let mut msg = format!("Error processing {display_name}: {self}");
        if verbose {
            match self.raw() {
                Some(raw) if raw.len() <= INLINE_PAYLOAD_MAX_BYTES => {
                    msg.push_str("\n--- response ---\n");
                    msg.push_str(raw);
                }
                Some(raw) => {
                    msg.push_str(&format!("\n--- response: {} bytes attached as raw data ---", raw.len()));
                }
                None => {}
            }
        }
        msg
    }
}

/// Truncate `s` to at most `max` bytes on a char boundary, marking the cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
