//! Configuration types for document extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks and diff two runs to understand
//! why their outputs differ.
//!
//! The API key lives here too, but `Debug` never prints it.

use crate::error::DocExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default API root for the OCR backend.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mistral.ai/v1";
/// Model used by the direct OCR operation.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
/// Chat model used by the document-understanding fallback.
pub const DEFAULT_CHAT_MODEL: &str = "mistral-large-latest";

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use docextract::{ExtractionConfig, OperationMode};
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-test")
///     .mode(OperationMode::Auto)
///     .inter_document_delay_ms(500)
///     .build()
///     .unwrap();
/// assert_eq!(config.mode, OperationMode::Auto);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// API root, without a trailing slash. Default: `https://api.mistral.ai/v1`.
    pub api_base_url: String,

    /// Resolved bearer token. See [`crate::credentials`] for how the CLI finds it.
    pub api_key: String,

    /// Model id sent with `POST /ocr`.
    pub ocr_model: String,

    /// Model id sent with `POST /chat/completions`.
    pub chat_model: String,

    /// Which backend operation(s) to run. Default: [`OperationMode::Auto`].
    pub mode: OperationMode,

    /// Ask the OCR endpoint to return embedded images as base64. Default: true.
    pub include_image_base64: bool,

    /// `document_image_limit` sent with chat requests. Default: 10.
    pub document_image_limit: u32,

    /// `document_page_limit` sent with chat requests. Default: 100.
    pub document_page_limit: u32,

    /// Lifetime of the signed URL requested after an upload. Default: 24.
    pub signed_url_expiry_hours: u32,

    /// Custom document-understanding instruction. If None, uses
    /// [`crate::prompts::DOCUMENT_UNDERSTANDING_INSTRUCTION`].
    pub instruction: Option<String>,

    /// TCP/TLS connect timeout for every call, in seconds. Default: 30.
    pub connect_timeout_secs: u64,

    /// Total timeout for OCR on an inline image, in seconds. Default: 60.
    pub image_ocr_timeout_secs: u64,

    /// Total timeout for OCR on a PDF or remote URL, in seconds. Default: 120.
    pub document_ocr_timeout_secs: u64,

    /// Total timeout for the multipart upload, in seconds. Default: 120.
    pub upload_timeout_secs: u64,

    /// Total timeout for the chat-based fallback, in seconds. Default: 300.
    pub understanding_timeout_secs: u64,

    /// Total timeout for small metadata calls (signed URL, model list). Default: 30.
    pub metadata_timeout_secs: u64,

    /// Pause between consecutive documents of a batch. Default: 1000.
    ///
    /// A crude guard against upstream rate limits. Not applied after the last
    /// document; 0 disables it.
    pub inter_document_delay_ms: u64,

    /// Where the "body reports an error" check looks. Default: [`EscalationScope::RawBody`].
    pub escalation_scope: EscalationScope,

    /// Parent directory for staged upload files. If None, the system temp dir.
    pub staging_dir: Option<PathBuf>,

    /// Optional per-document progress callback. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            mode: OperationMode::default(),
            include_image_base64: true,
            document_image_limit: 10,
            document_page_limit: 100,
            signed_url_expiry_hours: 24,
            instruction: None,
            connect_timeout_secs: 30,
            image_ocr_timeout_secs: 60,
            document_ocr_timeout_secs: 120,
            upload_timeout_secs: 120,
            understanding_timeout_secs: 300,
            metadata_timeout_secs: 30,
            inter_document_delay_ms: 1000,
            escalation_scope: EscalationScope::default(),
            staging_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &redact_key(&self.api_key))
            .field("ocr_model", &self.ocr_model)
            .field("chat_model", &self.chat_model)
            .field("mode", &self.mode)
            .field("include_image_base64", &self.include_image_base64)
            .field("document_image_limit", &self.document_image_limit)
            .field("document_page_limit", &self.document_page_limit)
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("inter_document_delay_ms", &self.inter_document_delay_ms)
            .field("escalation_scope", &self.escalation_scope)
            .field("staging_dir", &self.staging_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

fn redact_key(key: &str) -> &'static str {
    if key.is_empty() {
        "<unset>"
    } else {
        "****"
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    pub fn mode(mut self, mode: OperationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn include_image_base64(mut self, v: bool) -> Self {
        self.config.include_image_base64 = v;
        self
    }

    pub fn document_image_limit(mut self, n: u32) -> Self {
        self.config.document_image_limit = n;
        self
    }

    pub fn document_page_limit(mut self, n: u32) -> Self {
        self.config.document_page_limit = n;
        self
    }

    pub fn signed_url_expiry_hours(mut self, hours: u32) -> Self {
        self.config.signed_url_expiry_hours = hours;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn image_ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_ocr_timeout_secs = secs;
        self
    }

    pub fn document_ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.document_ocr_timeout_secs = secs;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn understanding_timeout_secs(mut self, secs: u64) -> Self {
        self.config.understanding_timeout_secs = secs;
        self
    }

    pub fn metadata_timeout_secs(mut self, secs: u64) -> Self {
        self.config.metadata_timeout_secs = secs;
        self
    }

    pub fn inter_document_delay_ms(mut self, ms: u64) -> Self {
        self.config.inter_document_delay_ms = ms;
        self
    }

    pub fn escalation_scope(mut self, scope: EscalationScope) -> Self {
        self.config.escalation_scope = scope;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, DocExtractError> {
        let c = &self.config;
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(DocExtractError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.ocr_model.trim().is_empty() || c.chat_model.trim().is_empty() {
            return Err(DocExtractError::InvalidConfig(
                "Model ids must not be empty".into(),
            ));
        }
        let timeouts = [
            c.connect_timeout_secs,
            c.image_ocr_timeout_secs,
            c.document_ocr_timeout_secs,
            c.upload_timeout_secs,
            c.understanding_timeout_secs,
            c.metadata_timeout_secs,
        ];
        if timeouts.contains(&0) {
            return Err(DocExtractError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.signed_url_expiry_hours == 0 {
            return Err(DocExtractError::InvalidConfig(
                "Signed URL expiry must be ≥ 1 hour".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which backend operation the pipeline runs.
///
/// | Mode | Calls |
/// |------|-------|
/// | `DirectOcr` | `POST /ocr` only |
/// | `DocumentUnderstanding` | `POST /chat/completions` only |
/// | `Auto` | `POST /ocr`, then one chat attempt if the OCR body reports an error (default) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    DirectOcr,
    DocumentUnderstanding,
    #[default]
    Auto,
}

/// Where the normaliser looks for `"error"` / `"not found"` when no
/// extraction rule produced text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationScope {
    /// Anywhere in the raw body (default).
    #[default]
    RawBody,
    /// Top-level JSON keys and top-level string values only.
    TopLevel,
}
