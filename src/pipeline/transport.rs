//! Transport: the only stage with network I/O.
//!
//! [`Transport`] is the seam between the pipeline and the backend. The
//! production implementation, [`HttpTransport`], talks to the HTTP API with
//! `reqwest`; tests substitute an in-memory fake.
//!
//! ## Timeouts
//!
//! Every call has a connect timeout plus a total timeout chosen by operation:
//!
//! | Operation               | Default |
//! |-------------------------|---------|
//! | connect                 | 30 s    |
//! | OCR on an image         | 60 s    |
//! | OCR on a PDF            | 120 s   |
//! | upload                  | 120 s   |
//! | document understanding  | 300 s   |
//! | signed URL / key check  | 30 s    |
//!
//! No call is retried here. A timeout, refused connection or non-2xx status
//! becomes a [`TransportError`] and ends that document's processing.
//!
//! ## Upload staging
//!
//! Inline PDFs are written to a scoped [`TempDir`] and streamed from disk
//! into the multipart body. The directory is removed when the upload call
//! returns, whatever the outcome.

use crate::config::ExtractionConfig;
use crate::error::TransportError;
use crate::pipeline::request::{
    ChatRequest, DocumentChunk, ExtractionRequest, OcrRequest, UploadRequest,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info};

/// Result of checking an API key against the metadata endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Valid,
    Invalid,
    /// Any other status; the key may or may not be usable.
    Unknown(u16),
}

/// Backend operations the pipeline needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload an inline document; returns the backend's file id.
    async fn upload_file(&self, upload: &UploadRequest<'_>) -> Result<String, TransportError>;

    /// Exchange a file id for a time-limited URL the OCR endpoint can fetch.
    async fn signed_url(&self, file_id: &str, expiry_hours: u32) -> Result<String, TransportError>;

    /// `POST /ocr`; returns the raw response body.
    async fn ocr(&self, request: &OcrRequest) -> Result<String, TransportError>;

    /// `POST /chat/completions`; returns the raw response body.
    async fn chat(&self, request: &ChatRequest) -> Result<String, TransportError>;

    /// Probe the credential with a cheap authenticated call.
    async fn validate_key(&self) -> Result<KeyStatus, TransportError>;
}

/// What one [`execute`] call produced.
///
/// `signed_url` is kept even when the OCR call itself failed so an escalated
/// attempt can reuse the uploaded file instead of re-sending the bytes.
#[derive(Debug)]
pub struct Executed {
    pub body: Result<String, TransportError>,
    pub signed_url: Option<String>,
}

/// Send a built request, chaining upload → signed URL → OCR when needed.
pub async fn execute(transport: &dyn Transport, request: &ExtractionRequest<'_>) -> Executed {
    match request {
        ExtractionRequest::Ocr(ocr) => Executed {
            body: transport.ocr(ocr).await,
            signed_url: None,
        },
        ExtractionRequest::Chat(chat) => Executed {
            body: transport.chat(chat).await,
            signed_url: None,
        },
        ExtractionRequest::UploadThenOcr(upload) => {
            let signed = async {
                let file_id = transport.upload_file(upload).await?;
                transport.signed_url(&file_id, upload.expiry_hours).await
            }
            .await;
            match signed {
                Ok(url) => Executed {
                    body: transport.ocr(&upload.ocr_request(url.clone())).await,
                    signed_url: Some(url),
                },
                Err(e) => Executed {
                    body: Err(e),
                    signed_url: None,
                },
            }
        }
    }
}

/// Per-operation timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: u64,
    pub image_ocr: u64,
    pub document_ocr: u64,
    pub upload: u64,
    pub understanding: u64,
    pub metadata: u64,
}

impl Timeouts {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            connect: config.connect_timeout_secs,
            image_ocr: config.image_ocr_timeout_secs,
            document_ocr: config.document_ocr_timeout_secs,
            upload: config.upload_timeout_secs,
            understanding: config.understanding_timeout_secs,
            metadata: config.metadata_timeout_secs,
        }
    }
}

/// Render a call as a curl-like line for debug logs. The credential is masked.
pub fn describe_call(method: &Method, url: &str, body: &str) -> String {
    format!("curl -X {method} {url} -H 'Authorization: Bearer ****' {body}")
        .trim_end()
        .to_string()
}

/// [`Transport`] over HTTPS with bearer authentication.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
    timeouts: Timeouts,
    staging_dir: Option<PathBuf>,
}

impl HttpTransport {
    /// Build a transport from the resolved configuration.
    pub fn new(config: &ExtractionConfig) -> Result<Self, TransportError> {
        let timeouts = Timeouts::from_config(config);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect))
            .use_rustls_tls()
            .build()
            .map_err(|e| TransportError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeouts,
            staging_dir: config.staging_dir.clone(),
        })
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, secs: u64, body_hint: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("{}", describe_call(&method, &url, body_hint));
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(secs))
    }

    fn stage_dir(&self) -> std::io::Result<TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("docextract-");
            b
        };
        match &self.staging_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    /// Send, then read the body; non-2xx statuses become [`TransportError::Http`].
    async fn send_text(
        &self,
        operation: &str,
        secs: u64,
        builder: RequestBuilder,
    ) -> Result<String, TransportError> {
        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(operation, secs, e))?;
        let text = read_body(operation, secs, response).await?;
        debug!(
            "{} answered {} bytes in {}ms",
            operation,
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload_file(&self, upload: &UploadRequest<'_>) -> Result<String, TransportError> {
        const OP: &str = "upload";
        let staging = self.stage_dir().map_err(|e| staging_error(OP, e))?;
        let path = staging.path().join(upload.file_name);
        tokio::fs::write(&path, upload.bytes)
            .await
            .map_err(|e| staging_error(OP, e))?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| staging_error(OP, e))?;

        let part = Part::stream_with_length(reqwest::Body::from(file), upload.bytes.len() as u64)
            .file_name(upload.file_name.to_string())
            .mime_str(upload.media_type)
            .map_err(|e| TransportError::InvalidResponse {
                operation: OP.into(),
                detail: format!("bad media type '{}': {e}", upload.media_type),
            })?;
        let form = Form::new().text("purpose", "ocr").part("file", part);

        info!("Uploading {} bytes as {}", upload.bytes.len(), upload.file_name);
        let builder = self
            .request(
                Method::POST,
                "files",
                self.timeouts.upload,
                &format!("-F purpose=ocr -F file=@{}", upload.file_name),
            )
            .multipart(form);
        let body = self.send_text(OP, self.timeouts.upload, builder).await?;
        drop(staging);

        json_field(OP, &body, "id")
    }

    async fn signed_url(&self, file_id: &str, expiry_hours: u32) -> Result<String, TransportError> {
        const OP: &str = "signed_url";
        let path = format!("files/{file_id}/url?expiry={expiry_hours}");
        let builder = self.request(Method::GET, &path, self.timeouts.metadata, "");
        let body = self.send_text(OP, self.timeouts.metadata, builder).await?;
        json_field(OP, &body, "url")
    }

    async fn ocr(&self, request: &OcrRequest) -> Result<String, TransportError> {
        let secs = match request.document {
            DocumentChunk::ImageUrl { .. } => self.timeouts.image_ocr,
            DocumentChunk::DocumentUrl { .. } => self.timeouts.document_ocr,
        };
        let builder = self
            .request(Method::POST, "ocr", secs, "-d @ocr.json")
            .json(request);
        self.send_text("ocr", secs, builder).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let secs = self.timeouts.understanding;
        let builder = self
            .request(Method::POST, "chat/completions", secs, "-d @chat.json")
            .json(request);
        self.send_text("chat", secs, builder).await
    }

    async fn validate_key(&self) -> Result<KeyStatus, TransportError> {
        const OP: &str = "validate_key";
        let secs = self.timeouts.metadata;
        let response = self
            .request(Method::GET, "models", secs, "")
            .send()
            .await
            .map_err(|e| map_reqwest_error(OP, secs, e))?;
        Ok(match response.status() {
            StatusCode::OK => KeyStatus::Valid,
            StatusCode::UNAUTHORIZED => KeyStatus::Invalid,
            other => KeyStatus::Unknown(other.as_u16()),
        })
    }
}

async fn read_body(operation: &str, secs: u64, response: Response) -> Result<String, TransportError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| map_reqwest_error(operation, secs, e))?;
    if !status.is_success() {
        return Err(TransportError::http(operation, status.as_u16(), &text));
    }
    Ok(text)
}

fn map_reqwest_error(operation: &str, secs: u64, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            operation: operation.to_string(),
            secs,
        }
    } else {
        TransportError::Connection {
            operation: operation.to_string(),
            detail: err.to_string(),
        }
    }
}

fn staging_error(operation: &str, err: std::io::Error) -> TransportError {
    TransportError::Staging {
        operation: operation.to_string(),
        detail: err.to_string(),
    }
}

/// Pull a required string field out of a JSON body.
fn json_field(operation: &str, body: &str, field: &str) -> Result<String, TransportError> {
    let value: Value = serde_json::from_str(body).map_err(|e| TransportError::InvalidResponse {
        operation: operation.to_string(),
        detail: format!("not JSON: {e}"),
    })?;
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TransportError::InvalidResponse {
            operation: operation.to_string(),
            detail: format!("missing '{field}'"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_call_masks_credential() {
        let line = describe_call(&Method::POST, "https://api.example/v1/ocr", "-d @ocr.json");
        assert!(line.contains("Bearer ****"));
        assert!(line.starts_with("curl -X POST https://api.example/v1/ocr"));
    }

    #[test]
    fn json_field_reports_missing_key() {
        assert_eq!(json_field("upload", r#"{"id":"f-1"}"#, "id").unwrap(), "f-1");
        assert!(matches!(
            json_field("upload", r#"{"object":"file"}"#, "id"),
            Err(TransportError::InvalidResponse { .. })
        ));
        assert!(matches!(
            json_field("signed_url", "<html>", "url"),
            Err(TransportError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn url_join_strips_slashes() {
        let config = ExtractionConfig::builder()
            .api_base_url("https://api.example/v1/")
            .api_key("k")
            .build()
            .unwrap();
        let t = HttpTransport::new(&config).unwrap();
        assert_eq!(t.url("/ocr"), "https://api.example/v1/ocr");
        assert_eq!(t.timeouts().document_ocr, 120);
        assert_eq!(t.timeouts().understanding, 300);
    }
}
