//! Request building: `DocumentRef` + attempt → ready-to-send payload.
//!
//! Payload shapes must match the backend byte for byte, so they are plain
//! serde structs with internally tagged enums for the `"type"` discriminator:
//!
//! ```text
//! {"type":"document_url","document_url":"<url-or-data-uri>"}
//! {"type":"image_url","image_url":"<url-or-data-uri>"}
//! ```
//!
//! PDFs held in memory cannot be sent inline to `POST /ocr`; they become an
//! [`UploadRequest`] which the transport turns into a signed URL first.

use crate::config::{ExtractionConfig, OperationMode};
use crate::document::{DocumentKind, DocumentRef};
use crate::error::ItemError;
use crate::pipeline::encode;
use crate::prompts;
use serde::{Deserialize, Serialize};

/// File name attached to multipart uploads.
pub const UPLOAD_FILE_NAME: &str = "document.pdf";

/// One concrete backend operation. `Auto` is resolved into a sequence of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attempt {
    DirectOcr,
    DocumentUnderstanding,
}

impl From<Attempt> for OperationMode {
    fn from(a: Attempt) -> Self {
        match a {
            Attempt::DirectOcr => OperationMode::DirectOcr,
            Attempt::DocumentUnderstanding => OperationMode::DocumentUnderstanding,
        }
    }
}

/// Document reference as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentChunk {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

impl DocumentChunk {
    pub fn new(kind: DocumentKind, url: impl Into<String>) -> Self {
        match kind {
            DocumentKind::Pdf => DocumentChunk::DocumentUrl {
                document_url: url.into(),
            },
            DocumentKind::Image => DocumentChunk::ImageUrl {
                image_url: url.into(),
            },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            DocumentChunk::DocumentUrl { document_url } => document_url,
            DocumentChunk::ImageUrl { image_url } => image_url,
        }
    }
}

/// Body of `POST /ocr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrRequest {
    pub model: String,
    pub document: DocumentChunk,
    pub include_image_base64: bool,
}

/// One block of a multimodal chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

impl From<DocumentChunk> for ContentBlock {
    fn from(chunk: DocumentChunk) -> Self {
        match chunk {
            DocumentChunk::DocumentUrl { document_url } => ContentBlock::DocumentUrl { document_url },
            DocumentChunk::ImageUrl { image_url } => ContentBlock::ImageUrl { image_url },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

/// Body of `POST /chat/completions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub document_image_limit: u32,
    pub document_page_limit: u32,
}

/// An inline PDF that must be uploaded and signed before OCR can see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest<'a> {
    pub file_name: &'a str,
    pub media_type: &'a str,
    pub bytes: &'a [u8],
    pub expiry_hours: u32,
    pub model: String,
    pub include_image_base64: bool,
}

impl UploadRequest<'_> {
    /// The OCR request to send once the upload has a signed URL.
    pub fn ocr_request(&self, signed_url: impl Into<String>) -> OcrRequest {
        OcrRequest {
            model: self.model.clone(),
            document: DocumentChunk::new(DocumentKind::Pdf, signed_url),
            include_image_base64: self.include_image_base64,
        }
    }
}

/// A ready-to-send request. Borrowed from the document it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionRequest<'a> {
    Ocr(OcrRequest),
    UploadThenOcr(UploadRequest<'a>),
    Chat(ChatRequest),
}

impl ExtractionRequest<'_> {
    pub fn attempt(&self) -> Attempt {
        match self {
            ExtractionRequest::Ocr(_) | ExtractionRequest::UploadThenOcr(_) => Attempt::DirectOcr,
            ExtractionRequest::Chat(_) => Attempt::DocumentUnderstanding,
        }
    }
}

/// Build the request for `attempt` against `doc`.
///
/// Fails fast with [`ItemError::Build`] when the reference carries no usable
/// content; nothing is sent over the network in that case.
pub fn build_request<'a>(
    doc: &'a DocumentRef,
    attempt: Attempt,
    config: &ExtractionConfig,
) -> Result<ExtractionRequest<'a>, ItemError> {
    validate(doc)?;

    let request = match (attempt, doc) {
        (Attempt::DirectOcr, DocumentRef::RemoteUrl { kind, url }) => {
            ExtractionRequest::Ocr(ocr_request(config, DocumentChunk::new(*kind, url.trim())))
        }
        (
            Attempt::DirectOcr,
            DocumentRef::InlineBytes {
                kind: DocumentKind::Pdf,
                media_type,
                bytes,
            },
        ) => ExtractionRequest::UploadThenOcr(UploadRequest {
            file_name: UPLOAD_FILE_NAME,
            media_type,
            bytes,
            expiry_hours: config.signed_url_expiry_hours,
            model: config.ocr_model.clone(),
            include_image_base64: config.include_image_base64,
        }),
        (
            Attempt::DirectOcr,
            DocumentRef::InlineBytes {
                kind: DocumentKind::Image,
                media_type,
                bytes,
            },
        ) => ExtractionRequest::Ocr(ocr_request(
            config,
            DocumentChunk::new(DocumentKind::Image, encode::data_uri(media_type, bytes)),
        )),
        (Attempt::DocumentUnderstanding, DocumentRef::RemoteUrl { kind, url }) => {
            ExtractionRequest::Chat(chat_request(config, DocumentChunk::new(*kind, url.trim())))
        }
        (
            Attempt::DocumentUnderstanding,
            DocumentRef::InlineBytes {
                kind,
                media_type,
                bytes,
            },
        ) => ExtractionRequest::Chat(chat_request(
            config,
            DocumentChunk::new(*kind, encode::data_uri(media_type, bytes)),
        )),
    };

    Ok(request)
}

fn ocr_request(config: &ExtractionConfig, document: DocumentChunk) -> OcrRequest {
    OcrRequest {
        model: config.ocr_model.clone(),
        document,
        include_image_base64: config.include_image_base64,
    }
}

fn chat_request(config: &ExtractionConfig, document: DocumentChunk) -> ChatRequest {
    let instruction = prompts::instruction(config.instruction.as_deref());
    ChatRequest {
        model: config.chat_model.clone(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentBlock::Text {
                    text: instruction.to_string(),
                },
                document.into(),
            ],
        }],
        document_image_limit: config.document_image_limit,
        document_page_limit: config.document_page_limit,
    }
}

fn validate(doc: &DocumentRef) -> Result<(), ItemError> {
    match doc {
        DocumentRef::RemoteUrl { url, .. } => {
            if url.trim().is_empty() {
                return Err(ItemError::Build("empty document URL".into()));
            }
        }
        DocumentRef::InlineBytes {
            kind,
            media_type,
            bytes,
        } => {
            if bytes.is_empty() {
                return Err(ItemError::Build("empty document content".into()));
            }
            if media_type.trim().is_empty() {
                return Err(ItemError::Build("missing media type".into()));
            }
            if let Some((sniffed, _)) = encode::sniff(bytes) {
                if sniffed != *kind {
                    return Err(ItemError::Build(format!(
                        "declared {kind:?} but content looks like {sniffed:?}"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    #[test]
    fn remote_pdf_ocr_payload_matches_wire_shape() {
        let doc = DocumentRef::remote(DocumentKind::Pdf, "https://x.org/a.pdf");
        let req = build_request(&doc, Attempt::DirectOcr, &config()).unwrap();
        let ExtractionRequest::Ocr(ocr) = req else {
            panic!("expected OCR request");
        };
        assert_eq!(
            serde_json::to_value(&ocr).unwrap(),
            json!({
                "model": "mistral-ocr-latest",
                "document": {"type": "document_url", "document_url": "https://x.org/a.pdf"},
                "include_image_base64": true
            })
        );
    }

    #[test]
    fn inline_image_is_embedded_as_data_uri() {
        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];
        let doc = DocumentRef::inline(DocumentKind::Image, "image/png", png);
        let req = build_request(&doc, Attempt::DirectOcr, &config()).unwrap();
        let ExtractionRequest::Ocr(ocr) = req else {
            panic!("expected OCR request");
        };
        let value = serde_json::to_value(&ocr).unwrap();
        assert_eq!(value["document"]["type"], "image_url");
        assert!(ocr.document.url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn inline_pdf_requires_upload() {
        let doc = DocumentRef::pdf_bytes(b"%PDF-1.4 body".to_vec());
        let req = build_request(&doc, Attempt::DirectOcr, &config()).unwrap();
        let ExtractionRequest::UploadThenOcr(up) = req else {
            panic!("expected upload request");
        };
        assert_eq!(up.expiry_hours, 24);
        assert_eq!(up.media_type, "application/pdf");
        let ocr = up.ocr_request("https://signed.example/abc");
        assert_eq!(ocr.document.url(), "https://signed.example/abc");
        assert_eq!(
            serde_json::to_value(&ocr.document).unwrap()["type"],
            "document_url"
        );
    }

    #[test]
    fn chat_payload_matches_wire_shape() {
        let doc = DocumentRef::remote(DocumentKind::Image, "https://x.org/scan.png");
        let req = build_request(&doc, Attempt::DocumentUnderstanding, &config()).unwrap();
        assert_eq!(req.attempt(), Attempt::DocumentUnderstanding);
        let ExtractionRequest::Chat(chat) = req else {
            panic!("expected chat request");
        };
        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["model"], "mistral-large-latest");
        assert_eq!(value["document_image_limit"], 10);
        assert_eq!(value["document_page_limit"], 100);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(
            value["messages"][0]["content"][1],
            json!({"type": "image_url", "image_url": "https://x.org/scan.png"})
        );
    }

    #[test]
    fn empty_inputs_fail_before_network() {
        let empty_url = DocumentRef::remote(DocumentKind::Pdf, "   ");
        assert!(matches!(
            build_request(&empty_url, Attempt::DirectOcr, &config()),
            Err(ItemError::Build(_))
        ));

        let empty_bytes = DocumentRef::pdf_bytes(Vec::new());
        assert!(matches!(
            build_request(&empty_bytes, Attempt::DocumentUnderstanding, &config()),
            Err(ItemError::Build(_))
        ));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let doc = DocumentRef::inline(DocumentKind::Image, "image/png", b"%PDF-1.7".to_vec());
        let err = build_request(&doc, Attempt::DirectOcr, &config()).unwrap_err();
        assert!(err.to_string().contains("Pdf"), "got: {err}");
    }
}
