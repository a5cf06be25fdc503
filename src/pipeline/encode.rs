//! Binary payload helpers: base64 data URIs and media-type sniffing.
//!
//! The OCR endpoint accepts images inline as `data:<mime>;base64,<payload>`
//! URIs, and the chat endpoint accepts both PDFs and images the same way.
//! PDFs sent to the OCR endpoint go through the upload path instead.

use crate::document::DocumentKind;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,(.*)$").unwrap());

/// Wrap raw bytes as a base64 data URI.
pub fn data_uri(media_type: &str, bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64", bytes.len(), b64.len());
    format!("data:{media_type};base64,{b64}")
}

/// Split a base64 data URI into its media type and decoded bytes.
///
/// Returns `None` for anything that is not a well-formed base64 data URI.
pub fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let caps = RE_DATA_URI.captures(uri.trim())?;
    let media_type = caps[1].to_ascii_lowercase();
    let payload: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(payload).ok()?;
    Some((media_type, bytes))
}

/// Decide the kind and media type of a blob from its leading bytes.
///
/// `%PDF` wins; otherwise anything the `image` crate recognises is an image.
pub fn sniff(bytes: &[u8]) -> Option<(DocumentKind, String)> {
    if bytes.starts_with(b"%PDF") {
        return Some((DocumentKind::Pdf, "application/pdf".to_string()));
    }
    image::guess_format(bytes)
        .ok()
        .map(|fmt| (DocumentKind::Image, fmt.to_mime_type().to_string()))
}

/// Kind implied by a media type.
pub fn kind_for_media_type(media_type: &str) -> Option<DocumentKind> {
    let mt = media_type.to_ascii_lowercase();
    if mt == "application/pdf" {
        Some(DocumentKind::Pdf)
    } else if mt.starts_with("image/") {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn data_uri_parses_back() {
        let uri = data_uri("image/png", b"abc");
        assert_eq!(uri, "data:image/png;base64,YWJj");
        let (mt, bytes) = parse_data_uri(&uri).expect("valid data uri");
        assert_eq!(mt, "image/png");
        assert_eq!(bytes, b"abc");
    }

    #[test]
    fn parse_rejects_non_base64_uris() {
        assert!(parse_data_uri("data:text/plain,hello").is_none());
        assert!(parse_data_uri("https://example.com/a.pdf").is_none());
        assert!(parse_data_uri("data:image/png;base64,@@@").is_none());
    }

    #[test]
    fn sniff_pdf_and_png() {
        assert_eq!(
            sniff(b"%PDF-1.7\n..."),
            Some((DocumentKind::Pdf, "application/pdf".to_string()))
        );
        assert_eq!(
            sniff(PNG_MAGIC),
            Some((DocumentKind::Image, "image/png".to_string()))
        );
        assert_eq!(sniff(b"hello world"), None);
    }

    #[test]
    fn media_type_kinds() {
        assert_eq!(kind_for_media_type("application/PDF"), Some(DocumentKind::Pdf));
        assert_eq!(kind_for_media_type("image/jpeg"), Some(DocumentKind::Image));
        assert_eq!(kind_for_media_type("text/plain"), None);
    }
}
