//! Input resolution: turn user-supplied strings into [`NamedDocument`]s.
//!
//! Three forms are accepted:
//!
//! * `http(s)://…` is sent to the backend as a URL. Nothing is downloaded;
//!   the kind comes from the caller's hint or the URL's extension.
//! * `data:<mime>;base64,<payload>` is decoded into inline bytes.
//! * Anything else is a local path. The file is read and its kind sniffed
//!   from the leading bytes (`%PDF` or a recognised image signature), so a
//!   misnamed file is still sent the right way.

use crate::document::{DocumentKind, DocumentRef, NamedDocument};
use crate::error::DocExtractError;
use crate::pipeline::encode;
use std::path::{Path, PathBuf};
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff", "avif",
];

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string is a data URI.
pub fn is_data_uri(input: &str) -> bool {
    input.starts_with("data:")
}

/// Resolve one input. `position` is 1-indexed and only used for fallback names.
pub async fn resolve_input(
    input: &str,
    kind_hint: Option<DocumentKind>,
    position: usize,
) -> Result<NamedDocument, DocExtractError> {
    let input = input.trim();
    if is_url(input) {
        let kind = kind_hint.unwrap_or_else(|| kind_from_extension(input));
        debug!("Resolved remote {:?}: {}", kind, input);
        Ok(NamedDocument::from_url(kind, input, position))
    } else if is_data_uri(input) {
        resolve_data_uri(input, kind_hint, position)
    } else {
        resolve_local(Path::new(input), kind_hint).await
    }
}

/// Resolve every input in order, stopping at the first unusable one.
pub async fn resolve_inputs(
    inputs: &[String],
    kind_hint: Option<DocumentKind>,
) -> Result<Vec<NamedDocument>, DocExtractError> {
    let mut docs = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        docs.push(resolve_input(input, kind_hint, i + 1).await?);
    }
    Ok(docs)
}

/// Guess the kind from a URL's path extension; unknown extensions mean PDF.
pub fn kind_from_extension(url: &str) -> DocumentKind {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|seg| seg.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some(e) if IMAGE_EXTENSIONS.contains(&e) => DocumentKind::Image,
        _ => DocumentKind::Pdf,
    }
}

fn resolve_data_uri(
    input: &str,
    kind_hint: Option<DocumentKind>,
    position: usize,
) -> Result<NamedDocument, DocExtractError> {
    let unsupported = |reason: &str| DocExtractError::UnsupportedInput {
        input: format!("data URI #{position}"),
        reason: reason.to_string(),
    };
    let (media_type, bytes) =
        encode::parse_data_uri(input).ok_or_else(|| unsupported("not a base64 data URI"))?;
    let kind = kind_hint
        .or_else(|| encode::kind_for_media_type(&media_type))
        .ok_or_else(|| unsupported(&format!("media type '{media_type}' is not a PDF or image")))?;
    Ok(NamedDocument::new(
        format!("File-{position}"),
        DocumentRef::inline(kind, media_type, bytes),
    ))
}

async fn resolve_local(path: &Path, kind_hint: Option<DocumentKind>) -> Result<NamedDocument, DocExtractError> {
    let path = PathBuf::from(path);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocExtractError::PermissionDenied { path });
        }
        Err(_) => return Err(DocExtractError::FileNotFound { path }),
    };

    let (sniffed_kind, media_type) =
        encode::sniff(&bytes).ok_or_else(|| DocExtractError::UnsupportedInput {
            input: path.display().to_string(),
            reason: "neither a PDF nor a recognised image format".into(),
        })?;
    if let Some(hint) = kind_hint {
        if hint != sniffed_kind {
            return Err(DocExtractError::UnsupportedInput {
                input: path.display().to_string(),
                reason: format!("declared {hint:?} but content looks like {sniffed_kind:?}"),
            });
        }
    }

    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!(
        "Resolved local {:?} ({}, {} bytes): {}",
        sniffed_kind,
        media_type,
        bytes.len(),
        path.display()
    );
    Ok(NamedDocument::new(
        display_name,
        DocumentRef::inline(sniffed_kind, media_type, bytes),
    ))
}
