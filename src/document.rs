//! What to extract from: a remote URL or bytes held in memory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared media family of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// A document reference. Exactly one of url/bytes exists by construction.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentRef {
    RemoteUrl {
        kind: DocumentKind,
        url: String,
    },
    InlineBytes {
        kind: DocumentKind,
        media_type: String,
        bytes: Vec<u8>,
    },
}

impl DocumentRef {
    pub fn remote(kind: DocumentKind, url: impl Into<String>) -> Self {
        DocumentRef::RemoteUrl {
            kind,
            url: url.into(),
        }
    }

    pub fn inline(kind: DocumentKind, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        DocumentRef::InlineBytes {
            kind,
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Inline PDF bytes.
    pub fn pdf_bytes(bytes: Vec<u8>) -> Self {
        Self::inline(DocumentKind::Pdf, "application/pdf", bytes)
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentRef::RemoteUrl { kind, .. } | DocumentRef::InlineBytes { kind, .. } => *kind,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, DocumentRef::InlineBytes { .. })
    }
}

// Inline payloads can be megabytes; print their size instead.
impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRef::RemoteUrl { kind, url } => f
                .debug_struct("RemoteUrl")
                .field("kind", kind)
                .field("url", url)
                .finish(),
            DocumentRef::InlineBytes {
                kind,
                media_type,
                bytes,
            } => f
                .debug_struct("InlineBytes")
                .field("kind", kind)
                .field("media_type", media_type)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// A document plus the name shown to the user when reporting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDocument {
    pub display_name: String,
    pub document: DocumentRef,
}

impl NamedDocument {
    pub fn new(display_name: impl Into<String>, document: DocumentRef) -> Self {
        Self {
            display_name: display_name.into(),
            document,
        }
    }

    /// Name a remote document after the last path segment of its URL,
    /// falling back to `URL-{position}` (1-indexed).
    pub fn from_url(kind: DocumentKind, url: &str, position: usize) -> Self {
        let name = url
            .trim()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(|s| s.split(['?', '#']).next().unwrap_or(s))
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .map(str::to_string)
            .unwrap_or_else(|| format!("URL-{position}"));
        Self::new(name, DocumentRef::remote(kind, url.trim()))
    }
}
