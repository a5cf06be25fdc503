//! Result types: per-call outcomes, per-document results, whole jobs.

use crate::config::OperationMode;
use crate::document::NamedDocument;
use crate::error::ItemError;
use serde::{Deserialize, Serialize};

/// Which extraction rule produced the canonical text.
///
/// `Extracted` marks the path-tagged dump produced by the last-resort walk;
/// callers should not present it as clean prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Markdown,
    Text,
    Elements,
    Content,
    Extracted,
    Unknown,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Markdown => "markdown",
            SourceFormat::Text => "text",
            SourceFormat::Elements => "elements",
            SourceFormat::Content => "content",
            SourceFormat::Extracted => "extracted",
            SourceFormat::Unknown => "unknown",
        }
    }
}

/// Canonical text. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub source_format: SourceFormat,
}

/// The result of normalising one backend response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success {
        text: String,
        source_format: SourceFormat,
    },
    /// Retry once with the document-understanding operation.
    Escalate { reason: String },
    Failure(ItemError),
}

impl ExtractionOutcome {
    /// Construct a success, demoting blank text to a failure.
    pub fn success(text: impl Into<String>, source_format: SourceFormat) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            ExtractionOutcome::Failure(ItemError::NoText {
                shape: source_format.as_str().into(),
                raw: None,
            })
        } else {
            ExtractionOutcome::Success {
                text,
                source_format,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }
}

/// Outcome for one submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    /// 0-indexed position in the submitted batch.
    pub index: usize,
    pub display_name: String,
    pub outcome: Result<ExtractedText, ItemError>,
    /// The operation that produced `outcome`.
    pub mode_used: OperationMode,
    /// True when the direct OCR attempt escalated to document understanding.
    pub escalated: bool,
    pub duration_ms: u64,
}

impl DocumentResult {
    pub fn failed(index: usize, display_name: impl Into<String>, error: ItemError) -> Self {
        Self {
            index,
            display_name: display_name.into(),
            outcome: Err(error),
            mode_used: OperationMode::DirectOcr,
            escalated: false,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn text(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(|t| t.text.as_str())
    }

    pub fn error(&self) -> Option<&ItemError> {
        self.outcome.as_ref().err()
    }

    /// The `(text, format)` or error-message pair a UI layer shows.
    pub fn display_text(&self, verbose: bool) -> String {
        match &self.outcome {
            Ok(t) => t.text.clone(),
            Err(e) => e.user_message(&self.display_name, verbose),
        }
    }
}

/// Aggregate statistics for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub escalated: usize,
    pub total_duration_ms: u64,
}

/// An ordered batch of documents with one result per document.
///
/// `results[i]` always belongs to `documents[i]`.
#[derive(Debug, Clone, Default)]
pub struct ProcessingJob {
    pub documents: Vec<NamedDocument>,
    pub results: Vec<DocumentResult>,
}

impl ProcessingJob {
    pub fn new(documents: Vec<NamedDocument>) -> Self {
        let results = Vec::with_capacity(documents.len());
        Self { documents, results }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True once every document has a result.
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.documents.len()
    }

    /// Record the result for the next pending document.
    pub(crate) fn push(&mut self, mut result: DocumentResult) {
        result.index = self.results.len();
        self.results.push(result);
    }

    /// Pairs of document and result, in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&NamedDocument, &DocumentResult)> {
        self.documents.iter().zip(self.results.iter())
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            total: self.documents.len(),
            succeeded: self.results.iter().filter(|r| r.is_success()).count(),
            failed: self.results.iter().filter(|r| !r.is_success()).count(),
            escalated: self.results.iter().filter(|r| r.escalated).count(),
            total_duration_ms: self.results.iter().map(|r| r.duration_ms).sum(),
        }
    }

    /// Successful texts joined into one document, each under a heading with
    /// its display name.
    pub fn combined_markdown(&self) -> String {
        let parts: Vec<String> = self
            .results
            .iter()
            .filter_map(|r| r.text().map(|t| format!("# {}\n\n{}", r.display_name, t.trim_end())))
            .collect();
        let mut out = parts.join("\n\n---\n\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentKind, DocumentRef};

    fn ok(name: &str, text: &str) -> DocumentResult {
        DocumentResult {
            index: 99,
            display_name: name.into(),
            outcome: Ok(ExtractedText {
                text: text.into(),
                source_format: SourceFormat::Markdown,
            }),
            mode_used: OperationMode::DirectOcr,
            escalated: false,
            duration_ms: 10,
        }
    }

    #[test]
    fn blank_success_becomes_failure() {
        assert!(!ExtractionOutcome::success("  \n\t", SourceFormat::Text).is_success());
        assert!(ExtractionOutcome::success("x", SourceFormat::Text).is_success());
    }

    #[test]
    fn push_reindexes_in_order() {
        let docs = vec![
            NamedDocument::new("a", DocumentRef::remote(DocumentKind::Pdf, "https://x/a.pdf")),
            NamedDocument::new("b", DocumentRef::remote(DocumentKind::Pdf, "https://x/b.pdf")),
        ];
        let mut job = ProcessingJob::new(docs);
        job.push(ok("a", "one"));
        assert!(!job.is_complete());
        job.push(DocumentResult::failed(7, "b", ItemError::Build("empty".into())));
        assert!(job.is_complete());
        assert_eq!(job.results[0].index, 0);
        assert_eq!(job.results[1].index, 1);

        let stats = job.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn combined_markdown_skips_failures() {
        let mut job = ProcessingJob::new(vec![]);
        job.results.push(ok("a.pdf", "Hello\n"));
        job.results.push(DocumentResult::failed(1, "b.pdf", ItemError::Build("x".into())));
        job.results.push(ok("c.png", "World"));
        assert_eq!(
            job.combined_markdown(),
            "# a.pdf\n\nHello\n\n---\n\n# c.png\n\nWorld\n"
        );
    }

    #[test]
    fn result_serialises_to_json() {
        let json = serde_json::to_value(ok("a.pdf", "Hello")).unwrap();
        assert_eq!(json["outcome"]["Ok"]["source_format"], "markdown");
        assert_eq!(json["mode_used"], "direct_ocr");
    }
}
