//! Fixed instruction text for the document-understanding fallback.
//!
//! Callers can override it via [`crate::config::ExtractionConfig::instruction`];
//! the constant here is used only when no override is provided.

/// Instruction sent ahead of the document block in every chat request.
pub const DOCUMENT_UNDERSTANDING_INSTRUCTION: &str = "Extract all of the text in this document \
verbatim, keeping its original structure and formatting. Preserve paragraphs, lists, tables \
and the heading hierarchy exactly as they appear. Do not add interpretations or summaries.";

/// Resolve the instruction for a request.
pub fn instruction(custom: Option<&str>) -> &str {
    match custom {
        Some(text) if !text.trim().is_empty() => text,
        _ => DOCUMENT_UNDERSTANDING_INSTRUCTION,
    }
}
