//! # docextract
//!
//! Extract text from PDFs and images with a cloud OCR backend.
//!
//! Each document is sent to the backend's OCR endpoint. Whatever JSON comes
//! back is reduced to one canonical text by an ordered list of extraction
//! rules. When the OCR call reports a logical error, the document is retried
//! once through the chat endpoint ("document understanding") with an
//! instruction to transcribe verbatim.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL / data URI
//!  │
//!  ├─ 1. Input      resolve to a named document (sniff PDF vs image)
//!  ├─ 2. Request    build the OCR or chat payload
//!  ├─ 3. Transport  upload → signed URL → OCR, or a single chat call
//!  ├─ 4. Normalize  any body → Success / Escalate / Failure
//!  └─ 5. Batch      one result per document, in order, with a fixed delay
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docextract::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("MISTRAL_API_KEY")?)
//!         .build()?;
//!     let job = extract(&["scan.pdf".to_string()], &config).await?;
//!     for result in &job.results {
//!         println!("{}", result.display_text(false));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Operation Modes
//!
//! | Mode | Behaviour |
//! |------|-----------|
//! | `DirectOcr` | OCR endpoint only |
//! | `DocumentUnderstanding` | chat endpoint only |
//! | `Auto` (default) | OCR, then one chat attempt if OCR reports an error |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docextract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docextract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credentials;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EscalationScope, ExtractionConfig, ExtractionConfigBuilder, OperationMode};
pub use credentials::{resolve_api_key, KeySource};
pub use document::{DocumentKind, DocumentRef, NamedDocument};
pub use error::{DocExtractError, ItemError, TransportError};
pub use extract::{extract, extract_batch, extract_document, extract_sync, write_combined, Extractor};
pub use output::{
    BatchStats, DocumentResult, ExtractedText, ExtractionOutcome, ProcessingJob, SourceFormat,
};
pub use pipeline::normalize::normalize;
pub use pipeline::request::{build_request, Attempt, ExtractionRequest};
pub use pipeline::transport::{HttpTransport, KeyStatus, Transport};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, DocumentStream};
