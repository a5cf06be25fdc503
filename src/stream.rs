//! Streaming extraction API: emit each document's result as it completes.
//!
//! Unlike the eager [`crate::extract::extract_batch`], which returns only
//! after every document finishes, [`extract_stream`] yields results through
//! a `Stream`. Documents are still processed one at a time, so results
//! arrive in submission order.

use crate::config::ExtractionConfig;
use crate::document::NamedDocument;
use crate::extract::{pause, run_isolated};
use crate::output::DocumentResult;
use crate::pipeline::transport::Transport;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document results.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentResult> + Send>>;

/// Extract `documents` sequentially, yielding each result when it is ready.
///
/// The inter-document delay is applied between items, never before the first.
/// Dropping the stream stops processing after the in-flight document.
///
/// # Example
/// ```rust,no_run
/// use docextract::{DocumentKind, ExtractionConfig, Extractor, NamedDocument};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().api_key("sk-...").build()?;
/// let extractor = Extractor::from_config(config)?;
/// let docs = vec![NamedDocument::from_url(DocumentKind::Pdf, "https://example.com/a.pdf", 1)];
/// let mut results = extractor.stream(docs);
/// while let Some(r) = results.next().await {
///     match r.text() {
///         Some(t) => println!("{}: {} chars", r.display_name, t.len()),
///         None => eprintln!("{}", r.display_text(false)),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    transport: Arc<dyn Transport>,
    documents: Vec<NamedDocument>,
    config: ExtractionConfig,
) -> DocumentStream {
    let total = documents.len();
    info!("Starting streaming extraction of {} document(s)", total);

    let s = stream::iter(documents.into_iter().enumerate()).then(move |(index, document)| {
        let transport = Arc::clone(&transport);
        let cfg = config.clone();
        async move {
            if index > 0 {
                pause(&cfg).await;
            }
            run_isolated(transport.as_ref(), &document, &cfg, index, total).await
        }
    });

    Box::pin(s)
}
