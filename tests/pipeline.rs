//! Pipeline integration tests against a scripted in-memory transport.
//!
//! No network access: every backend call is answered from a queue, and every
//! call is logged so tests can assert exactly what was sent.

use async_trait::async_trait;
use docextract::pipeline::request::{ChatRequest, ContentBlock, OcrRequest, UploadRequest};
use docextract::{
    extract_batch, extract_document, extract_stream, DocumentKind, DocumentRef,
    ExtractionConfig, ExtractionProgressCallback, ItemError, KeyStatus, NamedDocument,
    OperationMode, SourceFormat, Transport, TransportError,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// ── Test helpers ─────────────────────────────────────────────────────────────

type Reply = Result<String, TransportError>;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Upload(usize),
    SignedUrl(String),
    Ocr(String),
    Chat(String),
}

#[derive(Default)]
struct FakeTransport {
    ocr_replies: Mutex<VecDeque<Reply>>,
    chat_replies: Mutex<VecDeque<Reply>>,
    log: Mutex<Vec<Call>>,
    panic_on_url: Option<String>,
}

impl FakeTransport {
    fn new() -> Self {
        Self::default()
    }

    fn ocr(self, reply: Reply) -> Self {
        self.ocr_replies.lock().unwrap().push_back(reply);
        self
    }

    fn chat(self, reply: Reply) -> Self {
        self.chat_replies.lock().unwrap().push_back(reply);
        self
    }

    fn panic_on(mut self, url: &str) -> Self {
        self.panic_on_url = Some(url.to_string());
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

fn unscripted(op: &str) -> Reply {
    Err(TransportError::Connection {
        operation: op.into(),
        detail: "no scripted reply".into(),
    })
}

#[async_trait]
impl Transport for FakeTransport {
    async fn upload_file(&self, upload: &UploadRequest<'_>) -> Result<String, TransportError> {
        self.log.lock().unwrap().push(Call::Upload(upload.bytes.len()));
        Ok("file-1".into())
    }

    async fn signed_url(&self, file_id: &str, expiry_hours: u32) -> Result<String, TransportError> {
        self.log.lock().unwrap().push(Call::SignedUrl(file_id.into()));
        Ok(format!("https://signed.example/{file_id}?expiry={expiry_hours}"))
    }

    async fn ocr(&self, request: &OcrRequest) -> Result<String, TransportError> {
        let url = request.document.url().to_string();
        self.log.lock().unwrap().push(Call::Ocr(url.clone()));
        if self.panic_on_url.as_deref() == Some(url.as_str()) {
            panic!("transport blew up on {url}");
        }
        let reply = self.ocr_replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| unscripted("ocr"))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let url = request.messages[0]
            .content
            .iter()
            .find_map(|b| match b {
                ContentBlock::DocumentUrl { document_url } => Some(document_url.clone()),
                ContentBlock::ImageUrl { image_url } => Some(image_url.clone()),
                ContentBlock::Text { .. } => None,
            })
            .unwrap_or_default();
        self.log.lock().unwrap().push(Call::Chat(url));
        let reply = self.chat_replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| unscripted("chat"))
    }

    async fn validate_key(&self) -> Result<KeyStatus, TransportError> {
        Ok(KeyStatus::Valid)
    }
}

const SECRET: &str = "sk-test-very-secret";

fn config(mode: OperationMode) -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key(SECRET)
        .mode(mode)
        .inter_document_delay_ms(0)
        .build()
        .unwrap()
}

fn pdf_url(name: &str) -> NamedDocument {
    NamedDocument::from_url(DocumentKind::Pdf, &format!("https://docs.example/{name}"), 1)
}

fn pages(text: &str) -> Reply {
    Ok(format!(r#"{{"pages":[{{"markdown":"{text}"}}]}}"#))
}

fn chat_reply(text: &str) -> Reply {
    Ok(format!(r#"{{"choices":[{{"message":{{"role":"assistant","content":"{text}"}}}}]}}"#))
}

// ── Single document ──────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_success_does_not_touch_chat() {
    let fake = FakeTransport::new().ocr(pages("Hello"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::Auto)).await;

    assert_eq!(r.text(), Some("Hello"));
    assert_eq!(r.mode_used, OperationMode::DirectOcr);
    assert!(!r.escalated);
    assert_eq!(fake.count(|c| matches!(c, Call::Chat(_))), 0);
}

#[tokio::test]
async fn blank_page_reply_fails_the_item() {
    let fake = FakeTransport::new()
        .ocr(Ok(
            r#"{"pages":[{"index":0,"markdown":"","images":[]}],"model":"mistral-ocr-2503-completion"}"#.into(),
        ))
        .chat(chat_reply("unused"));
    let r = extract_document(&fake, &pdf_url("blank.pdf"), &config(OperationMode::Auto)).await;

    match r.error() {
        Some(ItemError::NoText { shape, .. }) => assert_eq!(shape, "pages"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(r.text(), None);
    assert!(!r.escalated);
    assert_eq!(fake.count(|c| matches!(c, Call::Chat(_))), 0);
}

#[tokio::test]
async fn empty_chat_choices_fail_the_escalated_item() {
    let fake = FakeTransport::new()
        .ocr(Ok(r#"{"error":"document not found"}"#.into()))
        .chat(Ok(r#"{"id":"cmpl-abc","object":"chat.completion","choices":[]}"#.into()));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::Auto)).await;

    assert!(matches!(r.error(), Some(ItemError::NoText { .. })), "got: {:?}", r.error());
    assert!(r.escalated);
}

#[tokio::test]
async fn error_body_escalates_exactly_once() {
    let fake = FakeTransport::new()
        .ocr(Ok(r#"{"error":"document not found"}"#.into()))
        .chat(chat_reply("Recovered text"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::Auto)).await;

    assert_eq!(r.text(), Some("Recovered text"));
    assert_eq!(r.outcome.as_ref().unwrap().source_format, SourceFormat::Markdown);
    assert_eq!(r.mode_used, OperationMode::DocumentUnderstanding);
    assert!(r.escalated);
    assert_eq!(
        fake.calls(),
        vec![
            Call::Ocr("https://docs.example/a.pdf".into()),
            Call::Chat("https://docs.example/a.pdf".into()),
        ]
    );
}

#[tokio::test]
async fn escalated_attempt_never_escalates_again() {
    let fake = FakeTransport::new()
        .ocr(Ok(r#"{"error":"not found"}"#.into()))
        .chat(Ok(r#"{"error":"model overloaded"}"#.into()))
        .chat(chat_reply("must not be used"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::Auto)).await;

    match r.error() {
        Some(ItemError::UpstreamLogical { message, .. }) => assert_eq!(message, "model overloaded"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(r.escalated);
    assert_eq!(fake.count(|c| matches!(c, Call::Chat(_))), 1);
    assert_eq!(fake.count(|c| matches!(c, Call::Ocr(_))), 1);
}

#[tokio::test]
async fn direct_mode_reports_error_body_without_escalating() {
    let fake = FakeTransport::new()
        .ocr(Ok(r#"{"error":"document not found"}"#.into()))
        .chat(chat_reply("unused"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::DirectOcr)).await;

    assert!(matches!(r.error(), Some(ItemError::UpstreamLogical { .. })));
    assert!(!r.escalated);
    assert_eq!(fake.count(|c| matches!(c, Call::Chat(_))), 0);
}

#[tokio::test]
async fn understanding_mode_skips_ocr() {
    let fake = FakeTransport::new().chat(chat_reply("Straight to chat"));
    let r = extract_document(
        &fake,
        &pdf_url("a.pdf"),
        &config(OperationMode::DocumentUnderstanding),
    )
    .await;

    assert_eq!(r.text(), Some("Straight to chat"));
    assert!(!r.escalated);
    assert_eq!(fake.count(|c| matches!(c, Call::Ocr(_))), 0);
}

#[tokio::test]
async fn ocr_404_escalates_in_auto_mode_only() {
    let not_found = || Err(TransportError::http("ocr", 404, "no such route"));

    let fake = FakeTransport::new().ocr(not_found()).chat(chat_reply("From chat"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::Auto)).await;
    assert_eq!(r.text(), Some("From chat"));
    assert!(r.escalated);

    let fake = FakeTransport::new().ocr(not_found()).chat(chat_reply("unused"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::DirectOcr)).await;
    assert!(matches!(
        r.error(),
        Some(ItemError::Transport(TransportError::Http { status: 404, .. }))
    ));
}

#[tokio::test]
async fn other_transport_errors_are_terminal() {
    let fake = FakeTransport::new()
        .ocr(Err(TransportError::http("ocr", 500, "boom")))
        .chat(chat_reply("unused"));
    let r = extract_document(&fake, &pdf_url("a.pdf"), &config(OperationMode::Auto)).await;

    assert_eq!(r.error().and_then(|e| match e {
        ItemError::Transport(t) => t.status(),
        _ => None,
    }), Some(500));
    assert_eq!(fake.count(|c| matches!(c, Call::Chat(_))), 0);
}

#[tokio::test]
async fn inline_pdf_is_uploaded_and_signed_url_reused_on_escalation() {
    let doc = NamedDocument::new("scan.pdf", DocumentRef::pdf_bytes(b"%PDF-1.7 body".to_vec()));
    let fake = FakeTransport::new()
        .ocr(Ok(r#"{"error":"unsupported"}"#.into()))
        .chat(chat_reply("Text"));
    let r = extract_document(&fake, &doc, &config(OperationMode::Auto)).await;

    assert_eq!(r.text(), Some("Text"));
    let signed = "https://signed.example/file-1?expiry=24".to_string();
    assert_eq!(
        fake.calls(),
        vec![
            Call::Upload(13),
            Call::SignedUrl("file-1".into()),
            Call::Ocr(signed.clone()),
            Call::Chat(signed),
        ]
    );
}

#[tokio::test]
async fn inline_image_goes_straight_to_ocr_as_data_uri() {
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    let doc = NamedDocument::new("shot.png", DocumentRef::inline(DocumentKind::Image, "image/png", png));
    let fake = FakeTransport::new().ocr(Ok(r#"{"text":"caption"}"#.into()));
    let r = extract_document(&fake, &doc, &config(OperationMode::Auto)).await;

    assert_eq!(r.text(), Some("caption"));
    match &fake.calls()[..] {
        [Call::Ocr(url)] => assert!(url.starts_with("data:image/png;base64,")),
        other => panic!("unexpected calls {other:?}"),
    }
}

#[tokio::test]
async fn empty_reference_fails_before_any_call() {
    let doc = NamedDocument::new("blank", DocumentRef::remote(DocumentKind::Pdf, ""));
    let fake = FakeTransport::new();
    let r = extract_document(&fake, &doc, &config(OperationMode::Auto)).await;

    assert!(matches!(r.error(), Some(ItemError::Build(_))));
    assert!(fake.calls().is_empty());
}

// ── Batches ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn timeout_on_one_item_leaves_neighbours_intact() {
    let fake = FakeTransport::new()
        .ocr(pages("first"))
        .ocr(Err(TransportError::Timeout {
            operation: "ocr".into(),
            secs: 120,
        }))
        .ocr(pages("third"));
    let docs = vec![pdf_url("1.pdf"), pdf_url("2.pdf"), pdf_url("3.pdf")];
    let job = extract_batch(&fake, docs, &config(OperationMode::Auto)).await;

    assert!(job.is_complete());
    assert_eq!(job.results.len(), 3);
    assert_eq!(job.results[0].text(), Some("first"));
    assert!(matches!(
        job.results[1].error(),
        Some(ItemError::Transport(TransportError::Timeout { .. }))
    ));
    assert_eq!(job.results[2].text(), Some("third"));
    for (i, (doc, result)) in job.iter().enumerate() {
        assert_eq!(result.index, i);
        assert_eq!(result.display_name, doc.display_name);
    }
    // Timeouts are terminal, so there is no chat call.
    assert_eq!(fake.count(|c| matches!(c, Call::Chat(_))), 0);
}

#[tokio::test]
async fn panic_inside_one_item_is_isolated() {
    let fake = FakeTransport::new()
        .panic_on("https://docs.example/bad.pdf")
        .ocr(pages("one"))
        .ocr(pages("three"));
    let docs = vec![pdf_url("good.pdf"), pdf_url("bad.pdf"), pdf_url("fine.pdf")];
    let job = extract_batch(&fake, docs, &config(OperationMode::Auto)).await;

    assert_eq!(job.results.len(), 3);
    assert_eq!(job.results[0].text(), Some("one"));
    match job.results[1].error() {
        Some(ItemError::Panicked(msg)) => assert!(msg.contains("blew up"), "got: {msg}"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(job.results[1].display_name, "bad.pdf");
    assert_eq!(job.results[2].text(), Some("three"));
}

#[tokio::test]
async fn empty_batch_is_an_empty_job() {
    let fake = FakeTransport::new();
    let job = extract_batch(&fake, vec![], &config(OperationMode::Auto)).await;
    assert!(job.is_empty());
    assert!(job.is_complete());
    assert_eq!(job.stats().total, 0);
}

#[tokio::test]
async fn delay_separates_items_but_not_after_the_last() {
    let fake = FakeTransport::new().ocr(pages("a")).ocr(pages("b")).ocr(pages("c"));
    let mut cfg = config(OperationMode::Auto);
    cfg.inter_document_delay_ms = 60;

    let start = Instant::now();
    let job = extract_batch(&fake, vec![pdf_url("a"), pdf_url("b"), pdf_url("c")], &cfg).await;
    let elapsed = start.elapsed().as_millis();

    assert_eq!(job.stats().succeeded, 3);
    assert!(elapsed >= 120, "two gaps expected, got {elapsed}ms");
    assert!(elapsed < 180 + 500, "no trailing delay expected, got {elapsed}ms");
}

#[tokio::test]
async fn stream_yields_results_in_submission_order() {
    let fake = Arc::new(
        FakeTransport::new()
            .ocr(pages("one"))
            .ocr(Ok(r#"{"error":"not found"}"#.into()))
            .chat(chat_reply("two"))
            .ocr(pages("three")),
    );
    let docs = vec![pdf_url("1.pdf"), pdf_url("2.pdf"), pdf_url("3.pdf")];
    let results: Vec<_> = extract_stream(fake, docs, config(OperationMode::Auto))
        .collect()
        .await;

    let texts: Vec<_> = results.iter().map(|r| r.text().unwrap_or("")).collect();
    assert_eq!(texts, ["one", "two", "three"]);
    assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), [0, 1, 2]);
    assert!(results[1].escalated);
}

#[derive(Default)]
struct Counting {
    starts: AtomicUsize,
    escalations: AtomicUsize,
    completes: AtomicUsize,
    errors: AtomicUsize,
    batch_success: AtomicUsize,
}

impl ExtractionProgressCallback for Counting {
    fn on_document_start(&self, _i: usize, _t: usize, _n: &str) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_escalation(&self, _i: usize, _n: &str, _r: &str) {
        self.escalations.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_complete(&self, _i: usize, _t: usize, _n: &str, _l: usize) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_error(&self, _i: usize, _t: usize, _n: &str, _e: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _t: usize, success: usize) {
        self.batch_success.store(success, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_document() {
    let counter = Arc::new(Counting::default());
    let mut cfg = config(OperationMode::Auto);
    cfg.progress_callback = Some(counter.clone());

    let fake = FakeTransport::new()
        .ocr(Ok(r#"{"error":"x"}"#.into()))
        .chat(chat_reply("ok"))
        .ocr(Err(TransportError::http("ocr", 500, "")));
    extract_batch(&fake, vec![pdf_url("a"), pdf_url("b")], &cfg).await;

    assert_eq!(counter.starts.load(Ordering::SeqCst), 2);
    assert_eq!(counter.escalations.load(Ordering::SeqCst), 1);
    assert_eq!(counter.completes.load(Ordering::SeqCst), 1);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.batch_success.load(Ordering::SeqCst), 1);
}

// ── Credential hygiene ───────────────────────────────────────────────────────

#[tokio::test]
async fn credential_never_appears_in_results_or_config_debug() {
    let cfg = config(OperationMode::Auto);
    assert!(!format!("{cfg:?}").contains(SECRET));

    let fake = FakeTransport::new()
        .ocr(Err(TransportError::http("ocr", 401, "invalid key")))
        .ocr(Ok(r#"{"weird":"shape here"}"#.into()));
    let job = extract_batch(&fake, vec![pdf_url("a"), pdf_url("b")], &cfg).await;

    let json = serde_json::to_string(&job.results).unwrap();
    assert!(!json.contains(SECRET));
    for r in &job.results {
        assert!(!r.display_text(true).contains(SECRET));
    }
}
