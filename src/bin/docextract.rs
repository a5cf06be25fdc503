//! CLI binary for docextract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docextract::credentials::{self, KeySource};
use docextract::pipeline::input;
use docextract::{
    write_combined, DocumentKind, EscalationScope, ExtractionConfig, ExtractionProgressCallback,
    Extractor, KeyStatus, OperationMode, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// document.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|g| g.map(|t| t.elapsed().as_secs_f64()))
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total} document(s)…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_escalation(&self, _index: usize, name: &str, reason: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("↻"),
            name,
            dim(&format!("OCR failed ({}), trying document understanding", truncate_for_line(reason))),
        ));
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<32}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&truncate_for_line(error)),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} document(s) extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} document(s) extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate_for_line(s: &str) -> String {
    let first = s.lines().next().unwrap_or("");
    match first.char_indices().nth(79) {
        Some((idx, _)) => format!("{}\u{2026}", &first[..idx]),
        None => first.to_string(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one PDF to stdout
  docextract scan.pdf

  # Several inputs, combined into one Markdown file
  docextract a.pdf b.png https://example.com/report.pdf -o combined.md

  # Remote image whose URL has no extension
  docextract --kind image https://example.com/render?id=42

  # Force the chat-based document understanding path
  docextract --mode understanding contract.pdf

  # JSON results with per-document status
  docextract --json a.pdf b.pdf > results.json

  # Check that the API key is accepted
  docextract --validate-key

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         API key (after --api-key and the secrets file)
  DOCEXTRACT_BASE_URL     Override the API root

SECRETS FILE:
  TOML with a single entry, by default at <config dir>/docextract/secrets.toml:
    MISTRAL_API_KEY = "..."
"#;

/// Extract text from PDFs and images with a cloud OCR backend.
#[derive(Parser, Debug)]
#[command(
    name = "docextract",
    version,
    about = "Extract text from PDFs and images with a cloud OCR backend",
    long_about = "Send PDFs and images (local files, URLs or data URIs) to an OCR endpoint and \
print the extracted text. In auto mode a document whose OCR call reports an error is retried \
once through the chat endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths, HTTP/HTTPS URLs or base64 data URIs.
    #[arg(required_unless_present = "validate_key")]
    inputs: Vec<String>,

    /// Declared kind for every input. `auto` sniffs files and uses URL extensions.
    #[arg(long, value_enum, default_value = "auto")]
    kind: KindArg,

    /// Operation: auto (OCR, then chat on error), ocr, understanding.
    #[arg(long, env = "DOCEXTRACT_MODE", value_enum, default_value = "auto")]
    mode: ModeArg,

    /// API key. Takes precedence over the secrets file and MISTRAL_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// TOML secrets file holding MISTRAL_API_KEY.
    #[arg(long, env = "DOCEXTRACT_SECRETS_FILE")]
    secrets_file: Option<PathBuf>,

    /// API root.
    #[arg(long, env = "DOCEXTRACT_BASE_URL", default_value = docextract::config::DEFAULT_API_BASE_URL)]
    base_url: String,

    /// Model for direct OCR.
    #[arg(long, env = "DOCEXTRACT_OCR_MODEL", default_value = docextract::config::DEFAULT_OCR_MODEL)]
    ocr_model: String,

    /// Model for document understanding.
    #[arg(long, env = "DOCEXTRACT_CHAT_MODEL", default_value = docextract::config::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Pause between documents, in milliseconds.
    #[arg(long, env = "DOCEXTRACT_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Total timeout for OCR on PDFs and uploads, in seconds.
    #[arg(long, default_value_t = 120)]
    ocr_timeout: u64,

    /// Total timeout for document understanding, in seconds.
    #[arg(long, default_value_t = 300)]
    understanding_timeout: u64,

    /// Where to look for error markers when no text was found: raw, top-level.
    #[arg(long, value_enum, default_value = "raw")]
    escalation_scope: ScopeArg,

    /// Check the API key and exit.
    #[arg(long)]
    validate_key: bool,

    /// Output structured JSON (per-document results and stats).
    #[arg(long, env = "DOCEXTRACT_JSON")]
    json: bool,

    /// Write combined Markdown to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "DOCEXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs and include raw bodies in errors.
    #[arg(short, long, env = "DOCEXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCEXTRACT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Auto,
    Pdf,
    Image,
}

impl KindArg {
    fn hint(self) -> Option<DocumentKind> {
        match self {
            KindArg::Auto => None,
            KindArg::Pdf => Some(DocumentKind::Pdf),
            KindArg::Image => Some(DocumentKind::Image),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Auto,
    Ocr,
    Understanding,
}

impl From<ModeArg> for OperationMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Auto => OperationMode::Auto,
            ModeArg::Ocr => OperationMode::DirectOcr,
            ModeArg::Understanding => OperationMode::DocumentUnderstanding,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ScopeArg {
    Raw,
    TopLevel,
}

impl From<ScopeArg> for EscalationScope {
    fn from(v: ScopeArg) -> Self {
        match v {
            ScopeArg::Raw => EscalationScope::RawBody,
            ScopeArg::TopLevel => EscalationScope::TopLevel,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.validate_key;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Credential ───────────────────────────────────────────────────────
    let interactive = io::stdin().is_terminal() && !cli.quiet;
    let (api_key, source) = credentials::resolve_api_key(
        cli.api_key.as_deref(),
        cli.secrets_file.as_deref(),
        if interactive {
            Some(&prompt_for_key as &dyn Fn() -> Option<String>)
        } else {
            None
        },
    )
    .context("No usable API key")?;
    if source != KeySource::Explicit {
        tracing::debug!("API key source: {:?}", source);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, api_key, progress_cb)?;
    let extractor = Extractor::from_config(config).context("Failed to set up HTTP client")?;

    // ── Key validation mode ──────────────────────────────────────────────
    if cli.validate_key {
        let status = extractor
            .validate_key()
            .await
            .context("Could not reach the API")?;
        match status {
            KeyStatus::Valid => eprintln!("{} API key is valid", green("✔")),
            KeyStatus::Invalid => {
                eprintln!("{} API key was rejected (HTTP 401)", red("✘"));
                std::process::exit(1);
            }
            KeyStatus::Unknown(code) => {
                eprintln!("{} Unexpected HTTP {code} while checking the key", cyan("⚠"));
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // ── Resolve inputs and run ───────────────────────────────────────────
    let documents = input::resolve_inputs(&cli.inputs, cli.kind.hint())
        .await
        .context("Failed to resolve inputs")?;
    let job = extractor.extract_batch(documents).await;
    let stats = job.stats();

    if let Some(ref output_path) = cli.output {
        write_combined(&job, output_path)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} documents  {}ms  →  {}",
                if stats.failed == 0 { green("✔") } else { cyan("⚠") },
                stats.succeeded,
                stats.total,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else if cli.json {
        let report = serde_json::json!({
            "results": job.results,
            "stats": stats,
        });
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let markdown = job.combined_markdown();
        handle
            .write_all(markdown.as_bytes())
            .context("Failed to write to stdout")?;
    }

    // Failures go to stderr in every output mode.
    if !cli.json {
        for result in job.results.iter().filter(|r| !r.is_success()) {
            if !show_progress || cli.verbose {
                eprintln!("{}", red(&result.display_text(cli.verbose)));
            }
        }
        if !cli.quiet && !show_progress && cli.output.is_none() {
            eprintln!(
                "Extracted {}/{} documents ({} escalated) in {}ms",
                stats.succeeded, stats.total, stats.escalated, stats.total_duration_ms
            );
        }
    }

    if stats.total > 0 && stats.succeeded == 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(
    cli: &Cli,
    api_key: String,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .api_base_url(cli.base_url.clone())
        .api_key(api_key)
        .ocr_model(cli.ocr_model.clone())
        .chat_model(cli.chat_model.clone())
        .mode(cli.mode.into())
        .inter_document_delay_ms(cli.delay_ms)
        .connect_timeout_secs(cli.connect_timeout)
        .document_ocr_timeout_secs(cli.ocr_timeout)
        .upload_timeout_secs(cli.ocr_timeout)
        .understanding_timeout_secs(cli.understanding_timeout)
        .escalation_scope(cli.escalation_scope.into());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Ask for the key on the terminal. Input is echoed; keep it off shared screens.
fn prompt_for_key() -> Option<String> {
    eprint!("{} ", bold("Enter API key:"));
    io::stderr().flush().ok()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    let key = line.trim().to_string();
    (!key.is_empty()).then_some(key)
}
