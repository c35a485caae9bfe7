//! CLI binary for pdf-reveal.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`, opens
//! the document index under the data directory, and prints results. Machine
//! output (JSON, NDJSON) goes to stdout; logs, progress and summaries go to
//! stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_reveal::{
    DocumentId, LocalDocumentStore, OcrEvent, Orchestrator, PipelineConfig, ResultKind,
    RevealError,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store a PDF (local path or URL) and note its id
  pdfreveal ingest contract.pdf

  # Reveal low-contrast text as images (cached after the first run)
  pdfreveal pixel <ID>

  # OCR every page once, streaming NDJSON events
  pdfreveal ocr <ID> > events.ndjson

  # Export the revealed pages as a PDF
  pdfreveal export <ID> --kind pixel -o revealed.pdf

ENVIRONMENT VARIABLES:
  PDFREVEAL_DATA_DIR      Root for uploads/, results/ and documents.json
  PDFREVEAL_OWNER         Owner the documents are filed under
  PDFREVEAL_LANG          Tesseract language(s), e.g. eng or eng+deu
  PDFREVEAL_TESSERACT     Path to the tesseract binary
  PDFIUM_LIB_PATH         Path to libpdfium (or the directory holding it)
  RUST_LOG                Overrides --verbose / --quiet log filtering

SETUP:
  pdfium:     download a build from bblanchon/pdfium-binaries and point
              PDFIUM_LIB_PATH at it (or drop it next to the binary).
  tesseract:  apt install tesseract-ocr / brew install tesseract
"#;

/// Reveal hidden and low-contrast text in PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "pdfreveal",
    version,
    about = "Reveal hidden and low-contrast text in PDF documents",
    long_about = "Store PDF documents and run them through a pixel reveal (invert, \
normalise, sharpen) and a one-time OCR pass. Results are written per page under the \
data directory and can be exported back to PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data directory holding uploads, results and the document index.
    #[arg(long, global = true, env = "PDFREVEAL_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Owner the documents are filed under.
    #[arg(long, global = true, env = "PDFREVEAL_OWNER", default_value = "local")]
    owner: String,

    /// Page render scale factor.
    #[arg(long, global = true, env = "PDFREVEAL_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Pages processed concurrently in pixel and render runs.
    #[arg(short, long, global = true, env = "PDFREVEAL_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Tesseract language(s).
    #[arg(long, global = true, env = "PDFREVEAL_LANG", default_value = "eng")]
    lang: String,

    /// Path to the tesseract binary.
    #[arg(long, global = true, env = "PDFREVEAL_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// pdfium library file or directory.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Maximum upload size in bytes.
    #[arg(long, global = true, env = "PDFREVEAL_MAX_UPLOAD", default_value_t = pdf_reveal::config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload: u64,

    /// Documents kept per owner before the oldest is evicted.
    #[arg(long, global = true, env = "PDFREVEAL_MAX_DOCUMENTS", default_value_t = 5)]
    max_documents: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDFREVEAL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFREVEAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFREVEAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFREVEAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and store a PDF from a local path or HTTP/HTTPS URL.
    Ingest { input: String },
    /// List stored documents, oldest first.
    List {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Render unprocessed page images.
    Render { id: String },
    /// Run the pixel reveal (cached after the first successful run).
    Pixel { id: String },
    /// Run OCR once, streaming NDJSON events to stdout.
    Ocr { id: String },
    /// Assemble stored page images into a PDF.
    Export {
        id: String,
        #[arg(long, value_enum, default_value = "pixel")]
        kind: KindArg,
        /// Output file; defaults to `<name>_<kind>.pdf` in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a document with its source and results.
    Delete { id: String },
    /// Show a document record.
    Status { id: String },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Original,
    Pixel,
}

impl From<KindArg> for ResultKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Original => ResultKind::Original,
            KindArg::Pixel => ResultKind::Pixel,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Build pipeline ───────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let index = cli.data_dir.join("documents.json");
    let documents = LocalDocumentStore::open(&index)
        .await
        .with_context(|| format!("Failed to open document index {:?}", index))?;
    let pipeline = Orchestrator::with_defaults(config, Arc::new(documents));

    match &cli.command {
        Command::Ingest { input } => {
            let doc = pipeline
                .ingest(&cli.owner, input)
                .await
                .context("Ingest failed")?;
            print_json(&doc)?;
            if !cli.quiet {
                eprintln!(
                    "{} Stored {}  {}",
                    green("✔"),
                    bold(&doc.original_name),
                    dim(&format!("{} pages, id {}", doc.page_count, doc.id)),
                );
            }
        }
        Command::List { json } => {
            let docs = pipeline.list(&cli.owner).await?;
            if *json {
                print_json(&docs)?;
            } else if docs.is_empty() {
                eprintln!("{}", dim("No documents."));
            } else {
                for doc in docs {
                    println!(
                        "{}  {:<40}  {:>4} pages  pixel:{}  ocr:{:?}",
                        doc.id,
                        doc.original_name,
                        doc.page_count,
                        if doc.cached_pixel().is_some() { "yes" } else { "no" },
                        doc.ocr_status,
                    );
                }
            }
        }
        Command::Render { id } => {
            let spinner = spinner(show_progress, "Rendering");
            let listing = pipeline.render_originals(&DocumentId::from(id.as_str())).await;
            spinner.finish_and_clear();
            let listing = listing.context("Render failed")?;
            print_json(&listing)?;
        }
        Command::Pixel { id } => {
            let spinner = spinner(show_progress, "Revealing");
            let listing = pipeline.run_pixel(&DocumentId::from(id.as_str())).await;
            spinner.finish_and_clear();
            let listing = listing.context("Pixel reveal failed")?;
            print_json(&listing)?;
        }
        Command::Ocr { id } => run_ocr(&pipeline, id, show_progress, cli.quiet).await?,
        Command::Export { id, kind, output } => {
            let exported = pipeline
                .export(&DocumentId::from(id.as_str()), (*kind).into())
                .await
                .context("Export failed")?;
            let path = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&exported.file_name));
            tokio::fs::write(&path, &exported.bytes)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} pages  →  {}",
                    green("✔"),
                    exported.page_count,
                    bold(&path.display().to_string()),
                );
            }
        }
        Command::Delete { id } => {
            let doc = pipeline
                .delete(&DocumentId::from(id.as_str()))
                .await
                .context("Delete failed")?;
            if !cli.quiet {
                eprintln!("{} Deleted {}", green("✔"), bold(&doc.original_name));
            }
        }
        Command::Status { id } => {
            let doc = pipeline.get(&DocumentId::from(id.as_str())).await?;
            print_json(&doc)?;
        }
    }

    Ok(())
}

/// Stream OCR events as NDJSON, mirroring progress on a bar.
async fn run_ocr(pipeline: &Orchestrator, id: &str, show_progress: bool, quiet: bool) -> Result<()> {
    let mut events = match pipeline.run_ocr(&DocumentId::from(id)).await {
        Ok(events) => events,
        Err(RevealError::AlreadyRun { cached, .. }) => {
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct AlreadyRan<'a> {
                already_ran: bool,
                #[serde(flatten)]
                listing: Option<&'a pdf_reveal::PageListing>,
            }
            if !quiet {
                eprintln!("{} OCR already ran for this document; cached results:", cyan("◆"));
            }
            return print_json(&AlreadyRan {
                already_ran: true,
                listing: cached.as_ref(),
            });
        }
        Err(e) => return Err(e).context("OCR failed to start"),
    };

    let bar = spinner(show_progress, "OCR");
    let stdout = io::stdout();
    let mut failure = None;

    while let Some(event) = events.next().await {
        {
            let mut handle = stdout.lock();
            handle
                .write_all(event.to_ndjson_line().as_bytes())
                .context("Failed to write to stdout")?;
            handle.flush().ok();
        }

        match &event {
            OcrEvent::Progress { page, total_pages } => {
                if bar.length() != Some(*total_pages as u64) {
                    activate_bar(&bar, *total_pages);
                }
                bar.set_message(format!("page {page}"));
            }
            OcrEvent::PageDone {
                page,
                total_pages,
                text,
                confidence,
                ..
            } => {
                bar.println(format!(
                    "  {} Page {:>3}/{:<3}  {:<8}  {}",
                    green("✓"),
                    page,
                    total_pages,
                    dim(&format!("{:>5} chars", text.chars().count())),
                    dim(&format!("{confidence:.1}% conf")),
                ));
                bar.inc(1);
            }
            OcrEvent::Complete { page_count, .. } => {
                bar.finish_and_clear();
                if !quiet {
                    eprintln!(
                        "{} {} pages recognised",
                        green("✔"),
                        bold(&page_count.to_string())
                    );
                }
            }
            OcrEvent::Error { error } => {
                bar.finish_and_clear();
                failure = Some(error.clone());
            }
        }
    }

    match failure {
        Some(error) => {
            eprintln!("{} {}", red("✘"), error);
            anyhow::bail!("OCR aborted; the document can be retried")
        }
        None => Ok(()),
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let results_root = cli.data_dir.join("results");
    let mut builder = PipelineConfig::builder()
        .data_dir(&cli.data_dir)
        // Locally, the "public" path of a result is its file path.
        .public_prefix(results_root.display().to_string())
        .render_scale(cli.scale)
        .pixel_concurrency(cli.concurrency)
        .ocr_language(cli.lang.clone())
        .tesseract_path(cli.tesseract.clone())
        .max_upload_bytes(cli.max_upload)
        .max_documents_per_owner(cli.max_documents)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib.clone());
    }

    builder.build().context("Invalid configuration")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

/// Spinner shown until the page count is known; hidden when progress is off.
fn spinner(visible: bool, prefix: &'static str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix(prefix);
    bar.set_message("Opening PDF…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Switch to the full progress-bar style once we know `total`.
fn activate_bar(bar: &ProgressBar, total: usize) {
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  \
         [{bar:42.green/238}] {pos:>3}/{len} pages  \
         ⏱ {elapsed_precise}  ETA {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS);

    bar.set_length(total as u64);
    bar.set_style(style);
    bar.reset_eta();
}
