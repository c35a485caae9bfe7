//! # pdf-reveal
//!
//! Expose hidden or low-visibility text in PDF documents.
//!
//! Text can be hidden in a PDF by drawing it white-on-white, in a colour a few
//! levels off the background, or under other content. Text extraction tools
//! that read the content stream can be fooled by all of these. This crate
//! works on what the page *looks like* instead: every page is rasterised and
//! run through two independent transforms.
//!
//! * **Pixel reveal**: invert, stretch contrast and sharpen, so that faint
//!   marks become obvious in the output image.
//! * **OCR**: recognise the page text with a confidence score, streamed page
//!   by page because it is by far the slowest step.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Ingest   validate path/URL (.pdf, size, %PDF), store, count pages
//!  ├─ 2. Raster   pages at 2.0× onto white via pdfium (spawn_blocking)
//!  ├─ 3a. Pixel   negate → normalise → sharpen → page_N.png   (cached)
//!  ├─ 3b. OCR     tesseract → page_N.txt + NDJSON events      (exactly once)
//!  ├─ 3c. Render  unprocessed page_N.png                      (always fresh)
//!  └─ 4. Export   stored page images → PDF
//! ```
//!
//! Results are written to `<results_root>/<owner>/<document>/<kind>/` with
//! deterministic names, so reruns overwrite rather than accumulate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use pdf_reveal::{LocalDocumentStore, Orchestrator, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().data_dir("data").build()?;
//!     let documents = Arc::new(LocalDocumentStore::open("data/documents.json").await?);
//!     let pipeline = Orchestrator::with_defaults(config, documents);
//!
//!     let doc = pipeline.ingest("alice", "contract.pdf").await?;
//!     let pixel = pipeline.run_pixel(&doc.id).await?;
//!     eprintln!("revealed {} pages", pixel.page_count);
//!
//!     let mut events = pipeline.run_ocr(&doc.id).await?;
//!     while let Some(event) = events.next().await {
//!         print!("{}", event.to_ndjson_line());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfreveal` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-reveal = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! A pdfium shared library (`PDFIUM_LIB_PATH`, `./`, or system-wide) and, for
//! OCR, the `tesseract` binary with the configured language data.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod flight;
pub mod library;
pub mod orchestrator;
pub mod pipeline;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{
    Document, DocumentId, DocumentStore, DocumentUpdate, LocalDocumentStore, OcrStatus,
};
pub use error::{ExtractError, RevealError};
pub use events::{OcrEvent, OcrEventStream, PageListing, PageRef};
pub use orchestrator::{ExportedPdf, Orchestrator};
pub use pipeline::ocr::{OcrEngine, OcrText, TesseractEngine};
pub use pipeline::raster::{PageRasterizer, PdfBytes, PdfiumRasterizer};
pub use store::{Completion, ResultKind, ResultStore};
