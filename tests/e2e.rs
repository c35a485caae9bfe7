//! End-to-end integration tests for pdf-reveal.
//!
//! These tests drive the real pdfium renderer and (for OCR) the tesseract
//! binary. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! Fixture PDFs are generated on the fly from synthetic page images, so only
//! the OCR test needs a file from `./test_cases/`.

use futures::StreamExt;
use image::{Rgba, RgbaImage};
use pdf_reveal::pipeline::encode::encode_png;
use pdf_reveal::pipeline::export::assemble_pdf;
use pdf_reveal::{
    LocalDocumentStore, OcrEvent, Orchestrator, PipelineConfig, ResultKind, RevealError,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn pdfium_library() -> Option<PathBuf> {
    std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from)
}

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// White page with a near-white block standing in for hidden text.
fn hidden_block_page(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let in_block = (width / 4..width * 3 / 4).contains(&x) && (height / 3..height / 2).contains(&y);
        if in_block {
            Rgba([252, 252, 252, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

async fn pipeline(tmp: &tempfile::TempDir) -> Orchestrator {
    let mut builder = PipelineConfig::builder().data_dir(tmp.path());
    if let Some(lib) = pdfium_library() {
        builder = builder.pdfium_library(lib);
    }
    let config = builder.build().expect("valid config");
    let documents = LocalDocumentStore::open(tmp.path().join("documents.json"))
        .await
        .expect("index opens");
    Orchestrator::with_defaults(config, Arc::new(documents))
}

async fn synthetic_pdf(tmp: &tempfile::TempDir, pages: usize) -> PathBuf {
    let images = (0..pages)
        .map(|_| encode_png(&hidden_block_page(200, 300)).expect("png"))
        .collect();
    let bytes = assemble_pdf(pdfium_library(), images)
        .await
        .expect("assemble fixture PDF");
    let path = tmp.path().join("hidden block.pdf");
    std::fs::write(&path, bytes).unwrap();
    path
}

// ── Pixel / render / export (pdfium only) ────────────────────────────────────

#[tokio::test]
async fn test_pixel_reveal_round_trip() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&tmp).await;
    let input = synthetic_pdf(&tmp, 2).await;

    let doc = pipeline
        .ingest("e2e", input.to_str().unwrap())
        .await
        .expect("ingest should succeed");
    assert_eq!(doc.page_count, 2);

    let listing = pipeline.run_pixel(&doc.id).await.expect("pixel run");
    assert_eq!(listing.page_count, 2);

    let page_1 = pipeline
        .results()
        .kind_dir("e2e", &doc.id, ResultKind::Pixel)
        .join("page_1.png");
    let revealed = image::open(&page_1).unwrap().to_rgba8();
    // 200x300 pt page rendered at 2.0×.
    assert_eq!(revealed.dimensions(), (400, 600));
    let (w, h) = revealed.dimensions();
    let block = revealed.get_pixel(w / 2, h * 5 / 12)[0];
    let background = revealed.get_pixel(5, 5)[0];
    assert!(
        block > background + 100,
        "hidden block should stand out: block={block} background={background}"
    );
    println!("✓ block {block} vs background {background}");

    let again = pipeline.run_pixel(&doc.id).await.expect("cached pixel run");
    assert_eq!(again, listing);
}

#[tokio::test]
async fn test_render_and_export() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&tmp).await;
    let input = synthetic_pdf(&tmp, 3).await;
    let doc = pipeline.ingest("e2e", input.to_str().unwrap()).await.unwrap();

    let originals = pipeline.render_originals(&doc.id).await.expect("render");
    assert_eq!(originals.page_count, 3);

    let exported = pipeline
        .export(&doc.id, ResultKind::Original)
        .await
        .expect("export");
    assert_eq!(exported.file_name, "hidden_block_original.pdf");
    assert_eq!(exported.page_count, 3);
    assert!(exported.bytes.starts_with(b"%PDF"));

    let err = pipeline.export(&doc.id, ResultKind::Pixel).await.unwrap_err();
    assert!(matches!(err, RevealError::NothingToExport { .. }));
}

#[tokio::test]
async fn test_corrupt_pdf_is_stored_with_unknown_pages() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&tmp).await;
    let path = tmp.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.4\nthis is not really a pdf").unwrap();

    let doc = pipeline.ingest("e2e", path.to_str().unwrap()).await.unwrap();
    assert_eq!(doc.page_count, 0);

    let err = pipeline.run_pixel(&doc.id).await.unwrap_err();
    assert!(matches!(err, RevealError::Decode { .. }), "got {err:?}");
}

// ── OCR (pdfium + tesseract) ─────────────────────────────────────────────────

#[tokio::test]
async fn test_ocr_hidden_text_fixture() {
    e2e_skip_unless_enabled!();
    let fixture = test_cases_dir().join("hidden_text.pdf");
    if !fixture.exists() {
        println!("SKIP: test file not found: {}", fixture.display());
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&tmp).await;
    let doc = pipeline.ingest("e2e", fixture.to_str().unwrap()).await.unwrap();

    let events: Vec<OcrEvent> = pipeline
        .run_ocr(&doc.id)
        .await
        .expect("OCR should start")
        .collect()
        .await;

    let mut text = String::new();
    for event in &events {
        if let OcrEvent::PageDone {
            text: t,
            confidence,
            ..
        } = event
        {
            assert!((0.0..=100.0).contains(confidence));
            text.push_str(t);
        }
    }
    assert!(
        matches!(events.last(), Some(OcrEvent::Complete { .. })),
        "last event: {:?}",
        events.last()
    );
    assert!(!text.trim().is_empty(), "expected some recognised text");
    println!("Recognised {} chars", text.len());

    assert!(matches!(
        pipeline.run_ocr(&doc.id).await,
        Err(RevealError::AlreadyRun { .. })
    ));
}
