//! Per-document pipeline runs: pixel reveal, streaming OCR, original renders
//! and export.
//!
//! ## Run policy
//!
//! | Run       | Cache                           | Concurrent second call |
//! |-----------|---------------------------------|------------------------|
//! | pixel     | served once recorded (>0 pages) | waits, then hits cache |
//! | OCR       | exactly once; `AlreadyRun`      | rejected with `Busy`   |
//! | originals | always regenerated              | waits                  |
//!
//! Pages are rendered by one background task per run
//! ([`PageRasterizer::rasterize_run`]) and handed over a bounded channel.
//! Every run aborts on the first failing page. Pages written before the
//! failure stay on disk; file names are deterministic, so the next full run
//! overwrites them. Nothing is recorded on the document for an aborted run.
//!
//! ## OCR streaming
//!
//! [`Orchestrator::run_ocr`] validates the request, marks the document
//! `Running`, and hands the page loop to a spawned worker that owns the
//! single-flight guard. The worker feeds a bounded channel, so a slow consumer
//! applies backpressure instead of buffering a whole document's text. Events
//! for a run are produced by one task in page order and the channel preserves
//! that order. A consumer that stops reading does not cancel the run; the
//! worker finishes and records the result.

use crate::config::PipelineConfig;
use crate::document::{Document, DocumentId, DocumentStore, DocumentUpdate, OcrStatus};
use crate::error::RevealError;
use crate::events::{OcrEvent, OcrEventStream, PageListing, PageRef};
use crate::flight::{FlightGuard, FlightTable};
use crate::pipeline::encode::encode_png;
use crate::pipeline::export::{assemble_pdf, export_file_name};
use crate::pipeline::ocr::{OcrEngine, OcrText, TesseractEngine};
use crate::pipeline::raster::{PageRasterizer, PdfBytes, PdfiumRasterizer};
use crate::pipeline::reveal::reveal;
use crate::store::{KindDir, ResultKind, ResultStore};
use futures::stream::{self, StreamExt, TryStreamExt};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// A PDF assembled from stored page images.
#[derive(Debug, Clone)]
pub struct ExportedPdf {
    /// Suggested download name, e.g. `Lease_Agreement_pixel.pdf`.
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Coordinates rasterisation, transforms, persistence and document state.
///
/// Cheap to clone; clones share collaborators and single-flight state.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) config: Arc<PipelineConfig>,
    pub(crate) rasterizer: Arc<dyn PageRasterizer>,
    pub(crate) ocr: Arc<dyn OcrEngine>,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) results: ResultStore,
    pub(crate) flights: Arc<FlightTable>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        let results = ResultStore::new(config.results_root.clone(), config.public_prefix.clone());
        Self {
            config: Arc::new(config),
            rasterizer,
            ocr,
            documents,
            results,
            flights: Arc::new(FlightTable::new()),
        }
    }

    /// Orchestrator backed by pdfium and the tesseract CLI.
    pub fn with_defaults(config: PipelineConfig, documents: Arc<dyn DocumentStore>) -> Self {
        let rasterizer = Arc::new(PdfiumRasterizer::new(config.pdfium_library.clone()));
        let ocr = Arc::new(TesseractEngine::new(
            config.tesseract_path.clone(),
            config.ocr_language.clone(),
        ));
        Self::new(config, rasterizer, ocr, documents)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    // ── Pixel mode ───────────────────────────────────────────────────────

    /// Reveal every page, or return the cached listing of a prior run.
    pub async fn run_pixel(&self, id: &DocumentId) -> Result<PageListing, RevealError> {
        let _guard = self.flights.acquire(id, ResultKind::Pixel).await;
        let doc = self.load(id).await?;

        if let Some(cached) = doc.cached_pixel() {
            debug!("Pixel cache hit for {} ({} pages)", id, cached.page_count);
            return Ok(PageListing::from_completion(cached, ResultKind::Pixel.extension()));
        }

        let start = Instant::now();
        let pdf = self.read_source(&doc).await?;
        let total = self.rasterizer.page_count(&pdf).await?;
        info!("Pixel reveal: document {} ({} pages)", id, total);
        if total == 0 {
            warn!("Document {} has no pages; nothing recorded", id);
            return Ok(PageListing::new(Vec::new()));
        }

        let dir = self.results.prepare(&doc.owner, id, ResultKind::Pixel).await?;
        let pages = self
            .process_pages(&pdf, &dir, total, PageTransform::Reveal)
            .await
            .inspect_err(|e| error!("Pixel reveal of {} aborted: {}", id, e))?;

        self.documents
            .update(id, DocumentUpdate::PixelComplete(dir.completion(total)))
            .await?;
        info!(
            "Pixel reveal of {} done: {} pages in {}ms",
            id,
            total,
            start.elapsed().as_millis()
        );
        Ok(PageListing::new(pages))
    }

    // ── Original renders ─────────────────────────────────────────────────

    /// Render unprocessed pages. Always regenerates.
    pub async fn render_originals(&self, id: &DocumentId) -> Result<PageListing, RevealError> {
        let _guard = self.flights.acquire(id, ResultKind::Original).await;
        let doc = self.load(id).await?;

        let pdf = self.read_source(&doc).await?;
        let total = self.rasterizer.page_count(&pdf).await?;
        info!("Rendering originals: document {} ({} pages)", id, total);

        let dir = self.results.prepare(&doc.owner, id, ResultKind::Original).await?;
        let pages = self
            .process_pages(&pdf, &dir, total, PageTransform::Identity)
            .await
            .inspect_err(|e| error!("Original render of {} aborted: {}", id, e))?;

        if doc.page_count == 0 && total > 0 {
            self.documents
                .update(id, DocumentUpdate::PageCount(total))
                .await?;
        }
        Ok(PageListing::new(pages))
    }

    /// Rasterise pages 1..=total in order, transform, and store as PNG.
    ///
    /// Up to `pixel_concurrency` pages are in flight; results keep page order.
    async fn process_pages(
        &self,
        pdf: &PdfBytes,
        dir: &KindDir,
        total: usize,
        transform: PageTransform,
    ) -> Result<Vec<PageRef>, RevealError> {
        let rendered = self.start_render(pdf, total, self.config.pixel_concurrency);
        let pages: Vec<PageRef> = ReceiverStream::new(rendered)
            .zip(stream::iter(1..=total))
            .map(move |(image, page)| async move {
                self.process_page(dir, page, image?, transform).await
            })
            .buffered(self.config.pixel_concurrency)
            .try_collect()
            .await?;

        if pages.len() < total {
            return Err(RevealError::Internal(format!(
                "Renderer stopped after {} of {} pages",
                pages.len(),
                total
            )));
        }
        Ok(pages)
    }

    /// Render pages 1..=total on a background task, in page order.
    ///
    /// Dropping the receiver stops the render.
    fn start_render(
        &self,
        pdf: &PdfBytes,
        total: usize,
        buffer: usize,
    ) -> mpsc::Receiver<Result<RgbaImage, RevealError>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let rasterizer = Arc::clone(&self.rasterizer);
        let pdf = Arc::clone(pdf);
        let scale = self.config.render_scale;
        tokio::spawn(async move { rasterizer.rasterize_run(&pdf, total, scale, tx).await });
        rx
    }

    async fn process_page(
        &self,
        dir: &KindDir,
        page: usize,
        image: RgbaImage,
        transform: PageTransform,
    ) -> Result<PageRef, RevealError> {
        let png = tokio::task::spawn_blocking(move || transform.apply(&image))
            .await
            .map_err(|e| RevealError::Internal(format!("Transform task panicked: {}", e)))?
            .map_err(|e| RevealError::Encode {
                page,
                detail: e.to_string(),
            })?;

        let page_ref = dir.write_page(page, &png).await?;
        debug!("Stored {}", page_ref.path);
        Ok(page_ref)
    }

    // ── OCR mode ─────────────────────────────────────────────────────────

    /// Start the one and only OCR run of a document.
    ///
    /// Returns `AlreadyRun` (with the cached listing) once OCR has completed,
    /// and `Busy` while another run is streaming. Failures before the first
    /// page (missing document, unreadable or undecodable PDF) are returned
    /// here and leave the document untouched. Failures on a page arrive as
    /// the stream's terminal `error` event and reset the document to
    /// `NotRun`.
    pub async fn run_ocr(&self, id: &DocumentId) -> Result<OcrEventStream, RevealError> {
        let guard = match self.flights.try_acquire(id, ResultKind::Ocr) {
            Some(guard) => guard,
            None => {
                // The worker releases its guard just after recording success,
                // so a finished run may still hold it briefly.
                let doc = self.load(id).await?;
                return Err(already_run(&doc).unwrap_or_else(|| RevealError::Busy {
                    id: id.clone(),
                    kind: ResultKind::Ocr,
                }));
            }
        };

        let doc = self.load(id).await?;
        if let Some(rejection) = already_run(&doc) {
            return Err(rejection);
        }

        let pdf = self.read_source(&doc).await?;
        let total = self.rasterizer.page_count(&pdf).await?;
        let dir = self.results.prepare(&doc.owner, id, ResultKind::Ocr).await?;
        self.documents.update(id, DocumentUpdate::OcrStarted).await?;
        info!("OCR: document {} ({} pages)", id, total);

        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let worker = self.clone();
        let id = id.clone();
        tokio::spawn(async move { worker.ocr_worker(id, pdf, dir, total, tx, guard).await });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn ocr_worker(
        self,
        id: DocumentId,
        pdf: PdfBytes,
        dir: KindDir,
        total: usize,
        tx: mpsc::Sender<OcrEvent>,
        guard: FlightGuard,
    ) {
        let start = Instant::now();
        // A panicking engine or rasteriser must still end the stream with an
        // error and release the document for a retry.
        let pages_task = tokio::spawn({
            let this = self.clone();
            let dir = dir.clone();
            let tx = tx.clone();
            async move { this.ocr_pages(&pdf, &dir, total, &tx).await }
        });
        let pages = pages_task
            .await
            .unwrap_or_else(|e| Err(RevealError::Internal(format!("OCR task panicked: {}", e))));

        let outcome = match pages {
            Ok(pages) => self
                .documents
                .update(&id, DocumentUpdate::OcrComplete(dir.completion(total)))
                .await
                .map(|_| pages),
            Err(e) => Err(e),
        };

        let terminal = match outcome {
            Ok(pages) => {
                info!(
                    "OCR of {} done: {} pages in {}ms",
                    id,
                    total,
                    start.elapsed().as_millis()
                );
                OcrEvent::Complete {
                    pages,
                    page_count: total,
                }
            }
            Err(e) => {
                error!("OCR of {} aborted: {}", id, e);
                if let Err(reset) = self.documents.update(&id, DocumentUpdate::OcrFailed).await {
                    warn!("Could not reset OCR state of {}: {}", id, reset);
                }
                OcrEvent::Error {
                    error: e.to_string(),
                }
            }
        };

        drop(guard);
        if tx.send(terminal).await.is_err() {
            debug!("OCR consumer for {} went away before the terminal event", id);
        }
    }

    /// Pages 1..=total strictly in order: progress, extract, persist, page_done.
    async fn ocr_pages(
        &self,
        pdf: &PdfBytes,
        dir: &KindDir,
        total: usize,
        tx: &mpsc::Sender<OcrEvent>,
    ) -> Result<Vec<PageRef>, RevealError> {
        let mut rendered = self.start_render(pdf, total, 1);
        let mut pages = Vec::with_capacity(total);
        for page in 1..=total {
            // A closed channel only means nobody is listening.
            let _ = tx
                .send(OcrEvent::Progress {
                    page,
                    total_pages: total,
                })
                .await;

            let image = rendered.recv().await.ok_or_else(|| {
                RevealError::Internal(format!("Renderer stopped before page {}", page))
            })??;
            let extracted = self
                .ocr
                .extract(&image)
                .await
                .map_err(|source| RevealError::Extract { page, source })?;
            // Engines may build OcrText directly; re-clamp.
            let OcrText { text, confidence } = OcrText::new(extracted.text, extracted.confidence);

            let page_ref = dir.write_page(page, text.as_bytes()).await?;
            debug!("OCR page {}/{}: confidence {:.1}", page, total, confidence);

            let _ = tx
                .send(OcrEvent::PageDone {
                    page,
                    total_pages: total,
                    text,
                    confidence,
                    path: page_ref.path.clone(),
                })
                .await;
            pages.push(page_ref);
        }
        Ok(pages)
    }

    /// Current OCR lifecycle state of a document.
    pub async fn ocr_status(&self, id: &DocumentId) -> Result<OcrStatus, RevealError> {
        Ok(self.load(id).await?.ocr_status)
    }

    // ── Export ───────────────────────────────────────────────────────────

    /// Assemble the stored `original` or `pixel` page images into one PDF.
    ///
    /// Kinds without page images (including `ocr`) yield `NothingToExport`.
    pub async fn export(
        &self,
        id: &DocumentId,
        kind: ResultKind,
    ) -> Result<ExportedPdf, RevealError> {
        let doc = self.load(id).await?;
        let listed = self.results.list_page_images(&doc.owner, id, kind).await?;
        if listed.is_empty() {
            return Err(RevealError::NothingToExport {
                id: id.clone(),
                kind,
            });
        }

        let mut images = Vec::with_capacity(listed.len());
        for (_, path) in &listed {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| RevealError::Storage {
                    path: path.clone(),
                    source: e,
                })?;
            images.push(bytes);
        }

        let page_count = images.len();
        let bytes = assemble_pdf(self.config.pdfium_library.clone(), images).await?;
        Ok(ExportedPdf {
            file_name: export_file_name(&doc.original_name, kind.as_str()),
            bytes,
            page_count,
        })
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    pub(crate) async fn load(&self, id: &DocumentId) -> Result<Document, RevealError> {
        self.documents
            .get(id)
            .await?
            .ok_or_else(|| RevealError::DocumentNotFound { id: id.clone() })
    }

    async fn read_source(&self, doc: &Document) -> Result<PdfBytes, RevealError> {
        let bytes = tokio::fs::read(&doc.source_path)
            .await
            .map_err(|e| RevealError::SourceUnreadable {
                path: doc.source_path.clone(),
                source: e,
            })?;
        Ok(PdfBytes::from(bytes))
    }
}

fn already_run(doc: &Document) -> Option<RevealError> {
    doc.ocr_ran().then(|| RevealError::AlreadyRun {
        id: doc.id.clone(),
        cached: doc
            .cached_ocr()
            .map(|c| PageListing::from_completion(c, ResultKind::Ocr.extension())),
    })
}

/// What happens to a rendered page before it is stored.
#[derive(Debug, Clone, Copy)]
enum PageTransform {
    Identity,
    Reveal,
}

impl PageTransform {
    fn apply(self, image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
        match self {
            PageTransform::Identity => encode_png(image),
            PageTransform::Reveal => reveal(image),
        }
    }
}
