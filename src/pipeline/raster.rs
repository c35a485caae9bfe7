//! PDF rasterisation: decode PDF bytes and render pages to RGBA buffers.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. Every call is moved onto Tokio's
//! blocking pool so the async workers driving OCR event streams keep moving.
//!
//! A whole run ([`PageRasterizer::rasterize_run`]) binds pdfium and parses
//! the document once, then renders page after page on the same blocking
//! thread, handing each image over a bounded channel.
//!
//! ## Why flatten onto white?
//!
//! The pixel reveal inverts colours. A transparent background would invert to
//! transparent and the normalise step would see garbage, so every page leaves
//! this module fully opaque on a white background.

use crate::error::RevealError;
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Raw PDF bytes shared between the orchestrator and blocking render tasks.
pub type PdfBytes = Arc<[u8]>;

/// Decodes PDF bytes into orderable, individually renderable pages.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf: &PdfBytes) -> Result<usize, RevealError>;

    /// Render 1-indexed `page` at `scale`, opaque on white.
    async fn rasterize(
        &self,
        pdf: &PdfBytes,
        page: usize,
        scale: f32,
    ) -> Result<RgbaImage, RevealError>;

    /// Render pages `1..=total` in order into `pages`.
    ///
    /// Stops after the first failure, which is sent as the last item, or as
    /// soon as the receiver is dropped. The default renders each page with
    /// [`rasterize`](Self::rasterize); backends that can keep a document
    /// open across pages override it.
    async fn rasterize_run(
        &self,
        pdf: &PdfBytes,
        total: usize,
        scale: f32,
        pages: mpsc::Sender<Result<RgbaImage, RevealError>>,
    ) {
        for page in 1..=total {
            let rendered = self.rasterize(pdf, page, scale).await;
            let failed = rendered.is_err();
            if pages.send(rendered).await.is_err() || failed {
                return;
            }
        }
    }
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to `library` (a pdfium library file or a directory holding one),
    /// or search `./` and then the system when `None`.
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn page_count(&self, pdf: &PdfBytes) -> Result<usize, RevealError> {
        let pdf = Arc::clone(pdf);
        let library = self.library.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(library.as_deref())?;
            let document = load_document(&pdfium, &pdf)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| RevealError::Internal(format!("Page count task panicked: {}", e)))?
    }

    async fn rasterize(
        &self,
        pdf: &PdfBytes,
        page: usize,
        scale: f32,
    ) -> Result<RgbaImage, RevealError> {
        let pdf = Arc::clone(pdf);
        let library = self.library.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(library.as_deref())?;
            let document = load_document(&pdfium, &pdf)?;
            render_page_blocking(&document, page, scale)
        })
        .await
        .map_err(|e| RevealError::Internal(format!("Render task panicked: {}", e)))?
    }

    /// Binds pdfium and parses the document once for the whole run.
    async fn rasterize_run(
        &self,
        pdf: &PdfBytes,
        total: usize,
        scale: f32,
        pages: mpsc::Sender<Result<RgbaImage, RevealError>>,
    ) {
        let pdf = Arc::clone(pdf);
        let library = self.library.clone();
        let sink = pages.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            render_run_blocking(library.as_deref(), &pdf, total, scale, &sink)
        })
        .await
        .unwrap_or_else(|e| Err(RevealError::Internal(format!("Render task panicked: {}", e))));

        if let Err(e) = outcome {
            let _ = pages.send(Err(e)).await;
        }
    }
}

/// Bind pdfium, preferring an explicit library location.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, RevealError> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| RevealError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn load_document<'a>(pdfium: &'a Pdfium, pdf: &'a [u8]) -> Result<PdfDocument<'a>, RevealError> {
    pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| RevealError::Decode {
            detail: format!("{:?}", e),
        })
}

/// Blocking render of pages `1..=total` from a single loaded document.
fn render_run_blocking(
    library: Option<&Path>,
    pdf: &[u8],
    total: usize,
    scale: f32,
    pages: &mpsc::Sender<Result<RgbaImage, RevealError>>,
) -> Result<(), RevealError> {
    let pdfium = bind_pdfium(library)?;
    let document = load_document(&pdfium, pdf)?;

    for page in 1..=total {
        let image = render_page_blocking(&document, page, scale)?;
        if pages.blocking_send(Ok(image)).is_err() {
            debug!("Render run abandoned at page {}", page);
            break;
        }
    }
    Ok(())
}

/// Blocking render of one page of an already-loaded document.
fn render_page_blocking(
    document: &PdfDocument<'_>,
    page: usize,
    scale: f32,
) -> Result<RgbaImage, RevealError> {
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if page == 0 || page > total_pages {
        return Err(RevealError::Rasterize {
            page,
            detail: format!("out of range (document has {} pages)", total_pages),
        });
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| RevealError::Rasterize {
            page,
            detail: format!("{:?}", e),
        })?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_clear_color(PdfColor::WHITE)
        .render_form_data(true);

    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| RevealError::Rasterize {
            page,
            detail: format!("{:?}", e),
        })?;

    let mut image = bitmap.as_image().to_rgba8();
    flatten_onto_white(&mut image);
    debug!(
        "Rendered page {} → {}x{} px",
        page,
        image.width(),
        image.height()
    );

    Ok(image)
}

/// Composite every pixel over opaque white, leaving alpha at 255.
pub fn flatten_onto_white(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        if a == u8::MAX {
            continue;
        }
        let blend = |c: u8| -> u8 {
            let c = c as u32;
            let a = a as u32;
            ((c * a + 255 * (255 - a) + 127) / 255) as u8
        };
        *pixel = Rgba([blend(r), blend(g), blend(b), u8::MAX]);
    }
}
