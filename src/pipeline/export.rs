//! Export: assemble stored page images back into a PDF.
//!
//! Each image becomes one page sized exactly to the image (1 px = 1 pt), so
//! the exported document has the same aspect ratio and resolution as the
//! rendered or revealed pages.

use crate::error::RevealError;
use crate::pipeline::raster::bind_pdfium;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Build a PDF from page images (PNG bytes), in the given order.
pub async fn assemble_pdf(
    library: Option<PathBuf>,
    images: Vec<Vec<u8>>,
) -> Result<Vec<u8>, RevealError> {
    tokio::task::spawn_blocking(move || assemble_pdf_blocking(library.as_deref(), &images))
        .await
        .map_err(|e| RevealError::Internal(format!("Export task panicked: {}", e)))?
}

fn assemble_pdf_blocking(library: Option<&Path>, images: &[Vec<u8>]) -> Result<Vec<u8>, RevealError> {
    let pdfium = bind_pdfium(library)?;
    let internal = |e: PdfiumError| RevealError::Internal(format!("PDF assembly: {:?}", e));

    let mut document = pdfium.create_new_pdf().map_err(internal)?;

    for (i, bytes) in images.iter().enumerate() {
        let page_num = i + 1;
        let image = image::load_from_memory(bytes).map_err(|e| RevealError::Encode {
            page: page_num,
            detail: e.to_string(),
        })?;
        let width = PdfPoints::new(image.width() as f32);
        let height = PdfPoints::new(image.height() as f32);

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(internal)?;
        page.objects_mut()
            .create_image_object(PdfPoints::ZERO, PdfPoints::ZERO, &image, Some(width), Some(height))
            .map_err(internal)?;
        debug!("Export: added page {} ({}x{})", page_num, image.width(), image.height());
    }

    let bytes = document.save_to_bytes().map_err(internal)?;
    info!("Assembled {} pages into {} byte PDF", images.len(), bytes.len());
    Ok(bytes)
}

/// Download name for an export: `<base>_<kind>.pdf`.
///
/// The `.pdf` suffix (any case) is dropped and whitespace runs become `_`.
pub fn export_file_name(original_name: &str, kind: &str) -> String {
    let base = original_name.trim();
    let base = if base.to_ascii_lowercase().ends_with(".pdf") {
        &base[..base.len() - 4]
    } else {
        base
    };
    let safe = base.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{}_{}.pdf", safe, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_names() {
        assert_eq!(export_file_name("Lease Agreement.PDF", "pixel"), "Lease_Agreement_pixel.pdf");
        assert_eq!(export_file_name("a  b\tc.pdf", "original"), "a_b_c_original.pdf");
        assert_eq!(export_file_name("notes", "pixel"), "notes_pixel.pdf");
    }
}
