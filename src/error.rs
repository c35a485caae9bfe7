//! Error types for the pdf-reveal library.
//!
//! Every operation returns [`RevealError`]. Two variants are not failures at
//! all but *rejections* of the run policy:
//!
//! * [`RevealError::AlreadyRun`]: OCR has already completed for the document.
//!   The variant carries the cached page listing (when one was recorded) so the
//!   caller can serve it instead.
//! * [`RevealError::Busy`]: another run of the same kind is in flight for the
//!   same document.
//!
//! Use [`RevealError::is_rejection`] to tell the two apart from real errors.
//!
//! OCR adapters report the narrower [`ExtractError`]; the orchestrator tags it
//! with the page number and lifts it into [`RevealError::Extract`].

use crate::document::DocumentId;
use crate::events::PageListing;
use crate::store::ResultKind;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf-reveal library.
#[derive(Debug, Error)]
pub enum RevealError {
    // ── Document errors ───────────────────────────────────────────────────
    /// No document record exists for the given id.
    #[error("Document '{id}' not found")]
    DocumentNotFound { id: DocumentId },

    /// The uploaded source PDF could not be read back from disk.
    #[error("Failed to read source PDF '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF bytes could not be decoded at all.
    #[error("PDF could not be decoded: {detail}")]
    Decode { detail: String },

    /// A single page could not be rendered.
    #[error("Rasterisation failed for page {page}: {detail}")]
    Rasterize { page: usize, detail: String },

    /// A rendered or revealed page could not be PNG-encoded.
    #[error("Image encoding failed for page {page}: {detail}")]
    Encode { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or a directory containing it), or\n\
install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR engine failed on a page.
    #[error("OCR failed on page {page}: {source}")]
    Extract {
        page: usize,
        #[source]
        source: ExtractError,
    },

    // ── Run policy ────────────────────────────────────────────────────────
    /// OCR already completed for this document; it is never run twice.
    #[error("OCR has already been run for document '{id}'")]
    AlreadyRun {
        id: DocumentId,
        cached: Option<PageListing>,
    },

    /// A run of the same kind is already in flight for this document.
    #[error("A {kind} run is already in progress for document '{id}'")]
    Busy { id: DocumentId, kind: ResultKind },

    /// Export was requested before any pages of that kind were produced.
    #[error("No {kind} pages found for document '{id}'. Render/process the document first.")]
    NothingToExport { id: DocumentId, kind: ResultKind },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not create, read or write a stored artefact.
    #[error("Storage I/O failed at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document index could not be loaded or persisted.
    #[error("Document index error at '{path}': {detail}")]
    Index { path: PathBuf, detail: String },

    // ── Ingest errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Only `.pdf` uploads are accepted.
    #[error("Only PDF files are accepted, got '{name}'")]
    NotPdfName { name: String },

    /// The file was read, but is not a PDF.
    #[error("File is not a valid PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    /// Upload exceeds the configured size limit.
    #[error("File '{name}' is {size} bytes, exceeding the {limit} byte limit")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RevealError {
    /// True for run-policy rejections that are not failures.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RevealError::AlreadyRun { .. } | RevealError::Busy { .. })
    }
}

/// Failure reported by an OCR engine for one page image.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The engine binary or library is missing.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but reported a failure.
    #[error("{0}")]
    Failed(String),

    /// Staging the page image for the engine failed.
    #[error("temporary page image: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_not_failures() {
        let id = DocumentId::from("doc-1");
        assert!(RevealError::AlreadyRun {
            id: id.clone(),
            cached: None
        }
        .is_rejection());
        assert!(RevealError::Busy {
            id,
            kind: ResultKind::Ocr
        }
        .is_rejection());
        assert!(!RevealError::Decode {
            detail: "bad xref".into()
        }
        .is_rejection());
    }

    #[test]
    fn extract_display_names_page() {
        let e = RevealError::Extract {
            page: 2,
            source: ExtractError::Failed("tesseract exited with 1".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 2"), "got: {msg}");
        assert!(msg.contains("tesseract exited"), "got: {msg}");
    }

    #[test]
    fn busy_display_names_kind() {
        let e = RevealError::Busy {
            id: DocumentId::from("abc"),
            kind: ResultKind::Pixel,
        };
        assert!(e.to_string().contains("pixel"));
        assert!(e.to_string().contains("abc"));
    }

    #[test]
    fn too_large_display() {
        let e = RevealError::FileTooLarge {
            name: "big.pdf".into(),
            size: 11,
            limit: 10,
        };
        assert!(e.to_string().contains("big.pdf"));
    }
}
