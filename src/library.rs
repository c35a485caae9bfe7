//! Document library: ingest, list, fetch and delete uploaded PDFs.
//!
//! Uploads live at `<uploads_root>/<owner>/<uuid>.pdf`. Each owner keeps at
//! most `max_documents_per_owner` documents; ingesting one more evicts the
//! oldest. Deleting (or evicting) a document removes its source file, every
//! result directory and finally its record.

use crate::document::{Document, DocumentId};
use crate::error::RevealError;
use crate::orchestrator::Orchestrator;
use crate::pipeline::input::resolve_upload;
use crate::pipeline::raster::PdfBytes;
use crate::store::ResultKind;
use tracing::{info, warn};

impl Orchestrator {
    /// Validate and store a PDF from a local path or HTTP(S) URL.
    ///
    /// The page count is best-effort: a PDF that pdfium cannot open
    /// is still stored, with a page count of 0.
    pub async fn ingest(&self, owner: &str, input: &str) -> Result<Document, RevealError> {
        let upload = resolve_upload(
            input,
            self.config.max_upload_bytes,
            self.config.download_timeout_secs,
        )
        .await?;

        let existing = self.documents.list_for_owner(owner).await?;
        let excess = (existing.len() + 1).saturating_sub(self.config.max_documents_per_owner);
        for oldest in existing.iter().take(excess) {
            info!(
                "Owner {} is at capacity; evicting {} ({})",
                owner, oldest.id, oldest.original_name
            );
            self.delete(&oldest.id).await?;
        }

        let dir = self.config.uploads_root.join(owner);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RevealError::Storage {
                path: dir.clone(),
                source: e,
            })?;
        let source_path = dir.join(format!("{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&source_path, &upload.bytes)
            .await
            .map_err(|e| RevealError::Storage {
                path: source_path.clone(),
                source: e,
            })?;

        let file_size = upload.bytes.len() as u64;
        let pdf = PdfBytes::from(upload.bytes);
        let page_count = match self.rasterizer.page_count(&pdf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Could not count pages of '{}': {}", upload.name, e);
                0
            }
        };

        let doc = Document::new(owner, upload.name, source_path, file_size, page_count);
        self.documents.insert(doc.clone()).await?;
        info!(
            "Ingested {} '{}' for {} ({} bytes, {} pages)",
            doc.id, doc.original_name, owner, file_size, page_count
        );
        Ok(doc)
    }

    /// An owner's documents, oldest first.
    pub async fn list(&self, owner: &str) -> Result<Vec<Document>, RevealError> {
        self.documents.list_for_owner(owner).await
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Document, RevealError> {
        self.load(id).await
    }

    /// Remove a document, its uploaded source and all of its results.
    ///
    /// Waits for any in-flight run of the document to finish first. The
    /// record is removed last, so a failed purge leaves a document that can
    /// be deleted again.
    pub async fn delete(&self, id: &DocumentId) -> Result<Document, RevealError> {
        let mut guards = Vec::with_capacity(3);
        for kind in [ResultKind::Original, ResultKind::Pixel, ResultKind::Ocr] {
            guards.push(self.flights.acquire(id, kind).await);
        }
        let doc = self.load(id).await?;

        self.results.purge_document(&doc.owner, id).await?;
        match tokio::fs::remove_file(&doc.source_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RevealError::Storage {
                    path: doc.source_path.clone(),
                    source: e,
                })
            }
        }
        self.documents.remove(id).await?;
        self.flights.forget(id);
        drop(guards);

        info!("Deleted document {} ({})", id, doc.original_name);
        Ok(doc)
    }
}
