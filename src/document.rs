//! Document records and the store that holds them.
//!
//! A [`Document`] owns the metadata pointing at a document's result
//! directories; [`crate::store::ResultStore`] owns the files themselves. The
//! orchestrator never rewrites a whole record. It sends a [`DocumentUpdate`]
//! that touches only the fields of one run kind, and the store applies it
//! atomically, so a pixel run finishing while OCR is streaming cannot clobber
//! the OCR state (or vice versa).

use crate::error::RevealError;
use crate::store::Completion;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Opaque document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OCR lifecycle of a document.
///
/// `NotRun → Running → Complete`; a failed run goes back to `NotRun` so it can
/// be retried. `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    #[default]
    NotRun,
    Running,
    Complete,
}

/// A stored PDF and the completion metadata of its pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    /// Owning user reference.
    pub owner: String,
    /// File name as uploaded.
    pub original_name: String,
    /// Location of the stored PDF.
    pub source_path: PathBuf,
    pub file_size: u64,
    /// Page count; 0 means unknown.
    pub page_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pixel: Option<Completion>,
    #[serde(default)]
    pub ocr: Option<Completion>,
    #[serde(default)]
    pub ocr_status: OcrStatus,
}

impl Document {
    pub fn new(
        owner: impl Into<String>,
        original_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        file_size: u64,
        page_count: usize,
    ) -> Self {
        Self {
            id: DocumentId::generate(),
            owner: owner.into(),
            original_name: original_name.into(),
            source_path: source_path.into(),
            file_size,
            page_count,
            created_at: Utc::now(),
            pixel: None,
            ocr: None,
            ocr_status: OcrStatus::NotRun,
        }
    }

    /// True once an OCR run has completed; further runs are rejected.
    pub fn ocr_ran(&self) -> bool {
        self.ocr_status == OcrStatus::Complete
    }

    /// Cached pixel result, if a prior run recorded a non-empty one.
    pub fn cached_pixel(&self) -> Option<&Completion> {
        self.pixel.as_ref().filter(|c| c.page_count > 0)
    }

    /// Cached OCR result, if one was recorded with at least one page.
    pub fn cached_ocr(&self) -> Option<&Completion> {
        self.ocr.as_ref().filter(|c| c.page_count > 0)
    }

    /// Apply one field-scoped update.
    pub fn apply(&mut self, update: &DocumentUpdate) {
        match update {
            DocumentUpdate::PageCount(n) => self.page_count = *n,
            DocumentUpdate::PixelComplete(c) => {
                self.page_count = c.page_count;
                self.pixel = Some(c.clone());
            }
            DocumentUpdate::OcrStarted => self.ocr_status = OcrStatus::Running,
            DocumentUpdate::OcrFailed => self.ocr_status = OcrStatus::NotRun,
            DocumentUpdate::OcrComplete(c) => {
                self.page_count = c.page_count;
                self.ocr = Some(c.clone());
                self.ocr_status = OcrStatus::Complete;
            }
        }
    }
}

/// A field-scoped, atomically applied change to a document record.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentUpdate {
    /// Record a counted page total.
    PageCount(usize),
    /// Pixel run succeeded.
    PixelComplete(Completion),
    /// OCR run began.
    OcrStarted,
    /// OCR run aborted; a retry is allowed.
    OcrFailed,
    /// OCR run succeeded; the document is now permanently OCR'd.
    OcrComplete(Completion),
}

/// Persistence for document records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, RevealError>;

    async fn insert(&self, document: Document) -> Result<(), RevealError>;

    /// Apply `update` atomically and return the updated record.
    async fn update(&self, id: &DocumentId, update: DocumentUpdate)
        -> Result<Document, RevealError>;

    /// An owner's documents, oldest first.
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Document>, RevealError>;

    async fn remove(&self, id: &DocumentId) -> Result<Option<Document>, RevealError>;
}

/// Document store kept in memory and optionally mirrored to a JSON file.
///
/// Every mutation rewrites the file via temp file + rename, so a crash never
/// leaves a half-written index behind.
/// A mutation becomes visible only once its index write has succeeded.
pub struct LocalDocumentStore {
    documents: Mutex<HashMap<DocumentId, Document>>,
    index_path: Option<PathBuf>,
}

impl LocalDocumentStore {
    /// A store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            index_path: None,
        }
    }

    /// Load (or start) a JSON index at `path`.
    ///
    /// Documents persisted mid-OCR belong to a run that can no longer
    /// finish; they are reset to `NotRun` so OCR can be retried.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RevealError> {
        let path = path.as_ref().to_path_buf();
        let mut documents: HashMap<DocumentId, Document> = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Document> =
                    serde_json::from_slice(&bytes).map_err(|e| RevealError::Index {
                        path: path.clone(),
                        detail: e.to_string(),
                    })?;
                list.into_iter().map(|d| (d.id.clone(), d)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(RevealError::Index {
                    path,
                    detail: e.to_string(),
                })
            }
        };

        for doc in documents.values_mut() {
            if doc.ocr_status == OcrStatus::Running {
                warn!("Document {}: interrupted OCR run reset to not-run", doc.id);
                doc.apply(&DocumentUpdate::OcrFailed);
            }
        }
        debug!("Loaded {} documents from {}", documents.len(), path.display());

        Ok(Self {
            documents: Mutex::new(documents),
            index_path: Some(path),
        })
    }

    async fn persist(&self, documents: &HashMap<DocumentId, Document>) -> Result<(), RevealError> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };
        let index_err = |detail: String| RevealError::Index {
            path: path.clone(),
            detail,
        };

        let mut list: Vec<&Document> = documents.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let json = serde_json::to_vec_pretty(&list).map_err(|e| index_err(e.to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| index_err(e.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| index_err(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| index_err(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, RevealError> {
        Ok(self.documents.lock().await.get(id).cloned())
    }

    async fn insert(&self, document: Document) -> Result<(), RevealError> {
        let mut documents = self.documents.lock().await;
        let mut next = documents.clone();
        next.insert(document.id.clone(), document);
        self.persist(&next).await?;
        *documents = next;
        Ok(())
    }

    async fn update(
        &self,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> Result<Document, RevealError> {
        let mut documents = self.documents.lock().await;
        let mut updated = documents
            .get(id)
            .cloned()
            .ok_or_else(|| RevealError::DocumentNotFound { id: id.clone() })?;
        updated.apply(&update);

        let mut next = documents.clone();
        next.insert(id.clone(), updated.clone());
        self.persist(&next).await?;
        *documents = next;
        Ok(updated)
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Document>, RevealError> {
        let documents = self.documents.lock().await;
        let mut list: Vec<Document> = documents
            .values()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn remove(&self, id: &DocumentId) -> Result<Option<Document>, RevealError> {
        let mut documents = self.documents.lock().await;
        if !documents.contains_key(id) {
            return Ok(None);
        }
        let mut next = documents.clone();
        let removed = next.remove(id);
        self.persist(&next).await?;
        *documents = next;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn completion(n: usize) -> Completion {
        Completion {
            dir: "/results/u/d/x".into(),
            page_count: n,
        }
    }

    #[test]
    fn ocr_state_machine() {
        let mut doc = Document::new("u", "a.pdf", "/tmp/a.pdf", 10, 0);
        assert_eq!(doc.ocr_status, OcrStatus::NotRun);

        doc.apply(&DocumentUpdate::OcrStarted);
        assert_eq!(doc.ocr_status, OcrStatus::Running);
        doc.apply(&DocumentUpdate::OcrFailed);
        assert_eq!(doc.ocr_status, OcrStatus::NotRun);
        assert!(!doc.ocr_ran());

        doc.apply(&DocumentUpdate::OcrStarted);
        doc.apply(&DocumentUpdate::OcrComplete(completion(3)));
        assert!(doc.ocr_ran());
        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.cached_ocr(), Some(&completion(3)));
    }

    #[test]
    fn empty_pixel_completion_is_not_a_cache_hit() {
        let mut doc = Document::new("u", "a.pdf", "/tmp/a.pdf", 10, 0);
        doc.apply(&DocumentUpdate::PixelComplete(completion(0)));
        assert!(doc.cached_pixel().is_none());
        doc.apply(&DocumentUpdate::PixelComplete(completion(4)));
        assert_eq!(doc.cached_pixel().map(|c| c.page_count), Some(4));
    }

    #[tokio::test]
    async fn updates_touch_only_their_fields() {
        let store = LocalDocumentStore::in_memory();
        let doc = Document::new("u", "a.pdf", "/tmp/a.pdf", 10, 0);
        let id = doc.id.clone();
        store.insert(doc).await.unwrap();

        store.update(&id, DocumentUpdate::OcrStarted).await.unwrap();
        let after = store
            .update(&id, DocumentUpdate::PixelComplete(completion(2)))
            .await
            .unwrap();
        assert_eq!(after.ocr_status, OcrStatus::Running);
        assert_eq!(after.pixel, Some(completion(2)));
    }

    #[tokio::test]
    async fn update_missing_document() {
        let store = LocalDocumentStore::in_memory();
        let err = store
            .update(&DocumentId::from("ghost"), DocumentUpdate::OcrStarted)
            .await;
        assert!(matches!(err, Err(RevealError::DocumentNotFound { .. })));
    }

    #[tokio::test]
    async fn index_round_trips_and_resets_interrupted_ocr() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("documents.json");

        let doc = Document::new("u", "a.pdf", "/tmp/a.pdf", 10, 2);
        let id = doc.id.clone();
        {
            let store = LocalDocumentStore::open(&path).await.unwrap();
            store.insert(doc).await.unwrap();
            store.update(&id, DocumentUpdate::OcrStarted).await.unwrap();
        }

        let reopened = LocalDocumentStore::open(&path).await.unwrap();
        let loaded = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.page_count, 2);
        assert_eq!(loaded.ocr_status, OcrStatus::NotRun);
    }

    #[tokio::test]
    async fn owner_listing_is_oldest_first() {
        let store = LocalDocumentStore::in_memory();
        let mut first = Document::new("u", "1.pdf", "/tmp/1.pdf", 1, 0);
        first.created_at = Utc::now() - chrono::Duration::seconds(60);
        let second = Document::new("u", "2.pdf", "/tmp/2.pdf", 1, 0);
        let other = Document::new("someone-else", "3.pdf", "/tmp/3.pdf", 1, 0);
        store.insert(second).await.unwrap();
        store.insert(other).await.unwrap();
        store.insert(first).await.unwrap();

        let names: Vec<String> = store
            .list_for_owner("u")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.original_name)
            .collect();
        assert_eq!(names, vec!["1.pdf", "2.pdf"]);
    }

    #[tokio::test]
    async fn failed_index_write_leaves_records_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("documents.json");
        let store = LocalDocumentStore::open(&path).await.unwrap();

        let doc = Document::new("u", "a.pdf", "/tmp/a.pdf", 10, 2);
        let id = doc.id.clone();
        assert_ok!(store.insert(doc).await);

        // A directory where the temp index goes makes every write fail.
        let blocker = tmp.path().join("documents.json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let err = assert_err!(
            store
                .update(&id, DocumentUpdate::PixelComplete(completion(2)))
                .await
        );
        assert!(matches!(err, RevealError::Index { .. }), "got {err:?}");
        let current = store.get(&id).await.unwrap().unwrap();
        assert!(current.pixel.is_none());

        let late = Document::new("u", "b.pdf", "/tmp/b.pdf", 10, 1);
        let late_id = late.id.clone();
        assert_err!(store.insert(late).await);
        assert!(store.get(&late_id).await.unwrap().is_none());

        assert_err!(store.remove(&id).await);
        assert!(store.get(&id).await.unwrap().is_some());

        // Once writes work again, memory and file agree.
        std::fs::remove_dir(&blocker).unwrap();
        assert_ok!(
            store
                .update(&id, DocumentUpdate::PixelComplete(completion(2)))
                .await
        );
        let reopened = LocalDocumentStore::open(&path).await.unwrap();
        let stored = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.pixel, Some(completion(2)));
        assert!(reopened.get(&late_id).await.unwrap().is_none());
    }
}
