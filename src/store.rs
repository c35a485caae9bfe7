//! On-disk result artefacts.
//!
//! Layout, relative to [`crate::PipelineConfig::results_root`]:
//!
//! ```text
//! <owner>/<document>/<kind>/page_<N>.<ext>
//! ```
//!
//! Paths are a pure function of (owner, document, kind, page), so rewriting a
//! page overwrites the previous file and reruns are idempotent. There is no
//! file locking; [`crate::flight::FlightTable`] keeps writers of one
//! (document, kind) pair from overlapping.

use crate::document::DocumentId;
use crate::error::RevealError;
use crate::events::PageRef;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Artefact family produced by one pipeline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Unprocessed page renders.
    Original,
    /// Pixel-reveal output.
    Pixel,
    /// OCR text.
    Ocr,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Original => "original",
            ResultKind::Pixel => "pixel",
            ResultKind::Ocr => "ocr",
        }
    }

    /// File extension of the per-page artefact.
    pub fn extension(&self) -> &'static str {
        match self {
            ResultKind::Original | ResultKind::Pixel => "png",
            ResultKind::Ocr => "txt",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion metadata recorded on a document after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Public result directory.
    pub dir: String,
    /// Pages written.
    pub page_count: usize,
}

/// Deterministic path construction and writes for result artefacts.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
    public_prefix: String,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    /// Filesystem directory for one (owner, document, kind).
    pub fn kind_dir(&self, owner: &str, id: &DocumentId, kind: ResultKind) -> PathBuf {
        self.root.join(owner).join(id.as_str()).join(kind.as_str())
    }

    /// Public form of [`Self::kind_dir`].
    pub fn public_dir(&self, owner: &str, id: &DocumentId, kind: ResultKind) -> String {
        format!("{}/{}/{}/{}", self.public_prefix, owner, id, kind)
    }

    /// Create the directory for a run (recursive, tolerant of existing dirs).
    pub async fn prepare(
        &self,
        owner: &str,
        id: &DocumentId,
        kind: ResultKind,
    ) -> Result<KindDir, RevealError> {
        let fs_dir = self.kind_dir(owner, id, kind);
        tokio::fs::create_dir_all(&fs_dir)
            .await
            .map_err(|e| RevealError::Storage {
                path: fs_dir.clone(),
                source: e,
            })?;
        Ok(KindDir {
            fs_dir,
            public_dir: self.public_dir(owner, id, kind),
            kind,
        })
    }

    /// Stored page images of one kind, ordered by page number.
    ///
    /// Files not named `page_<N>.png` are ignored. A missing directory yields
    /// an empty list.
    pub async fn list_page_images(
        &self,
        owner: &str,
        id: &DocumentId,
        kind: ResultKind,
    ) -> Result<Vec<(usize, PathBuf)>, RevealError> {
        let dir = self.kind_dir(owner, id, kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RevealError::Storage { path: dir, source: e }),
        };

        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RevealError::Storage {
                path: dir.clone(),
                source: e,
            })?
        {
            let name = entry.file_name();
            if let Some(page) = name.to_str().and_then(parse_page_image_name) {
                pages.push((page, entry.path()));
            }
        }
        pages.sort_by_key(|(page, _)| *page);
        Ok(pages)
    }

    /// Remove every result directory of a document. Missing dirs are fine.
    pub async fn purge_document(&self, owner: &str, id: &DocumentId) -> Result<(), RevealError> {
        let dir = self.root.join(owner).join(id.as_str());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Purged results at {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RevealError::Storage { path: dir, source: e }),
        }
    }
}

/// A prepared result directory for one run.
#[derive(Debug, Clone)]
pub struct KindDir {
    fs_dir: PathBuf,
    public_dir: String,
    kind: ResultKind,
}

impl KindDir {
    pub fn fs_dir(&self) -> &Path {
        &self.fs_dir
    }

    pub fn public_dir(&self) -> &str {
        &self.public_dir
    }

    fn file_name(&self, page: usize) -> String {
        format!("page_{}.{}", page, self.kind.extension())
    }

    /// Public reference for a page, whether or not it has been written yet.
    pub fn page_ref(&self, page: usize) -> PageRef {
        PageRef {
            page,
            path: format!("{}/{}", self.public_dir, self.file_name(page)),
        }
    }

    /// Write (or overwrite) the artefact for `page`.
    pub async fn write_page(&self, page: usize, contents: &[u8]) -> Result<PageRef, RevealError> {
        let path = self.fs_dir.join(self.file_name(page));
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| RevealError::Storage { path, source: e })?;
        Ok(self.page_ref(page))
    }

    /// Metadata to record on the document once all pages are written.
    pub fn completion(&self, page_count: usize) -> Completion {
        Completion {
            dir: self.public_dir.clone(),
            page_count,
        }
    }
}

static RE_PAGE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)\.png$").unwrap());

fn parse_page_image_name(name: &str) -> Option<usize> {
    RE_PAGE_IMAGE
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> ResultStore {
        ResultStore::new(root, "/results")
    }

    #[test]
    fn paths_are_deterministic() {
        let s = ResultStore::new("/data/results", "/results");
        let id = DocumentId::from("d1");
        assert_eq!(
            s.kind_dir("u1", &id, ResultKind::Pixel),
            PathBuf::from("/data/results/u1/d1/pixel")
        );
        assert_eq!(s.public_dir("u1", &id, ResultKind::Ocr), "/results/u1/d1/ocr");
    }

    #[test]
    fn page_image_names() {
        assert_eq!(parse_page_image_name("page_1.png"), Some(1));
        assert_eq!(parse_page_image_name("page_12.png"), Some(12));
        assert_eq!(parse_page_image_name("page_1_temp.png"), None);
        assert_eq!(parse_page_image_name("page_1.txt"), None);
        assert_eq!(parse_page_image_name("cover.png"), None);
    }

    #[tokio::test]
    async fn write_overwrites_and_lists_in_page_order() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let id = DocumentId::from("d1");
        let dir = s.prepare("u", &id, ResultKind::Pixel).await.unwrap();
        // Preparing twice is fine.
        s.prepare("u", &id, ResultKind::Pixel).await.unwrap();

        for page in [10, 2, 1] {
            dir.write_page(page, b"first").await.unwrap();
        }
        let r = dir.write_page(2, b"second").await.unwrap();
        assert_eq!(r.path, "/results/u/d1/pixel/page_2.png");

        let listed = s.list_page_images("u", &id, ResultKind::Pixel).await.unwrap();
        let numbers: Vec<usize> = listed.iter().map(|(p, _)| *p).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert_eq!(std::fs::read(&listed[1].1).unwrap(), b"second");
    }

    #[tokio::test]
    async fn missing_dir_lists_empty_and_purge_is_tolerant() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let id = DocumentId::from("nope");
        assert!(s
            .list_page_images("u", &id, ResultKind::Original)
            .await
            .unwrap()
            .is_empty());
        s.purge_document("u", &id).await.unwrap();

        let dir = s.prepare("u", &id, ResultKind::Ocr).await.unwrap();
        dir.write_page(1, b"text").await.unwrap();
        s.purge_document("u", &id).await.unwrap();
        assert!(!s.kind_dir("u", &id, ResultKind::Ocr).exists());
    }
}
