//! Wire types: page listings and the streaming OCR event protocol.
//!
//! An OCR run is exposed as an ordered stream of [`OcrEvent`]s. The transport
//! (chunked HTTP body, stdout, a websocket) is not this crate's concern; it
//! only has to forward each event in order, typically as one JSON object per
//! line via [`OcrEvent::to_ndjson_line`].
//!
//! ```text
//! {"type":"progress","page":1,"totalPages":3}
//! {"type":"page_done","page":1,"totalPages":3,"text":"…","confidence":91.2,"path":"/results/u/d/ocr/page_1.txt"}
//! …
//! {"type":"complete","pages":[{"page":1,"path":"…"},…],"pageCount":3}
//! ```
//!
//! A run ends with exactly one `complete` or `error` event.

use crate::store::Completion;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// A boxed, ordered stream of OCR events for a single run.
pub type OcrEventStream = Pin<Box<dyn Stream<Item = OcrEvent> + Send>>;

/// One stored page artefact, addressed by its public path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    /// 1-indexed page number.
    pub page: usize,
    /// Public path of the stored artefact.
    pub path: String,
}

/// The page list returned by pixel, render and cached OCR lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageListing {
    pub pages: Vec<PageRef>,
    pub page_count: usize,
}

impl PageListing {
    pub fn new(pages: Vec<PageRef>) -> Self {
        let page_count = pages.len();
        Self { pages, page_count }
    }

    /// Rebuild the listing of a finished run from its recorded metadata.
    ///
    /// File names are deterministic, so the directory and count are enough.
    pub fn from_completion(completion: &Completion, extension: &str) -> Self {
        let pages = (1..=completion.page_count)
            .map(|page| PageRef {
                page,
                path: format!("{}/page_{}.{}", completion.dir, page, extension),
            })
            .collect();
        Self {
            pages,
            page_count: completion.page_count,
        }
    }
}

/// Incremental result of an OCR run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OcrEvent {
    /// Emitted before page `page` is processed.
    #[serde(rename_all = "camelCase")]
    Progress { page: usize, total_pages: usize },

    /// Emitted after page `page` has been extracted and persisted.
    #[serde(rename_all = "camelCase")]
    PageDone {
        page: usize,
        total_pages: usize,
        text: String,
        confidence: f32,
        path: String,
    },

    /// Terminal success.
    #[serde(rename_all = "camelCase")]
    Complete {
        pages: Vec<PageRef>,
        page_count: usize,
    },

    /// Terminal failure.
    Error { error: String },
}

impl OcrEvent {
    /// True for `complete` and `error`, which close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OcrEvent::Complete { .. } | OcrEvent::Error { .. })
    }

    /// Serialise as one newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> String {
        // Every variant is plain data; serialisation cannot fail.
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"event serialisation failed: {e}"}}"#)
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_wire_shape() {
        let ev = OcrEvent::Progress {
            page: 2,
            total_pages: 3,
        };
        let v: serde_json::Value = serde_json::from_str(ev.to_ndjson_line().trim()).unwrap();
        assert_eq!(v, json!({"type": "progress", "page": 2, "totalPages": 3}));
    }

    #[test]
    fn page_done_wire_shape() {
        let ev = OcrEvent::PageDone {
            page: 1,
            total_pages: 1,
            text: "hidden".into(),
            confidence: 50.0,
            path: "/results/u/d/ocr/page_1.txt".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "page_done");
        assert_eq!(v["totalPages"], 1);
        assert_eq!(v["confidence"], 50.0);
        assert_eq!(v["path"], "/results/u/d/ocr/page_1.txt");
    }

    #[test]
    fn complete_and_error_are_terminal() {
        let complete = OcrEvent::Complete {
            pages: vec![],
            page_count: 0,
        };
        assert!(complete.is_terminal());
        assert_eq!(
            serde_json::to_value(&complete).unwrap(),
            json!({"type": "complete", "pages": [], "pageCount": 0})
        );
        let err = OcrEvent::Error {
            error: "boom".into(),
        };
        assert!(err.is_terminal());
        assert!(!OcrEvent::Progress {
            page: 1,
            total_pages: 1
        }
        .is_terminal());
    }

    #[test]
    fn ndjson_line_is_single_line() {
        let ev = OcrEvent::PageDone {
            page: 1,
            total_pages: 1,
            text: "line one\nline two".into(),
            confidence: 80.0,
            path: "p".into(),
        };
        let line = ev.to_ndjson_line();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn listing_from_completion() {
        let c = Completion {
            dir: "/results/u/d/pixel".into(),
            page_count: 2,
        };
        let listing = PageListing::from_completion(&c, "png");
        assert_eq!(listing.page_count, 2);
        assert_eq!(listing.pages[1].page, 2);
        assert_eq!(listing.pages[1].path, "/results/u/d/pixel/page_2.png");
    }
}
