//! Single-flight guards keyed by (document, kind).
//!
//! The cache short-circuit in pixel mode and the exactly-once check in OCR
//! mode both read document state and then act on it; two concurrent runs of
//! the same kind for the same document would both pass the check. Holding a
//! [`FlightGuard`] for the whole run closes that window.

use crate::document::DocumentId;
use crate::store::ResultKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type FlightKey = (DocumentId, ResultKind);

/// Held for the duration of one run. Dropping it lets the next run in.
pub type FlightGuard = OwnedMutexGuard<()>;

/// Per-(document, kind) async mutexes.
#[derive(Default)]
pub struct FlightTable {
    slots: Mutex<HashMap<FlightKey, Arc<AsyncMutex<()>>>>,
}

impl FlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &DocumentId, kind: ResultKind) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry((id.clone(), kind))
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Wait until no other run of this kind is in flight for `id`.
    pub async fn acquire(&self, id: &DocumentId, kind: ResultKind) -> FlightGuard {
        self.slot(id, kind).lock_owned().await
    }

    /// Take the guard only if it is free.
    pub fn try_acquire(&self, id: &DocumentId, kind: ResultKind) -> Option<FlightGuard> {
        self.slot(id, kind).try_lock_owned().ok()
    }

    /// Drop the slots of a deleted document.
    pub fn forget(&self, id: &DocumentId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|(doc, _), _| doc != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_excludes_other_keys_do_not() {
        let table = FlightTable::new();
        let id = DocumentId::from("d");

        let held = table.try_acquire(&id, ResultKind::Ocr).expect("free");
        assert!(table.try_acquire(&id, ResultKind::Ocr).is_none());
        assert!(table.try_acquire(&id, ResultKind::Pixel).is_some());
        assert!(table
            .try_acquire(&DocumentId::from("other"), ResultKind::Ocr)
            .is_some());

        drop(held);
        assert!(table.try_acquire(&id, ResultKind::Ocr).is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let table = Arc::new(FlightTable::new());
        let id = DocumentId::from("d");
        let held = table.acquire(&id, ResultKind::Pixel).await;

        let waiter = {
            let table = Arc::clone(&table);
            let id = id.clone();
            tokio::spawn(async move {
                let _g = table.acquire(&id, ResultKind::Pixel).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
    }
}
