//! Process-wide document registry.
//!
//! The registry exclusively owns every [`TextDocument`]. Each document sits
//! behind its own mutex, which serializes commits and state changes for that
//! document; different documents never contend.

use crate::{DocumentId, FailureReason, GapId, GapToken, GapfillError, Result, TextDocument};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;
use tracing::{debug, info};

static GLOBAL_REGISTRY: OnceLock<Arc<DocumentRegistry>> = OnceLock::new();

/// Result of [`DocumentRegistry::destroy_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The document was removed.
    Destroyed,
    /// Gaps are still open; nothing was removed.
    Retained { open_gaps: usize },
}

/// A registered document and its cancellation signal.
pub(crate) struct DocumentEntry {
    id: DocumentId,
    document: Mutex<TextDocument>,
    /// Bumped on every cancellation; guess tasks watch for changes.
    cancel_epoch: watch::Sender<u64>,
}

impl DocumentEntry {
    fn new(document: TextDocument) -> Self {
        let (cancel_epoch, _) = watch::channel(0);
        Self {
            id: document.id(),
            document: Mutex::new(document),
            cancel_epoch,
        }
    }

    pub(crate) fn id(&self) -> DocumentId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TextDocument> {
        self.document.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receiver that changes on the next cancellation of this document.
    pub(crate) fn subscribe_cancel(&self) -> watch::Receiver<u64> {
        self.cancel_epoch.subscribe()
    }

    fn cancel(&self) -> usize {
        self.cancel_epoch.send_modify(|epoch| *epoch += 1);
        self.lock().fail_open(FailureReason::Cancelled)
    }
}

/// Lookup of documents and gaps by identifier.
#[derive(Default)]
pub struct DocumentRegistry {
    documents: DashMap<DocumentId, Arc<DocumentEntry>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<DocumentRegistry> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(DocumentRegistry::new())))
    }

    /// Register new template text and return its document id.
    pub fn create_document(&self, initial_text: impl Into<String>) -> DocumentId {
        let document = TextDocument::new(initial_text);
        let id = document.id();
        self.documents.insert(id, Arc::new(DocumentEntry::new(document)));
        debug!(document = %id, "document created");
        id
    }

    /// Snapshot of a document.
    pub fn get_document(&self, id: DocumentId) -> Result<TextDocument> {
        Ok(self.entry(id)?.lock().clone())
    }

    /// Run `f` with exclusive access to a document.
    pub fn with_document<R>(&self, id: DocumentId, f: impl FnOnce(&mut TextDocument) -> R) -> Result<R> {
        let entry = self.entry(id)?;
        let mut document = entry.lock();
        Ok(f(&mut document))
    }

    /// Register an existing marker of a document.
    pub fn register_gap(&self, id: DocumentId, marker: &str) -> Result<GapToken> {
        self.with_document(id, |doc| doc.register_gap(marker))?
    }

    /// Register every untracked marker of a document.
    pub fn discover_gaps(&self, id: DocumentId) -> Result<Vec<GapToken>> {
        self.with_document(id, |doc| doc.discover_gaps())
    }

    /// Commit replacement text for a gap directly, bypassing the engine.
    pub fn commit(&self, id: DocumentId, gap: &GapId, replacement: &str) -> Result<GapToken> {
        self.with_document(id, |doc| doc.commit(gap, replacement))?
    }

    /// Remove a document whose gaps are all resolved.
    ///
    /// When gaps remain open this is a no-op that reports how many; cancel
    /// the document first to force removal.
    pub fn destroy_document(&self, id: DocumentId) -> Result<DestroyOutcome> {
        let mut open_gaps = 0;
        let removed = self.documents.remove_if(&id, |_, entry| {
            open_gaps = entry.lock().open_gaps().len();
            open_gaps == 0
        });

        match removed {
            Some(_) => {
                info!(document = %id, "document destroyed");
                Ok(DestroyOutcome::Destroyed)
            }
            None if self.documents.contains_key(&id) => {
                debug!(document = %id, open_gaps, "document retained, gaps still open");
                Ok(DestroyOutcome::Retained { open_gaps })
            }
            None => Err(GapfillError::NotFound(id.to_string())),
        }
    }

    /// Cancel all in-flight resolution of a document.
    ///
    /// Every open gap moves to `Failed(Cancelled)`; filled gaps are
    /// unaffected. Returns the number of gaps cancelled.
    pub fn cancel_document(&self, id: DocumentId) -> Result<usize> {
        let cancelled = self.entry(id)?.cancel();
        info!(document = %id, cancelled, "document cancelled");
        Ok(cancelled)
    }

    /// Cancel a document, then destroy it.
    pub fn force_destroy(&self, id: DocumentId) -> Result<usize> {
        let cancelled = self.cancel_document(id)?;
        self.documents
            .remove(&id)
            .ok_or_else(|| GapfillError::NotFound(id.to_string()))?;
        info!(document = %id, "document force-destroyed");
        Ok(cancelled)
    }

    /// Find the document tracking `gap` and a snapshot of the gap.
    pub fn find_gap(&self, gap: &GapId) -> Result<(DocumentId, GapToken)> {
        let entries: Vec<Arc<DocumentEntry>> =
            self.documents.iter().map(|e| Arc::clone(e.value())).collect();

        entries
            .into_iter()
            .find_map(|entry| {
                let document = entry.lock();
                document.gap(gap).cloned().map(|token| (entry.id(), token))
            })
            .ok_or_else(|| GapfillError::UnknownGap(gap.to_string()))
    }

    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub(crate) fn entry(&self, id: DocumentId) -> Result<Arc<DocumentEntry>> {
        self.documents
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| GapfillError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GapState;

    #[test]
    fn test_create_and_get() {
        let registry = DocumentRegistry::new();
        let id = registry.create_document("Hello |_A_|!");
        let doc = registry.get_document(id).unwrap();
        assert_eq!(doc.id(), id);
        assert_eq!(doc.text(), "Hello |_A_|!");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_document() {
        let registry = DocumentRegistry::new();
        let id = DocumentId::new();
        assert!(matches!(registry.get_document(id), Err(GapfillError::NotFound(_))));
        assert!(matches!(registry.destroy_document(id), Err(GapfillError::NotFound(_))));
        assert!(matches!(registry.cancel_document(id), Err(GapfillError::NotFound(_))));
    }

    #[test]
    fn test_destroy_retains_document_with_open_gaps() {
        let registry = DocumentRegistry::new();
        let id = registry.create_document("Hello |_A_|!");
        registry.register_gap(id, "|_A_|").unwrap();

        assert_eq!(
            registry.destroy_document(id).unwrap(),
            DestroyOutcome::Retained { open_gaps: 1 }
        );
        assert_eq!(
            registry.destroy_document(id).unwrap(),
            DestroyOutcome::Retained { open_gaps: 1 }
        );
        assert!(registry.get_document(id).is_ok());
    }

    #[test]
    fn test_cancel_then_destroy() {
        let registry = DocumentRegistry::new();
        let id = registry.create_document("|_A_| |_B_|");
        let a = registry.register_gap(id, "|_A_|").unwrap();
        registry.register_gap(id, "|_B_|").unwrap();
        registry.commit(id, &a.id, "done").unwrap();

        assert_eq!(registry.cancel_document(id).unwrap(), 1);
        let doc = registry.get_document(id).unwrap();
        assert_eq!(
            doc.gap(&GapId::new("B")).unwrap().state(),
            GapState::Failed(FailureReason::Cancelled)
        );
        assert_eq!(doc.text(), "done |_B_|");

        assert_eq!(registry.destroy_document(id).unwrap(), DestroyOutcome::Destroyed);
        assert!(matches!(registry.get_document(id), Err(GapfillError::NotFound(_))));
    }

    #[test]
    fn test_force_destroy() {
        let registry = DocumentRegistry::new();
        let id = registry.create_document("|_A_|");
        registry.register_gap(id, "|_A_|").unwrap();
        assert_eq!(registry.force_destroy(id).unwrap(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_gap_across_documents() {
        let registry = DocumentRegistry::new();
        let first = registry.create_document("|_A_|");
        let second = registry.create_document("|_B_|");
        registry.register_gap(first, "|_A_|").unwrap();
        registry.register_gap(second, "|_B_|").unwrap();

        let (doc, token) = registry.find_gap(&GapId::new("B")).unwrap();
        assert_eq!(doc, second);
        assert_eq!(token.document, second);
        assert!(matches!(
            registry.find_gap(&GapId::new("C")),
            Err(GapfillError::UnknownGap(_))
        ));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let id = DocumentRegistry::global().create_document("shared");
        assert!(DocumentRegistry::global().document_ids().contains(&id));
        DocumentRegistry::global().destroy_document(id).unwrap();
    }
}
