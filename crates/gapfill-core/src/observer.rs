use crate::{DocumentId, GapId, GapState, GapfillError};
use std::sync::Arc;

/// Trait for observing engine events (logging, metrics, UI).
///
/// Callbacks run while the owning document is locked, so they see
/// transitions in the order they were published and must not block.
pub trait EngineObserver: Send + Sync {
    /// Called when a guess is requested for a gap.
    fn on_request(&self, document: &DocumentId, gap: &GapId);

    /// Called after every state transition.
    fn on_transition(&self, document: &DocumentId, gap: &GapId, from: GapState, to: GapState);

    /// Called when a gap fails, with the error surfaced to the caller.
    fn on_failure(&self, document: &DocumentId, gap: &GapId, error: &GapfillError);

    /// Called when a provider attempt fails and will be retried.
    fn on_retry(&self, _document: &DocumentId, _gap: &GapId, _attempt: u32, _error: &str) {}
}

pub type ObserverPtr = Arc<dyn EngineObserver>;
