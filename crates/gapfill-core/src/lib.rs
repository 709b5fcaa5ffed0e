//! # Gapfill Core
//!
//! Core library for a template gap-fill engine.
//!
//! Templates contain gaps marked `|_<id>_|`. Each gap is filled
//! asynchronously by a [`GuessProvider`], moving through
//! `Created → Guessed → Merged → Filled` (or `Failed`), and the accepted
//! text is committed back into its [`TextDocument`].
//!
//! ## Features
//!
//! - Marker scanning and gap registration
//! - Monotonic per-gap state machine
//! - `Single`, `Merge` and `MergeAll` merge policies
//! - Concurrent guessing with timeouts, retries and cancellation
//! - Process-wide document registry
//!
//! ## Example
//!
//! ```rust,ignore
//! use gapfill_core::{DocumentRegistry, GapResolutionEngine};
//!
//! let registry = DocumentRegistry::global();
//! let doc = registry.create_document("Hello |_A_|!");
//! registry.discover_gaps(doc)?;
//!
//! let engine = GapResolutionEngine::new(provider, registry);
//! let report = engine.resolve_document(doc).await?;
//! ```

pub mod config;
pub mod context;
pub mod document;
pub mod engine;
pub mod error;
pub mod gap;
pub mod marker;
pub mod observer;
pub mod policy;
pub mod provider;
pub mod registry;

pub use config::EngineConfig;
pub use context::GapContext;
pub use document::{DocumentId, TextDocument};
pub use engine::{GapOutcome, GapResolutionEngine, ResolutionReport};
pub use error::{FailureReason, GapfillError, Result};
pub use gap::{GapId, GapState, GapToken};
pub use observer::{EngineObserver, ObserverPtr};
pub use policy::MergePolicy;
pub use provider::{Guess, GuessProvider, GuessRequest, ProviderConfig};
pub use registry::{DestroyOutcome, DocumentRegistry};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        DocumentId, DocumentRegistry, EngineConfig, GapId, GapResolutionEngine, GapState,
        GapToken, GapfillError, GuessProvider, MergePolicy, ProviderConfig, Result,
        TextDocument,
    };
}
