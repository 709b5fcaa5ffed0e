//! Gap Resolution Engine - drives gaps from `Created` to `Filled`.
//!
//! Each gap's guess runs as its own tokio task. Once a candidate arrives the
//! task takes the document lock, publishes the guess, and settles every
//! merge group that has become ready: members move to `Merged` and are
//! committed in one critical section, so readers never observe a half-applied
//! group.

use crate::{
    marker,
    observer::ObserverPtr,
    provider::{Guess, GuessRequest},
    registry::DocumentEntry,
    DocumentId, DocumentRegistry, EngineConfig, GapId, GapState, GapToken, GapfillError,
    GuessProvider, Result, TextDocument,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Final (or last observed) state of one gap after a resolution pass.
#[derive(Debug)]
pub struct GapOutcome {
    /// Snapshot of the gap.
    pub token: GapToken,

    /// Error that ended the gap, when it failed.
    pub error: Option<GapfillError>,
}

impl GapOutcome {
    fn ok(token: GapToken) -> Self {
        Self { token, error: None }
    }

    pub fn gap(&self) -> &GapId {
        &self.token.id
    }

    pub fn is_filled(&self) -> bool {
        self.token.state() == GapState::Filled
    }
}

/// Summary of [`GapResolutionEngine::resolve_document`].
#[derive(Debug)]
pub struct ResolutionReport {
    pub document: DocumentId,

    /// One outcome per gap the pass touched, in registration order.
    pub outcomes: Vec<GapOutcome>,

    /// Gaps still open afterwards (e.g. discovered in the last round).
    pub pending: Vec<GapToken>,

    /// Document text after the pass.
    pub text: String,

    /// Rounds actually run.
    pub rounds: u32,
}

impl ResolutionReport {
    pub fn filled(&self) -> impl Iterator<Item = &GapOutcome> {
        self.outcomes.iter().filter(|o| o.is_filled())
    }

    pub fn failed(&self) -> impl Iterator<Item = &GapOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn outcome(&self, gap: &GapId) -> Option<&GapOutcome> {
        self.outcomes.iter().find(|o| o.gap() == gap)
    }

    /// True when every gap the pass touched was filled and nothing is pending.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.outcomes.iter().all(|o| o.is_filled())
    }
}

/// The engine that resolves gaps with a [`GuessProvider`].
///
/// # Example
///
/// ```rust,ignore
/// use gapfill_core::{DocumentRegistry, GapResolutionEngine, provider::MockProvider};
///
/// let registry = DocumentRegistry::global();
/// let doc = registry.create_document("Hello |_A_|!");
/// registry.register_gap(doc, "|_A_|")?;
///
/// let engine = GapResolutionEngine::new(MockProvider::new().with_response("A", "world"), registry);
/// let report = engine.resolve_document(doc).await?;
/// assert_eq!(report.text, "Hello world!");
/// ```
pub struct GapResolutionEngine<P: GuessProvider> {
    /// The provider proposing replacement text.
    provider: Arc<P>,

    /// Registry owning the documents.
    registry: Arc<DocumentRegistry>,

    config: Arc<EngineConfig>,

    observer: Option<ObserverPtr>,
}

impl<P: GuessProvider + 'static> GapResolutionEngine<P> {
    /// Create a new engine over `registry`.
    pub fn new(provider: P, registry: Arc<DocumentRegistry>) -> Self {
        Self {
            provider: Arc::new(provider),
            registry,
            config: Arc::new(EngineConfig::default()),
            observer: None,
        }
    }

    /// Set the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Attach an observer for transitions and failures.
    pub fn with_observer(mut self, observer: ObserverPtr) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    fn worker(&self, entry: Arc<DocumentEntry>) -> Worker<P> {
        Worker {
            provider: Arc::clone(&self.provider),
            entry,
            config: Arc::clone(&self.config),
            observer: self.observer.clone(),
        }
    }

    /// Resolve every `Created` gap of a document.
    ///
    /// Per-gap failures are reported in the returned report; only registry
    /// errors (`NotFound`) and task panics are returned as `Err`.
    #[instrument(skip(self), fields(document = %doc_id, policy = %self.config.policy))]
    pub async fn resolve_document(&self, doc_id: DocumentId) -> Result<ResolutionReport> {
        let entry = self.registry.entry(doc_id)?;
        let worker = self.worker(Arc::clone(&entry));

        let mut order: Vec<GapId> = Vec::new();
        let mut outcomes: HashMap<GapId, GapOutcome> = HashMap::new();
        let mut rounds = 0;

        for round in 1..=self.config.max_rounds {
            let (known, created) = {
                let doc = entry.lock();
                let known: HashSet<GapId> =
                    marker::find_markers(doc.text()).into_iter().map(|m| m.id).collect();
                let created: Vec<GapId> = doc
                    .open_gaps()
                    .into_iter()
                    .filter(|g| g.state() == GapState::Created)
                    .map(|g| g.id)
                    .collect();
                (known, created)
            };

            if created.is_empty() && round > 1 {
                break;
            }
            rounds = round;
            info!("Round {}: resolving {} gap(s)", round, created.len());

            let mut join_set = JoinSet::new();
            for gap_id in created {
                order.push(gap_id.clone());
                let worker = worker.clone();
                let cancel = entry.subscribe_cancel();
                join_set.spawn(async move { worker.run(gap_id, cancel).await });
            }

            while let Some(result) = join_set.join_next().await {
                for outcome in result? {
                    record_outcome(&mut order, &mut outcomes, outcome);
                }
            }

            for outcome in worker.sweep() {
                record_outcome(&mut order, &mut outcomes, outcome);
            }

            if round < self.config.max_rounds {
                let discovered = discover_new_markers(&mut entry.lock(), &known);
                if discovered == 0 {
                    break;
                }
                debug!("Discovered {} follow-up gap(s)", discovered);
            }
        }

        let (text, pending) = {
            let doc = entry.lock();
            // gaps left waiting on their group may have been cancelled since
            for outcome in outcomes.values_mut() {
                let from = outcome.token.state();
                if from.is_terminal() {
                    continue;
                }
                let id = outcome.gap().clone();
                if let Some(retired) = worker.retire_locked(&doc, &id, from) {
                    *outcome = retired;
                }
            }
            (doc.text().to_string(), doc.open_gaps())
        };

        let outcomes: Vec<GapOutcome> = order
            .iter()
            .filter_map(|id| outcomes.remove(id))
            .collect();

        info!(
            "Resolved document: {} filled, {} failed, {} pending",
            outcomes.iter().filter(|o| o.is_filled()).count(),
            outcomes.iter().filter(|o| o.error.is_some()).count(),
            pending.len()
        );

        Ok(ResolutionReport {
            document: doc_id,
            outcomes,
            pending,
            text,
            rounds,
        })
    }

    /// Resolve a single gap.
    ///
    /// Under a merging policy the gap may still be `Guessed` when this
    /// returns, waiting for the rest of its group. Failures of the gap are
    /// returned as `Err`.
    #[instrument(skip(self), fields(document = %doc_id, gap = %gap_id))]
    pub async fn resolve_gap(&self, doc_id: DocumentId, gap_id: &GapId) -> Result<GapToken> {
        let entry = self.registry.entry(doc_id)?;
        let worker = self.worker(Arc::clone(&entry));

        let state = entry
            .lock()
            .gap(gap_id)
            .filter(|g| g.is_open())
            .map(|g| g.state())
            .ok_or_else(|| GapfillError::UnknownGap(gap_id.to_string()))?;

        let outcomes = if state == GapState::Created {
            let mut outcomes = worker.clone().run(gap_id.clone(), entry.subscribe_cancel()).await;
            outcomes.extend(worker.sweep());
            outcomes
        } else {
            worker.sweep()
        };

        let own = outcomes
            .into_iter()
            .filter(|o| o.gap() == gap_id)
            .reduce(|kept, next| if next.token.state().is_terminal() { next } else { kept });

        match own {
            Some(GapOutcome { error: Some(error), .. }) => Err(error),
            Some(GapOutcome { token, .. }) => Ok(token),
            None => {
                let token = entry.lock().gap(gap_id).cloned();
                token.ok_or_else(|| GapfillError::UnknownGap(gap_id.to_string()))
            }
        }
    }
}

/// Keep the most advanced outcome per gap; terminal outcomes win.
fn record_outcome(order: &mut Vec<GapId>, outcomes: &mut HashMap<GapId, GapOutcome>, outcome: GapOutcome) {
    let id = outcome.gap().clone();
    match outcomes.get(&id) {
        Some(existing) if existing.token.state().is_terminal() => {}
        Some(_) => {
            outcomes.insert(id, outcome);
        }
        None => {
            if !order.contains(&id) {
                order.push(id.clone());
            }
            outcomes.insert(id, outcome);
        }
    }
}

/// Register markers that were not in the text before the round.
fn discover_new_markers(doc: &mut TextDocument, known: &HashSet<GapId>) -> usize {
    let fresh: Vec<GapId> = marker::find_markers(doc.text())
        .into_iter()
        .map(|m| m.id)
        .filter(|id| !known.contains(id) && doc.gap(id).is_none())
        .collect();

    let mut registered = 0;
    for id in fresh {
        match doc.register_gap(&marker::format_marker(&id)) {
            Ok(_) => registered += 1,
            Err(e) => debug!(gap = %id, "follow-up marker skipped: {}", e),
        }
    }
    registered
}

/// Per-document state shared by the resolution tasks of one engine.
struct Worker<P: GuessProvider> {
    provider: Arc<P>,
    entry: Arc<DocumentEntry>,
    config: Arc<EngineConfig>,
    observer: Option<ObserverPtr>,
}

impl<P: GuessProvider> Clone for Worker<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            entry: Arc::clone(&self.entry),
            config: Arc::clone(&self.config),
            observer: self.observer.clone(),
        }
    }
}

impl<P: GuessProvider + 'static> Worker<P> {
    fn document(&self) -> DocumentId {
        self.entry.id()
    }

    /// Drive one `Created` gap as far as it can go.
    ///
    /// Returns an outcome for every gap this task moved to a terminal state,
    /// plus the gap's own state if it is still waiting on its merge group.
    async fn run(self, gap_id: GapId, mut cancel: watch::Receiver<u64>) -> Vec<GapOutcome> {
        let mut finished = Vec::new();

        let request = {
            let mut doc = self.entry.lock();
            match doc.gap(&gap_id).map(|g| g.state()) {
                Some(GapState::Created) => {}
                _ => return finished,
            }
            match doc.context_for(&gap_id, self.config.context_chars) {
                Ok(context) => GuessRequest {
                    document_text: doc.text().to_string(),
                    context,
                },
                Err(e) => {
                    self.fail_locked(&mut doc, &gap_id, e, &mut finished);
                    finished.extend(self.settle_locked(&mut doc));
                    return finished;
                }
            }
        };

        if let Some(observer) = &self.observer {
            observer.on_request(&self.document(), &gap_id);
        }
        debug!(gap = %gap_id, provider = self.provider.name(), "requesting guess");

        let result = tokio::select! {
            result = self.guess_with_retry(&gap_id, request) => result,
            _ = cancel.changed() => Err(GapfillError::Cancelled(gap_id.to_string())),
        };

        let mut doc = self.entry.lock();
        if doc.gap(&gap_id).map(|g| g.state()) != Some(GapState::Created) {
            // failed by a cancellation while the guess was in flight
            finished.extend(self.retire_locked(&doc, &gap_id, GapState::Created));
            return finished;
        }

        match result.and_then(|guess| doc.record_guess(&gap_id, guess.text)) {
            Ok(()) => self.notify(&gap_id, GapState::Created, GapState::Guessed),
            Err(e) => self.fail_locked(&mut doc, &gap_id, e, &mut finished),
        }

        finished.extend(self.settle_locked(&mut doc));

        if let Some(token) = doc.gap(&gap_id).filter(|g| g.is_open()) {
            finished.push(GapOutcome::ok(token.clone()));
        }
        finished
    }

    /// Settle any ready groups outside of a guess task.
    fn sweep(&self) -> Vec<GapOutcome> {
        let mut doc = self.entry.lock();
        self.settle_locked(&mut doc)
    }

    /// Request a guess with retries, bounded by the configured timeout.
    async fn guess_with_retry(&self, gap_id: &GapId, request: GuessRequest) -> Result<Guess> {
        let attempts = async {
            let mut last_error = None;

            for attempt in 0..=self.config.max_retries {
                match self.provider.guess(request.clone()).await {
                    Ok(guess) if guess.text.trim().is_empty() => {
                        return Err(GapfillError::GuessUnavailable {
                            gap: gap_id.to_string(),
                            reason: "provider returned empty text".to_string(),
                        });
                    }
                    Ok(guess) => return Ok(guess),
                    Err(e) => {
                        debug!("Guess attempt {} for {} failed: {}", attempt + 1, gap_id, e);
                        if attempt < self.config.max_retries {
                            if let Some(observer) = &self.observer {
                                observer.on_retry(&self.document(), gap_id, attempt + 1, &e.to_string());
                            }
                            tokio::time::sleep(self.config.backoff(attempt)).await;
                        }
                        last_error = Some(e);
                    }
                }
            }

            Err(GapfillError::GuessUnavailable {
                gap: gap_id.to_string(),
                reason: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown provider error".to_string()),
            })
        };

        match tokio::time::timeout(self.config.guess_timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(GapfillError::GuessUnavailable {
                gap: gap_id.to_string(),
                reason: format!("timed out after {:?}", self.config.guess_timeout),
            }),
        }
    }

    /// Merge and commit every group the policy reports as ready.
    ///
    /// The leader is committed first. When that fails the other members stay
    /// `Guessed` and their group is settled again without the leader.
    fn settle_locked(&self, doc: &mut TextDocument) -> Vec<GapOutcome> {
        let mut finished = Vec::new();

        loop {
            let settlements = self.config.policy.settle(doc, self.config.merge_window);
            if settlements.is_empty() {
                break;
            }

            for settlement in settlements {
                debug!(
                    leader = %settlement.leader,
                    members = settlement.members.len(),
                    "settling group"
                );

                let merged = settlement.merged_text().to_string();
                if !self.commit_member(doc, &settlement.leader, merged, &mut finished) {
                    continue;
                }

                for (id, text) in settlement.members {
                    if id != settlement.leader {
                        self.commit_member(doc, &id, text, &mut finished);
                    }
                }
            }
        }

        finished
    }

    /// Move one `Guessed` gap through `Merged` to `Filled`.
    ///
    /// Returns false when the gap failed instead.
    fn commit_member(
        &self,
        doc: &mut TextDocument,
        gap_id: &GapId,
        text: String,
        finished: &mut Vec<GapOutcome>,
    ) -> bool {
        if let Err(e) = doc.mark_merged(gap_id, text.clone()) {
            self.fail_locked(doc, gap_id, e, finished);
            return false;
        }
        self.notify(gap_id, GapState::Guessed, GapState::Merged);

        match doc.commit(gap_id, &text) {
            Ok(token) => {
                self.notify(gap_id, GapState::Merged, GapState::Filled);
                finished.push(GapOutcome::ok(token));
                true
            }
            Err(e) => {
                self.fail_locked(doc, gap_id, e, finished);
                false
            }
        }
    }

    /// Report a gap that a cancellation already failed, notifying the observer.
    fn retire_locked(&self, doc: &TextDocument, gap_id: &GapId, from: GapState) -> Option<GapOutcome> {
        let outcome = retired_outcome(doc, gap_id)?;
        self.notify(gap_id, from, outcome.token.state());
        if let (Some(observer), Some(error)) = (&self.observer, &outcome.error) {
            observer.on_failure(&self.document(), gap_id, error);
        }
        Some(outcome)
    }

    /// Move an open gap to `Failed`, or report how it already ended.
    fn fail_locked(
        &self,
        doc: &mut TextDocument,
        gap_id: &GapId,
        error: GapfillError,
        finished: &mut Vec<GapOutcome>,
    ) {
        let from = doc.gap(gap_id).map(|g| g.state());
        let reason = error.failure_reason();

        match (from, doc.fail(gap_id, reason)) {
            (Some(from), Ok(())) => {
                warn!(gap = %gap_id, "gap failed: {}", error);
                self.notify(gap_id, from, GapState::Failed(reason));
                if let Some(observer) = &self.observer {
                    observer.on_failure(&self.document(), gap_id, &error);
                }
                if let Some(token) = doc.gap(gap_id) {
                    finished.push(GapOutcome {
                        token: token.clone(),
                        error: Some(error),
                    });
                }
            }
            _ => finished.extend(retired_outcome(doc, gap_id)),
        }
    }

    fn notify(&self, gap: &GapId, from: GapState, to: GapState) {
        debug!(gap = %gap, "{} -> {}", from, to);
        if let Some(observer) = &self.observer {
            observer.on_transition(&self.document(), gap, from, to);
        }
    }
}

/// Outcome of a gap that some other path already failed.
fn retired_outcome(doc: &TextDocument, gap_id: &GapId) -> Option<GapOutcome> {
    let token = doc.gap(gap_id)?;
    let reason = token.failure()?;
    Some(GapOutcome {
        token: token.clone(),
        error: Some(reason.into_error(gap_id.as_str())),
    })
}
