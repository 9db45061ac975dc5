use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use trawl_common::{CapPolicy, ListConfig, RetryConfig, ScrollConfig};

use crate::error::CollectError;
use crate::policy::ScrollPolicy;
use crate::retry::RetryPolicy;
use crate::set::{CollectedSet, ScrollState};
use crate::traits::{Extractor, Viewport};

// =============================================================================
// Configuration
// =============================================================================

/// Limits and policies for one collection run.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Hard ceiling on scan passes (each pass is one read of the viewport).
    pub max_passes: u32,
    /// Stop once the set holds this many items.
    pub max_items: Option<usize>,
    /// Convergence threshold: stop after this many passes in a row that
    /// found nothing new. Clamped to at least one.
    pub max_consecutive_empty_passes: u32,
    pub cap_policy: CapPolicy,
    pub scroll: ScrollPolicy,
    pub retry: RetryPolicy,
}

impl CollectConfig {
    pub fn new(max_passes: u32, max_consecutive_empty_passes: u32) -> Self {
        Self {
            max_passes,
            max_items: None,
            max_consecutive_empty_passes: max_consecutive_empty_passes.max(1),
            cap_policy: CapPolicy::Trim,
            scroll: ScrollPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(list: &ListConfig, scroll: &ScrollConfig, retry: &RetryConfig) -> Self {
        Self {
            max_passes: list.max_passes,
            max_items: list.max_items,
            max_consecutive_empty_passes: list.max_consecutive_empty_passes.max(1),
            cap_policy: list.cap_policy,
            scroll: ScrollPolicy::from(scroll),
            retry: RetryPolicy::from(retry),
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn with_cap_policy(mut self, policy: CapPolicy) -> Self {
        self.cap_policy = policy;
        self
    }

    pub fn with_scroll(mut self, scroll: ScrollPolicy) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn cap_reached(&self, len: usize) -> bool {
        self.max_items.is_some_and(|max| len >= max)
    }

    /// Termination check, evaluated after every pass.
    fn stop_reason(&self, state: &ScrollState, len: usize) -> Option<StopReason> {
        if self.cap_reached(len) {
            Some(StopReason::ItemCap)
        } else if state.consecutive_empty_passes >= self.max_consecutive_empty_passes {
            Some(StopReason::Converged)
        } else if state.passes_completed >= self.max_passes {
            Some(StopReason::PassLimit)
        } else {
            None
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_consecutive_empty_passes` passes in a row found nothing new.
    Converged,
    PassLimit,
    ItemCap,
    Cancelled,
    /// Scrolling failed; see [`CollectOutcome::error`].
    ViewportLost,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Converged => "converged",
            StopReason::PassLimit => "pass_limit",
            StopReason::ItemCap => "item_cap",
            StopReason::Cancelled => "cancelled",
            StopReason::ViewportLost => "viewport_lost",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub units_seen: u32,
    /// Units the extractor could not key.
    pub units_rejected: u32,
    /// Units whose key was already in the set.
    pub resightings: u32,
    /// Passes whose read failed even after retries (counted as empty).
    pub failed_reads: u32,
    pub artifacts_captured: u32,
    pub artifact_failures: u32,
    pub corrections: u32,
}

/// What a run produced. Partial results are kept on every exit path.
#[derive(Debug)]
pub struct CollectOutcome {
    pub items: CollectedSet,
    pub state: ScrollState,
    pub stop: StopReason,
    pub error: Option<CollectError>,
    pub stats: CollectStats,
}

impl CollectOutcome {
    /// Ended on its own terms: converged, hit a limit, or cancelled.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the set and the error, for callers that want `?`
    /// semantics but still need the partial set on failure.
    pub fn into_result(self) -> Result<CollectedSet, (CollectedSet, CollectError)> {
        match self.error {
            None => Ok(self.items),
            Some(e) => Err((self.items, e)),
        }
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Drives the scan → decide → scroll → settle loop over one viewport.
///
/// Stateless between calls: all run state lives inside [`Collector::collect`].
/// Best-effort: every key returned was observed in some pass, but the
/// underlying list may hold items the run never saw.
pub struct Collector {
    config: CollectConfig,
}

impl Collector {
    pub fn new(config: CollectConfig) -> Self {
        Self { config }
    }

    pub async fn collect<V, E>(
        &self,
        viewport: &V,
        extractor: &E,
        cancelled: &AtomicBool,
    ) -> CollectOutcome
    where
        V: Viewport,
        E: Extractor<V::Unit>,
    {
        let mut run = Run {
            items: CollectedSet::new(),
            state: ScrollState::default(),
            stats: CollectStats::default(),
        };

        if self.config.max_passes == 0 {
            return run.finish(StopReason::PassLimit, None);
        }
        if self.config.cap_reached(0) {
            return run.finish(StopReason::ItemCap, None);
        }

        loop {
            if cancelled.load(Ordering::Relaxed) {
                info!(
                    passes = run.state.passes_completed,
                    collected = run.items.len(),
                    "Collection cancelled"
                );
                return run.finish(StopReason::Cancelled, None);
            }

            let pass_index = run.state.passes_completed;
            let before = run.items.len();

            match self.config.retry.run(move || viewport.visible_units()).await {
                Ok(units) => self.absorb(viewport, extractor, &units, pass_index, &mut run).await,
                Err(e) => {
                    warn!(pass = pass_index + 1, error = %e, "Read failed, treating pass as empty");
                    run.stats.failed_reads += 1;
                }
            }

            let newly_added = run.items.len() - before;
            run.state.record_pass(newly_added);

            info!(
                pass = run.state.passes_completed,
                new = newly_added,
                total = run.items.len(),
                empty_streak = run.state.consecutive_empty_passes,
                "Pass complete"
            );

            if let Some(reason) = self.config.stop_reason(&run.state, run.items.len()) {
                info!(
                    reason = %reason,
                    passes = run.state.passes_completed,
                    collected = run.items.len(),
                    "Collection finished"
                );
                return run.finish(reason, None);
            }

            if let Err(e) = self.advance_viewport(viewport, pass_index, &mut run.stats).await {
                warn!(
                    error = %e,
                    collected = run.items.len(),
                    "Viewport lost, returning partial results"
                );
                return run.finish(StopReason::ViewportLost, Some(e));
            }

            let settle = self.config.scroll.settle_delay(newly_added > 0);
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
        }
    }

    /// Fold one pass's units into the set. First sightings get an artifact
    /// capture; re-sightings are only counted.
    async fn absorb<V, E>(
        &self,
        viewport: &V,
        extractor: &E,
        units: &[V::Unit],
        pass_index: u32,
        run: &mut Run,
    ) where
        V: Viewport,
        E: Extractor<V::Unit>,
    {
        for unit in units {
            if self.config.cap_policy == CapPolicy::Trim && self.config.cap_reached(run.items.len())
            {
                break;
            }

            run.stats.units_seen += 1;
            let Some(candidate) = extractor.extract(unit) else {
                run.stats.units_rejected += 1;
                continue;
            };
            if run.items.contains(&candidate.key) {
                run.stats.resightings += 1;
                continue;
            }

            let artifact = match viewport.capture_artifact(unit).await {
                Ok(Some(artifact)) => {
                    run.stats.artifacts_captured += 1;
                    Some(artifact.with_source_key(candidate.key.clone()))
                }
                Ok(None) => None,
                Err(e) => {
                    debug!(key = candidate.key.as_str(), error = %e, "Artifact capture failed");
                    run.stats.artifact_failures += 1;
                    None
                }
            };

            run.items.insert(candidate, artifact, pass_index);
        }
    }

    /// Scroll after pass `pass_index` (zero-based). Distance is a function
    /// of the index only; every correction interval a reverse-then-forward
    /// nudge follows the main scroll.
    async fn advance_viewport<V: Viewport>(
        &self,
        viewport: &V,
        pass_index: u32,
        stats: &mut CollectStats,
    ) -> Result<(), CollectError> {
        let plan = self.config.scroll.plan(pass_index);
        let lost = |source| CollectError::ViewportAdvance {
            pass: pass_index + 1,
            source,
        };

        viewport.scroll_by(plan.distance).await.map_err(lost)?;

        if let Some(correction) = plan.correction {
            debug!(pass = pass_index + 1, "Correction scroll");
            viewport.scroll_by(-correction.back).await.map_err(lost)?;
            if !correction.pause.is_zero() {
                tokio::time::sleep(correction.pause).await;
            }
            viewport.scroll_by(correction.forward).await.map_err(lost)?;
            stats.corrections += 1;
        }

        Ok(())
    }
}

/// Run-scoped state, local to one `collect` call.
struct Run {
    items: CollectedSet,
    state: ScrollState,
    stats: CollectStats,
}

impl Run {
    fn finish(self, stop: StopReason, error: Option<CollectError>) -> CollectOutcome {
        CollectOutcome {
            items: self.items,
            state: self.state,
            stop,
            error,
            stats: self.stats,
        }
    }
}
