// Capability boundaries of the collector.
//
// Viewport is the browser-automation side: what is rendered right now, and
// how to move. Extractor turns one rendered unit into a candidate.
//
// Both live outside the core; the collector only sees these traits. That
// keeps every collection test free of a browser: `ScriptedViewport` in
// `testing` replays fixed pass sequences.

use anyhow::Result;
use async_trait::async_trait;

use trawl_common::{Artifact, CandidateItem};

// ---------------------------------------------------------------------------
// Viewport
// ---------------------------------------------------------------------------

/// A scrollable window over a virtualized list, bound to one live browser
/// session. Implementations own the session handle; the collector never
/// touches ambient state.
#[async_trait]
pub trait Viewport: Send + Sync {
    /// One rendered list element as the driver reads it.
    type Unit: Send + Sync;

    /// Snapshot of the units currently rendered. Successive calls overlap:
    /// the same logical item may come back many times.
    async fn visible_units(&self) -> Result<Vec<Self::Unit>>;

    /// Scroll by `fraction` viewport heights (negative scrolls up). Returns
    /// once the scroll has been issued; render settling is the collector's
    /// concern.
    async fn scroll_by(&self, fraction: f64) -> Result<()>;

    /// Capture a binary artifact (element screenshot) for a unit seen for
    /// the first time in this run. Drivers without capture support keep the
    /// default.
    async fn capture_artifact(&self, _unit: &Self::Unit) -> Result<Option<Artifact>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Pulls structured fields out of one opaque rendered unit. Returns `None`
/// for units that don't carry a usable natural key.
pub trait Extractor<U>: Send + Sync {
    fn extract(&self, unit: &U) -> Option<CandidateItem>;
}

impl<U, F> Extractor<U> for F
where
    F: Fn(&U) -> Option<CandidateItem> + Send + Sync,
{
    fn extract(&self, unit: &U) -> Option<CandidateItem> {
        self(unit)
    }
}
