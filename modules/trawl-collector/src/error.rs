use thiserror::Error;

/// Errors of a collection run. Only `ViewportAdvance` ends up in
/// [`crate::CollectOutcome::error`], next to the partial set; an exhausted
/// `TransientRead` is counted in `stats.failed_reads` and the run goes on.
#[derive(Debug, Error)]
pub enum CollectError {
    /// `visible_units()` kept failing within one pass. Recovered locally:
    /// the pass counts as empty.
    #[error("reading visible units failed after {attempts} attempts: {source}")]
    TransientRead {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Scrolling failed. Fatal to the run.
    #[error("viewport advance failed after pass {pass}: {source}")]
    ViewportAdvance {
        pass: u32,
        #[source]
        source: anyhow::Error,
    },
}
