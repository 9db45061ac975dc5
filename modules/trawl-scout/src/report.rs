use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use trawl_archive::BatchReport;

/// Summary of one harvest: what the collector saw and what was persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: String,
    /// Account whose list was walked.
    pub target: String,
    /// `following` or `timeline`.
    pub list: String,
    pub stop: String,
    pub passes: u32,
    pub collected: usize,
    /// Natural keys in the order they were handed to persistence.
    pub keys: Vec<String>,
    /// Set when the viewport failed mid-run; `keys` are then partial.
    pub collect_error: Option<String>,
    /// `None` when persistence was skipped.
    pub batch: Option<BatchReport>,
    #[serde(skip)]
    pub run_log: Option<PathBuf>,
}

impl HarvestReport {
    pub fn is_partial(&self) -> bool {
        self.collect_error.is_some()
            || self.stop == "cancelled"
            || self.batch.as_ref().is_some_and(|b| b.cancelled)
    }
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Harvest Complete: {} of {} ===", self.list, self.target)?;
        writeln!(f, "Run:          {}", self.run_id)?;
        writeln!(f, "Stop reason:  {}", self.stop)?;
        writeln!(f, "Passes:       {}", self.passes)?;
        writeln!(f, "Collected:    {}", self.collected)?;
        if let Some(ref error) = self.collect_error {
            writeln!(f, "Partial:      {error}")?;
        }
        match self.batch {
            Some(ref b) => {
                writeln!(f, "\nPersistence:")?;
                writeln!(f, "  Created:    {}", b.created)?;
                writeln!(f, "  Updated:    {}", b.updated)?;
                writeln!(f, "  Failed:     {}", b.failed)?;
                writeln!(f, "  Skipped:    {}", b.skipped)?;
                if b.artifacts_stored + b.artifacts_deduplicated + b.artifacts_failed > 0 {
                    writeln!(
                        f,
                        "  Artifacts:  {} stored, {} deduplicated, {} failed",
                        b.artifacts_stored, b.artifacts_deduplicated, b.artifacts_failed
                    )?;
                }
                if b.cancelled {
                    writeln!(f, "  (cancelled)")?;
                }
            }
            None => writeln!(f, "\nPersistence:  skipped")?,
        }
        if let Some(ref path) = self.run_log {
            writeln!(f, "\nRun log:      {}", path.display())?;
        }
        Ok(())
    }
}
