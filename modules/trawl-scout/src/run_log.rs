//! Harvest run log: persisted JSON timeline of what one harvest did.
//!
//! Each run produces a single `{DATA_DIR}/trawl-runs/{target}/{run_id}.json`
//! file containing an ordered list of events with timestamps.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use trawl_archive::BatchReport;
use trawl_collector::CollectOutcome;

use crate::report::HarvestReport;

pub struct RunLog {
    pub run_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    CollectStarted {
        list: String,
        max_passes: u32,
        max_items: Option<usize>,
        max_consecutive_empty_passes: u32,
    },
    CollectFinished {
        stop: String,
        passes: u32,
        collected: usize,
        units_seen: u32,
        units_rejected: u32,
        resightings: u32,
        failed_reads: u32,
        artifacts_captured: u32,
        corrections: u32,
    },
    CollectFailed {
        error: String,
        collected: usize,
    },
    PersistSkipped {
        reason: String,
    },
    BatchSaved {
        report: BatchReport,
    },
    BatchAborted {
        error: String,
        report: BatchReport,
    },
}

impl EventKind {
    pub fn collect_finished(outcome: &CollectOutcome) -> Self {
        EventKind::CollectFinished {
            stop: outcome.stop.to_string(),
            passes: outcome.state.passes_completed,
            collected: outcome.items.len(),
            units_seen: outcome.stats.units_seen,
            units_rejected: outcome.stats.units_rejected,
            resightings: outcome.stats.resightings,
            failed_reads: outcome.stats.failed_reads,
            artifacts_captured: outcome.stats.artifacts_captured,
            corrections: outcome.stats.corrections,
        }
    }
}

impl RunLog {
    pub fn new(run_id: String, target: String) -> Self {
        Self {
            run_id,
            target,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize the run log to JSON and write it under `data_dir`.
    /// Returns the file path on success.
    pub fn save(&self, data_dir: &Path, report: &HarvestReport) -> Result<PathBuf> {
        let dir = data_dir.join("trawl-runs").join(&self.target);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.run_id));
        let output = SerializedRunLog {
            run_id: &self.run_id,
            target: &self.target,
            started_at: self.started_at,
            finished_at: Utc::now(),
            summary: report,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Harvest run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    target: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    summary: &'a HarvestReport,
    events: &'a [RunEvent],
}
