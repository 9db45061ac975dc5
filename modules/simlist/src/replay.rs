// ReplayViewport: serves the successful reads of a recorded PassLog in
// order, then renders nothing. Scrolls are accepted and ignored; recorded
// failures are not reproduced.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use trawl_collector::Viewport;

use crate::snapshot::PassLog;

pub struct ReplayViewport<U> {
    label: String,
    reads: Vec<Vec<U>>,
    cursor: Mutex<usize>,
}

impl<U> ReplayViewport<U>
where
    U: DeserializeOwned + Clone + Send + Sync,
{
    pub fn from_log(log: &PassLog) -> Result<Self> {
        let reads = log
            .reads()
            .enumerate()
            .map(|(i, units)| {
                units
                    .iter()
                    .map(|u| serde_json::from_value(u.clone()))
                    .collect::<Result<Vec<U>, _>>()
                    .with_context(|| format!("Read {i} of '{}' does not match the row type", log.label))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            label: log.label.clone(),
            reads,
            cursor: Mutex::new(0),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let log = PassLog::load(path)
            .with_context(|| format!("Failed to load pass log {}", path.display()))?;
        Self::from_log(&log)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recorded reads available for replay.
    pub fn recorded_reads(&self) -> usize {
        self.reads.len()
    }
}

#[async_trait]
impl<U> Viewport for ReplayViewport<U>
where
    U: DeserializeOwned + Clone + Send + Sync,
{
    type Unit = U;

    async fn visible_units(&self) -> Result<Vec<U>> {
        let mut cursor = self.cursor.lock().await;
        let units = self.reads.get(*cursor).cloned().unwrap_or_default();
        *cursor += 1;
        Ok(units)
    }

    async fn scroll_by(&self, _fraction: f64) -> Result<()> {
        Ok(())
    }
}
