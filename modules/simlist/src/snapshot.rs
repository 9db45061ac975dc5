//! PassLog for disk serialization / replay of list interactions.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything a viewport was asked and answered during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassLog {
    /// What the list holds (`following`, `timeline`, ...).
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<LogEntry>,
}

/// A single logged interaction. Units are stored as JSON so one log format
/// serves every row type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogEntry {
    Read {
        units: Vec<Value>,
        timestamp: DateTime<Utc>,
    },
    ReadFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },
    Scroll {
        fraction: f64,
        position: f64,
        timestamp: DateTime<Utc>,
    },
    ScrollFailed {
        fraction: f64,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PassLog {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Successful reads, in order.
    pub fn reads(&self) -> impl Iterator<Item = &[Value]> {
        self.entries.iter().filter_map(|e| match e {
            LogEntry::Read { units, .. } => Some(units.as_slice()),
            _ => None,
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let log: Self = serde_json::from_str(&json)?;
        Ok(log)
    }
}
