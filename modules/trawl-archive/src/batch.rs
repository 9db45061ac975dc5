use std::fmt;

use serde::{Deserialize, Serialize};

use trawl_common::{Artifact, EntityKind, Fields};

/// One entity to persist, optionally with the artifact captured for it.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub kind: EntityKind,
    pub key: String,
    pub fields: Fields,
    pub artifact: Option<Artifact>,
}

impl SaveRequest {
    pub fn new(kind: EntityKind, key: impl Into<String>, fields: Fields) -> Self {
        Self {
            kind,
            key: key.into(),
            fields,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<Artifact>) -> Self {
        self.artifact = artifact;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub key: String,
    pub error: String,
}

/// Aggregate outcome of `Gateway::save_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub artifacts_stored: u32,
    pub artifacts_deduplicated: u32,
    pub artifacts_failed: u32,
    /// Requests never attempted (cancellation or abort).
    pub skipped: u32,
    pub cancelled: bool,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    /// Requests attempted, successful or not.
    pub fn processed(&self) -> u32 {
        self.created + self.updated + self.failed
    }

    pub fn saved(&self) -> u32 {
        self.created + self.updated
    }

    pub(crate) fn record_failure(&mut self, key: &str, error: impl ToString) {
        self.failed += 1;
        self.failures.push(ItemFailure {
            key: key.to_string(),
            error: error.to_string(),
        });
    }

    pub(crate) fn merge(&mut self, other: BatchReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
        self.artifacts_stored += other.artifacts_stored;
        self.artifacts_deduplicated += other.artifacts_deduplicated;
        self.artifacts_failed += other.artifacts_failed;
        self.skipped += other.skipped;
        self.cancelled |= other.cancelled;
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} failed, {} skipped; artifacts {} stored, {} deduplicated, {} failed",
            self.created,
            self.updated,
            self.failed,
            self.skipped,
            self.artifacts_stored,
            self.artifacts_deduplicated,
            self.artifacts_failed,
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// Group requests by (kind, key), keeping first-appearance order of groups
/// and request order within each group.
pub(crate) fn group_by_key(batch: Vec<SaveRequest>) -> Vec<Vec<SaveRequest>> {
    let mut groups: Vec<Vec<SaveRequest>> = Vec::new();
    let mut index: std::collections::HashMap<(EntityKind, String), usize> =
        std::collections::HashMap::new();
    for request in batch {
        let slot = (request.kind, request.key.clone());
        match index.get(&slot) {
            Some(&i) => groups[i].push(request),
            None => {
                index.insert(slot, groups.len());
                groups.push(vec![request]);
            }
        }
    }
    groups
}
