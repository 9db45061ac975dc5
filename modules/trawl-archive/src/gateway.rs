//! Deduplicating persistence gateway.
//!
//! The single writer of durable storage. Entities are upserted by natural
//! key: created when absent, refreshed when present, never duplicated. A
//! lost insert race surfaces from the backend as `Conflict` and is retried
//! as an update. Artifacts are content-addressed by SHA-256, so identical
//! bytes are stored once however often they are captured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use trawl_common::{Artifact, EntityKind, Fields, PersistenceConfig};

use crate::batch::{group_by_key, BatchReport, SaveRequest};
use crate::error::{ArchiveError, Result};
use crate::store::EntityStore;

/// Result of one entity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityWrite {
    pub id: Uuid,
    pub created: bool,
}

/// Result of one artifact upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWrite {
    pub id: Uuid,
    pub content_hash: String,
    /// The hash was already stored; nothing was written.
    pub deduplicated: bool,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn EntityStore>,
    throttle: Duration,
    concurrency: usize,
}

impl Gateway {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::from_config(store, &PersistenceConfig::default())
    }

    pub fn from_config(store: Arc<dyn EntityStore>, config: &PersistenceConfig) -> Self {
        Self {
            store,
            throttle: Duration::from_millis(config.throttle_ms),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Delay after each batch item.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// How many distinct keys `save_many` may write at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    pub async fn upsert_entity(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &Fields,
    ) -> Result<EntityWrite> {
        let mode = kind.write_mode();

        if self.store.find_by_key(kind, key).await?.is_some() {
            let row = self.store.update(kind, key, fields, mode).await?;
            return Ok(EntityWrite {
                id: row.id,
                created: false,
            });
        }

        match self.store.insert(kind, key, fields).await {
            Ok(row) => Ok(EntityWrite {
                id: row.id,
                created: true,
            }),
            Err(ArchiveError::Conflict { .. }) => {
                debug!(%kind, key, "Insert lost a race, updating instead");
                let row = self.store.update(kind, key, fields, mode).await?;
                Ok(EntityWrite {
                    id: row.id,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn upsert_artifact(&self, artifact: &Artifact) -> Result<ArtifactWrite> {
        let hash = content_hash(&artifact.bytes);

        if let Some(existing) = self.store.find_artifact(&hash).await? {
            return Ok(ArtifactWrite {
                id: existing.id,
                content_hash: hash,
                deduplicated: true,
            });
        }

        match self.store.insert_artifact(&hash, artifact).await? {
            Some(row) => Ok(ArtifactWrite {
                id: row.id,
                content_hash: hash,
                deduplicated: false,
            }),
            // Stored concurrently between our lookup and insert.
            None => {
                let row = self
                    .store
                    .find_artifact(&hash)
                    .await?
                    .ok_or_else(|| ArchiveError::NotFound(format!("artifact {hash}")))?;
                Ok(ArtifactWrite {
                    id: row.id,
                    content_hash: hash,
                    deduplicated: true,
                })
            }
        }
    }

    /// Persist a batch. Per-item failures are counted in the report and
    /// never abort the batch; a systemic failure (backend unreachable)
    /// aborts it with `ArchiveError::Unavailable` carrying the counts so far.
    ///
    /// Requests for the same key run in submission order; distinct keys may
    /// run concurrently up to the configured concurrency. An item's artifact
    /// is written only after its entity was.
    pub async fn save_many(
        &self,
        batch: Vec<SaveRequest>,
        cancelled: &AtomicBool,
    ) -> Result<BatchReport> {
        let total = batch.len() as u32;
        let halted = AtomicBool::new(false);
        let halted = &halted;

        let mut outcomes = stream::iter(group_by_key(batch))
            .map(|group| async move { self.save_group(group, cancelled, halted).await })
            .buffer_unordered(self.concurrency);

        let mut report = BatchReport::default();
        let mut systemic = None;
        while let Some((partial, error)) = outcomes.next().await {
            report.merge(partial);
            if systemic.is_none() {
                systemic = error;
            }
        }
        report.skipped = total.saturating_sub(report.processed());

        match systemic {
            Some(source) => {
                warn!(error = %source, %report, "Batch aborted, backend unavailable");
                Err(ArchiveError::Unavailable {
                    report,
                    source: Box::new(source),
                })
            }
            None => {
                info!(%report, "Batch saved");
                Ok(report)
            }
        }
    }

    async fn save_group(
        &self,
        group: Vec<SaveRequest>,
        cancelled: &AtomicBool,
        halted: &AtomicBool,
    ) -> (BatchReport, Option<ArchiveError>) {
        let mut report = BatchReport::default();

        for request in group {
            if halted.load(Ordering::Relaxed) {
                break;
            }
            if cancelled.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }

            if let Err(e) = self.save_one(&request, &mut report).await {
                if e.is_systemic() {
                    halted.store(true, Ordering::Relaxed);
                    return (report, Some(e));
                }
                warn!(key = request.key.as_str(), error = %e, "Failed to save item");
                report.record_failure(&request.key, &e);
            }

            if !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
        }

        (report, None)
    }

    /// Entity first, then its artifact. An artifact failure is counted
    /// separately and leaves the entity result standing.
    async fn save_one(&self, request: &SaveRequest, report: &mut BatchReport) -> Result<()> {
        let write = self
            .upsert_entity(request.kind, &request.key, &request.fields)
            .await?;
        if write.created {
            report.created += 1;
        } else {
            report.updated += 1;
        }

        let Some(ref artifact) = request.artifact else {
            return Ok(());
        };
        match self.upsert_artifact(artifact).await {
            Ok(a) if a.deduplicated => report.artifacts_deduplicated += 1,
            Ok(_) => report.artifacts_stored += 1,
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                warn!(key = request.key.as_str(), error = %e, "Failed to save artifact");
                report.artifacts_failed += 1;
            }
        }
        Ok(())
    }
}
