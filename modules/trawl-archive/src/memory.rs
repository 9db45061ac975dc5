// In-process backend. Used when no DATABASE_URL is configured, and by tests.
//
// Mirrors the Postgres semantics: (kind, key) uniqueness, jsonb-style shallow
// merge on upsert, strictly increasing last_seen_at, one artifact per hash.
// Two fault knobs let tests exercise the gateway's failure accounting:
// rejected keys (per-item failures) and an outage after N writes.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use trawl_common::{Artifact, EntityKind, Fields, WriteMode};

use crate::error::{ArchiveError, Result};
use crate::store::{next_seen_at, EntityStore, StoredArtifact, StoredEntity};

#[derive(Default)]
struct MemoryState {
    entities: HashMap<(EntityKind, String), StoredEntity>,
    artifacts: HashMap<String, (StoredArtifact, Vec<u8>)>,
    rejected: HashSet<String>,
    writes: usize,
    outage_after: Option<usize>,
}

impl MemoryState {
    fn check_available(&self) -> Result<()> {
        match self.outage_after {
            Some(limit) if self.writes >= limit => Err(ArchiveError::Unreachable(format!(
                "memory store down after {limit} writes"
            ))),
            _ => Ok(()),
        }
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        self.check_available()?;
        if self.rejected.contains(key) {
            return Err(ArchiveError::Rejected {
                key: key.to_string(),
                reason: "rejected by memory store".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write touching `key` (entity key or artifact source key) fails
    /// with `Rejected`.
    pub async fn reject_key(&self, key: impl Into<String>) {
        self.state.lock().await.rejected.insert(key.into());
    }

    /// After `writes` successful writes, every call fails with `Unreachable`.
    pub async fn go_down_after(&self, writes: usize) {
        self.state.lock().await.outage_after = Some(writes);
    }

    pub async fn entity_count(&self, kind: EntityKind) -> usize {
        self.state
            .lock()
            .await
            .entities
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub async fn artifact_count(&self) -> usize {
        self.state.lock().await.artifacts.len()
    }

    pub async fn artifact_bytes(&self, content_hash: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .artifacts
            .get(content_hash)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_key(&self, kind: EntityKind, key: &str) -> Result<Option<StoredEntity>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.entities.get(&(kind, key.to_string())).cloned())
    }

    async fn insert(&self, kind: EntityKind, key: &str, fields: &Fields) -> Result<StoredEntity> {
        let mut state = self.state.lock().await;
        state.check_writable(key)?;

        let slot = (kind, key.to_string());
        if state.entities.contains_key(&slot) {
            return Err(ArchiveError::Conflict {
                kind,
                key: key.to_string(),
            });
        }

        let now = Utc::now();
        let entity = StoredEntity {
            id: Uuid::new_v4(),
            kind,
            natural_key: key.to_string(),
            fields: fields.clone(),
            created_at: now,
            updated_at: now,
            last_seen_at: now,
        };
        state.entities.insert(slot, entity.clone());
        state.writes += 1;
        Ok(entity)
    }

    async fn update(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &Fields,
        mode: WriteMode,
    ) -> Result<StoredEntity> {
        let mut state = self.state.lock().await;
        state.check_writable(key)?;

        let now = Utc::now();
        let entity = state
            .entities
            .get_mut(&(kind, key.to_string()))
            .ok_or_else(|| ArchiveError::NotFound(format!("{kind} {key}")))?;

        if mode == WriteMode::Upsert {
            for (name, value) in fields {
                entity.fields.insert(name.clone(), value.clone());
            }
            entity.updated_at = now;
        }
        entity.last_seen_at = next_seen_at(entity.last_seen_at, now);

        let entity = entity.clone();
        state.writes += 1;
        Ok(entity)
    }

    async fn find_artifact(&self, content_hash: &str) -> Result<Option<StoredArtifact>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .artifacts
            .get(content_hash)
            .map(|(artifact, _)| artifact.clone()))
    }

    async fn insert_artifact(
        &self,
        content_hash: &str,
        artifact: &Artifact,
    ) -> Result<Option<StoredArtifact>> {
        let mut state = self.state.lock().await;
        match artifact.meta.source_key.as_deref() {
            Some(key) => state.check_writable(key)?,
            None => state.check_available()?,
        }

        if state.artifacts.contains_key(content_hash) {
            return Ok(None);
        }

        let stored = StoredArtifact {
            id: Uuid::new_v4(),
            content_hash: content_hash.to_string(),
            byte_size: artifact.bytes.len() as i64,
            width: artifact.meta.width,
            height: artifact.meta.height,
            format: artifact.meta.format.clone(),
            source_key: artifact.meta.source_key.clone(),
            created_at: Utc::now(),
        };
        state.artifacts.insert(
            content_hash.to_string(),
            (stored.clone(), artifact.bytes.clone()),
        );
        state.writes += 1;
        Ok(Some(stored))
    }

    async fn ping(&self) -> Result<()> {
        self.state.lock().await.check_available()
    }
}
