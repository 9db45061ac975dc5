// Storage capability behind the persistence gateway.
//
// Backends enforce natural-key uniqueness themselves: `insert` on an existing
// (kind, key) fails with `ArchiveError::Conflict` and `insert_artifact` on an
// existing hash writes nothing. The gateway builds idempotent upserts out of
// these primitives; nothing else writes storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use trawl_common::{Artifact, EntityKind, Fields, WriteMode};

use crate::error::Result;

/// A persisted user or content item.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub natural_key: String,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Strictly increases with every successful write for the key.
    pub last_seen_at: DateTime<Utc>,
}

/// Artifact metadata as stored. Bytes stay in the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub id: Uuid,
    pub content_hash: String,
    pub byte_size: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub source_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_by_key(&self, kind: EntityKind, key: &str) -> Result<Option<StoredEntity>>;

    /// Insert a new row. Fails with `Conflict` when the key already exists.
    async fn insert(&self, kind: EntityKind, key: &str, fields: &Fields) -> Result<StoredEntity>;

    /// Refresh an existing row. Under `WriteMode::Upsert` the supplied fields
    /// are merged over the stored ones; under `InsertOnly` only
    /// `last_seen_at` moves. Fails with `NotFound` when the key is absent.
    async fn update(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &Fields,
        mode: WriteMode,
    ) -> Result<StoredEntity>;

    async fn find_artifact(&self, content_hash: &str) -> Result<Option<StoredArtifact>>;

    /// Insert an artifact under `content_hash`. Returns `None`, writing
    /// nothing, when the hash is already stored.
    async fn insert_artifact(
        &self,
        content_hash: &str,
        artifact: &Artifact,
    ) -> Result<Option<StoredArtifact>>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<()>;
}

/// Next `last_seen_at` for a row last seen at `previous`: now, or one
/// microsecond past `previous` when the clock hasn't moved far enough.
pub(crate) fn next_seen_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous + chrono::Duration::microseconds(1))
}
