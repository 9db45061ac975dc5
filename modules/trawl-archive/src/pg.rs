// Postgres backend for the gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use trawl_common::{Artifact, EntityKind, Fields, WriteMode};

use crate::error::{ArchiveError, Result};
use crate::store::{EntityStore, StoredArtifact, StoredEntity};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// A row from the harvested_entities table.
#[derive(Debug, sqlx::FromRow)]
struct EntityRow {
    id: Uuid,
    kind: String,
    natural_key: String,
    fields: Json<Fields>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl TryFrom<EntityRow> for StoredEntity {
    type Error = ArchiveError;

    fn try_from(row: EntityRow) -> Result<Self> {
        let kind = row
            .kind
            .parse::<EntityKind>()
            .map_err(|e| ArchiveError::Database(sqlx::Error::Decode(e.into())))?;
        Ok(StoredEntity {
            id: row.id,
            kind,
            natural_key: row.natural_key,
            fields: row.fields.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_seen_at: row.last_seen_at,
        })
    }
}

/// A row from the artifacts table, without the bytes.
#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    content_hash: String,
    byte_size: i64,
    width: Option<i32>,
    height: Option<i32>,
    format: Option<String>,
    source_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ArtifactRow> for StoredArtifact {
    fn from(row: ArtifactRow) -> Self {
        StoredArtifact {
            id: row.id,
            content_hash: row.content_hash,
            byte_size: row.byte_size,
            width: row.width.and_then(|w| u32::try_from(w).ok()),
            height: row.height.and_then(|h| u32::try_from(h).ok()),
            format: row.format,
            source_key: row.source_key,
            created_at: row.created_at,
        }
    }
}

const ENTITY_COLUMNS: &str =
    "id, kind, natural_key, fields, created_at, updated_at, last_seen_at";
const ARTIFACT_COLUMNS: &str =
    "id, content_hash, byte_size, width, height, format, source_key, created_at";

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ArchiveError::Database(e.into()))?;
        Ok(())
    }

    /// Stored artifact bytes by content hash.
    pub async fn artifact_bytes(&self, content_hash: &str) -> Result<Option<Vec<u8>>> {
        let bytes = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT bytes FROM artifacts WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bytes)
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find_by_key(&self, kind: EntityKind, key: &str) -> Result<Option<StoredEntity>> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM harvested_entities WHERE kind = $1 AND natural_key = $2"
        ))
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredEntity::try_from).transpose()
    }

    async fn insert(&self, kind: EntityKind, key: &str, fields: &Fields) -> Result<StoredEntity> {
        // DO NOTHING + RETURNING yields no row on a key collision.
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            r#"
            INSERT INTO harvested_entities (id, kind, natural_key, fields)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, natural_key) DO NOTHING
            RETURNING {ENTITY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(kind.as_str())
        .bind(key)
        .bind(Json(fields))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ArchiveError::Conflict {
                kind,
                key: key.to_string(),
            }),
        }
    }

    async fn update(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &Fields,
        mode: WriteMode,
    ) -> Result<StoredEntity> {
        let merge = mode == WriteMode::Upsert;
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            r#"
            UPDATE harvested_entities
            SET fields       = CASE WHEN $3 THEN fields || $4 ELSE fields END,
                updated_at   = CASE WHEN $3 THEN now() ELSE updated_at END,
                last_seen_at = GREATEST(now(), last_seen_at + interval '1 microsecond')
            WHERE kind = $1 AND natural_key = $2
            RETURNING {ENTITY_COLUMNS}
            "#
        ))
        .bind(kind.as_str())
        .bind(key)
        .bind(merge)
        .bind(Json(fields))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ArchiveError::NotFound(format!("{kind} {key}"))),
        }
    }

    async fn find_artifact(&self, content_hash: &str) -> Result<Option<StoredArtifact>> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE content_hash = $1"
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredArtifact::from))
    }

    async fn insert_artifact(
        &self,
        content_hash: &str,
        artifact: &Artifact,
    ) -> Result<Option<StoredArtifact>> {
        let meta = &artifact.meta;
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            r#"
            INSERT INTO artifacts
                (id, content_hash, bytes, byte_size, width, height, format, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (content_hash) DO NOTHING
            RETURNING {ARTIFACT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(content_hash)
        .bind(&artifact.bytes)
        .bind(artifact.bytes.len() as i64)
        .bind(meta.width.and_then(|w| i32::try_from(w).ok()))
        .bind(meta.height.and_then(|h| i32::try_from(h).ok()))
        .bind(&meta.format)
        .bind(&meta.source_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredArtifact::from))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
