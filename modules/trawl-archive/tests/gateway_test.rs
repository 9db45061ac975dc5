//! Gateway behaviour against the in-memory backend.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use trawl_archive::{
    content_hash, ArchiveError, EntityStore, Gateway, MemoryStore, SaveRequest, StoredArtifact,
    StoredEntity,
};
use trawl_common::{Artifact, EntityKind, Fields, WriteMode};

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("fields must be an object"),
    }
}

fn gateway(store: Arc<MemoryStore>) -> Gateway {
    Gateway::new(store).with_throttle(Duration::ZERO)
}

fn user(key: &str, value: serde_json::Value) -> SaveRequest {
    SaveRequest::new(EntityKind::User, key, fields(value))
}

/// Wraps a store to reproduce races and mid-batch events deterministically.
struct Scripted {
    inner: Arc<MemoryStore>,
    /// Entity lookups always miss, as if another writer inserted in between.
    blind_entities: bool,
    /// The next N artifact lookups miss.
    artifact_misses: AtomicU32,
    /// Raised after the first successful insert.
    cancel_on_insert: Option<Arc<AtomicBool>>,
}

impl Scripted {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            blind_entities: false,
            artifact_misses: AtomicU32::new(0),
            cancel_on_insert: None,
        }
    }
}

#[async_trait]
impl EntityStore for Scripted {
    async fn find_by_key(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> trawl_archive::Result<Option<StoredEntity>> {
        if self.blind_entities {
            return Ok(None);
        }
        self.inner.find_by_key(kind, key).await
    }

    async fn insert(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &Fields,
    ) -> trawl_archive::Result<StoredEntity> {
        let row = self.inner.insert(kind, key, fields).await?;
        if let Some(ref flag) = self.cancel_on_insert {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(row)
    }

    async fn update(
        &self,
        kind: EntityKind,
        key: &str,
        fields: &Fields,
        mode: WriteMode,
    ) -> trawl_archive::Result<StoredEntity> {
        self.inner.update(kind, key, fields, mode).await
    }

    async fn find_artifact(&self, hash: &str) -> trawl_archive::Result<Option<StoredArtifact>> {
        let missed = self
            .artifact_misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }
        self.inner.find_artifact(hash).await
    }

    async fn insert_artifact(
        &self,
        hash: &str,
        artifact: &Artifact,
    ) -> trawl_archive::Result<Option<StoredArtifact>> {
        self.inner.insert_artifact(hash, artifact).await
    }

    async fn ping(&self) -> trawl_archive::Result<()> {
        self.inner.ping().await
    }
}

// =========================================================================
// Entity upserts
// =========================================================================

#[tokio::test]
async fn repeated_upsert_keeps_one_row_and_advances_last_seen() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone());
    let data = fields(json!({"display_name": "Alice"}));

    let first = gw.upsert_entity(EntityKind::User, "alice", &data).await.unwrap();
    let seen_1 = store
        .find_by_key(EntityKind::User, "alice")
        .await
        .unwrap()
        .unwrap()
        .last_seen_at;
    let second = gw.upsert_entity(EntityKind::User, "alice", &data).await.unwrap();
    let row = store
        .find_by_key(EntityKind::User, "alice")
        .await
        .unwrap()
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);
    assert_eq!(store.entity_count(EntityKind::User).await, 1);
    assert!(row.last_seen_at > seen_1);
    assert_eq!(row.fields, data);
}

#[tokio::test]
async fn upsert_merges_without_dropping_unsupplied_fields() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone());

    gw.upsert_entity(
        EntityKind::User,
        "alice",
        &fields(json!({"display_name": "Alice", "bio": "hi"})),
    )
    .await
    .unwrap();
    gw.upsert_entity(
        EntityKind::User,
        "alice",
        &fields(json!({"display_name": "Alice B", "followers_count": 12})),
    )
    .await
    .unwrap();

    let row = store
        .find_by_key(EntityKind::User, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        row.fields,
        fields(json!({"display_name": "Alice B", "bio": "hi", "followers_count": 12}))
    );
}

#[tokio::test]
async fn content_items_keep_first_stored_fields() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone());

    gw.upsert_entity(EntityKind::ContentItem, "1700000000000bob", &fields(json!({"content": "first"})))
        .await
        .unwrap();
    let before = store
        .find_by_key(EntityKind::ContentItem, "1700000000000bob")
        .await
        .unwrap()
        .unwrap();

    let write = gw
        .upsert_entity(EntityKind::ContentItem, "1700000000000bob", &fields(json!({"content": "edited"})))
        .await
        .unwrap();
    let after = store
        .find_by_key(EntityKind::ContentItem, "1700000000000bob")
        .await
        .unwrap()
        .unwrap();

    assert!(!write.created);
    assert_eq!(after.fields["content"], "first");
    assert_eq!(after.updated_at, before.updated_at);
    assert!(after.last_seen_at > before.last_seen_at);
}

#[tokio::test]
async fn distinct_keys_do_not_interfere() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone());

    gw.upsert_entity(EntityKind::User, "alice", &fields(json!({"bio": "a"})))
        .await
        .unwrap();
    gw.upsert_entity(EntityKind::User, "bob", &fields(json!({"bio": "b"})))
        .await
        .unwrap();
    // Same natural key under another kind is a different entity.
    gw.upsert_entity(EntityKind::ContentItem, "alice", &fields(json!({"content": "c"})))
        .await
        .unwrap();

    let alice = store
        .find_by_key(EntityKind::User, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.fields, fields(json!({"bio": "a"})));
    assert_eq!(store.entity_count(EntityKind::User).await, 2);
    assert_eq!(store.entity_count(EntityKind::ContentItem).await, 1);
}

#[tokio::test]
async fn lost_insert_race_falls_back_to_update() {
    let inner = Arc::new(MemoryStore::new());
    inner
        .insert(EntityKind::User, "alice", &fields(json!({"bio": "old"})))
        .await
        .unwrap();

    let scripted = Scripted {
        blind_entities: true,
        ..Scripted::new(inner.clone())
    };
    let gw = Gateway::new(Arc::new(scripted)).with_throttle(Duration::ZERO);

    let write = gw
        .upsert_entity(EntityKind::User, "alice", &fields(json!({"bio": "new"})))
        .await
        .unwrap();

    assert!(!write.created);
    assert_eq!(inner.entity_count(EntityKind::User).await, 1);
    let row = inner
        .find_by_key(EntityKind::User, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.fields["bio"], "new");
}

// =========================================================================
// Artifacts
// =========================================================================

#[tokio::test]
async fn identical_bytes_are_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone());
    let shot = Artifact::new(b"png-bytes".to_vec())
        .with_format("png")
        .with_dimensions(600, 200);

    let first = gw.upsert_artifact(&shot).await.unwrap();
    let second = gw.upsert_artifact(&shot).await.unwrap();

    assert!(!first.deduplicated);
    assert!(second.deduplicated);
    assert_eq!(first.id, second.id);
    assert_eq!(first.content_hash, content_hash(b"png-bytes"));
    assert_eq!(store.artifact_count().await, 1);

    let stored = store.find_artifact(&first.content_hash).await.unwrap().unwrap();
    assert_eq!(stored.byte_size, 9);
    assert_eq!((stored.width, stored.height), (Some(600), Some(200)));

    let other = gw
        .upsert_artifact(&Artifact::new(b"other".to_vec()))
        .await
        .unwrap();
    assert!(!other.deduplicated);
    assert_ne!(other.id, first.id);
    assert_eq!(store.artifact_count().await, 2);
}

#[tokio::test]
async fn artifact_stored_concurrently_is_reported_as_duplicate() {
    let inner = Arc::new(MemoryStore::new());
    let shot = Artifact::new(b"same".to_vec());
    let existing = inner
        .insert_artifact(&content_hash(b"same"), &shot)
        .await
        .unwrap()
        .unwrap();

    let scripted = Scripted::new(inner.clone());
    scripted.artifact_misses.store(1, Ordering::SeqCst);
    let gw = Gateway::new(Arc::new(scripted)).with_throttle(Duration::ZERO);

    let write = gw.upsert_artifact(&shot).await.unwrap();
    assert!(write.deduplicated);
    assert_eq!(write.id, existing.id);
    assert_eq!(inner.artifact_count().await, 1);
}

// =========================================================================
// Batches
// =========================================================================

#[tokio::test]
async fn batch_counts_per_item_outcomes() {
    let store = Arc::new(MemoryStore::new());
    store.reject_key("bob").await;
    let gw = gateway(store.clone());
    let cancelled = AtomicBool::new(false);

    let report = gw
        .save_many(
            vec![
                user("alice", json!({})),
                user("bob", json!({})),
                user("carol", json!({})),
                user("alice", json!({"bio": "again"})),
            ],
            &cancelled,
        )
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "bob");
    assert!(!report.cancelled);
}

#[tokio::test]
async fn artifact_follows_its_entity() {
    let store = Arc::new(MemoryStore::new());
    store.reject_key("bob").await;
    store.reject_key("bad-shot").await;
    let gw = gateway(store.clone());
    let cancelled = AtomicBool::new(false);

    let report = gw
        .save_many(
            vec![
                // Entity fails: its artifact is never attempted.
                user("bob", json!({})).with_artifact(Some(Artifact::new(b"bob".to_vec()))),
                // Artifact fails: the entity still counts as saved.
                user("carol", json!({})).with_artifact(Some(
                    Artifact::new(b"carol".to_vec()).with_source_key("bad-shot"),
                )),
                user("dave", json!({})).with_artifact(Some(Artifact::new(b"dup".to_vec()))),
                user("erin", json!({})).with_artifact(Some(Artifact::new(b"dup".to_vec()))),
            ],
            &cancelled,
        )
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.created, 3);
    assert_eq!(report.artifacts_failed, 1);
    assert_eq!(report.artifacts_stored, 1);
    assert_eq!(report.artifacts_deduplicated, 1);
    assert_eq!(store.artifact_count().await, 1);
    assert!(store.artifact_bytes(&content_hash(b"bob")).await.is_none());
}

#[tokio::test]
async fn same_key_writes_apply_in_order_under_concurrency() {
    let store = Arc::new(MemoryStore::new());
    let gw = gateway(store.clone()).with_concurrency(4);
    let cancelled = AtomicBool::new(false);

    let report = gw
        .save_many(
            vec![
                user("alice", json!({"v": 1})),
                user("bob", json!({"v": 1})),
                user("alice", json!({"v": 2})),
                user("carol", json!({"v": 1})),
                user("alice", json!({"v": 3})),
            ],
            &cancelled,
        )
        .await
        .unwrap();

    assert_eq!(report.created, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(store.entity_count(EntityKind::User).await, 3);
    let alice = store
        .find_by_key(EntityKind::User, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.fields["v"], 3);
}

#[tokio::test]
async fn identical_artifacts_of_distinct_keys_dedup_under_concurrency() {
    let inner = Arc::new(MemoryStore::new());
    let scripted = Scripted::new(inner.clone());
    // Both lookups miss, so the second writer only learns of the first
    // through the insert and has to look the row up again.
    scripted.artifact_misses.store(2, Ordering::SeqCst);
    let gw = Gateway::new(Arc::new(scripted))
        .with_throttle(Duration::ZERO)
        .with_concurrency(2);
    let cancelled = AtomicBool::new(false);

    let shot = |key: &str| Artifact::new(b"same avatar".to_vec()).with_source_key(key);
    let report = gw
        .save_many(
            vec![
                user("alice", json!({})).with_artifact(Some(shot("alice"))),
                user("bob", json!({})).with_artifact(Some(shot("bob"))),
            ],
            &cancelled,
        )
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.artifacts_stored, 1);
    assert_eq!(report.artifacts_deduplicated, 1);
    assert_eq!(report.artifacts_failed, 0);
    assert_eq!(inner.artifact_count().await, 1);
    assert_eq!(
        inner.artifact_bytes(&content_hash(b"same avatar")).await,
        Some(b"same avatar".to_vec())
    );
}

#[tokio::test]
async fn outage_aborts_batch_with_partial_counts() {
    let store = Arc::new(MemoryStore::new());
    store.go_down_after(2).await;
    let gw = gateway(store.clone());
    let cancelled = AtomicBool::new(false);

    let batch = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|k| user(k, json!({})))
        .collect();
    let err = gw.save_many(batch, &cancelled).await.unwrap_err();

    let (report, source) = match err {
        ArchiveError::Unavailable { report, source } => (report, source),
        other => panic!("expected Unavailable, got {other:?}"),
    };
    assert!(matches!(*source, ArchiveError::Unreachable(_)));
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 3);
}

#[tokio::test]
async fn cancellation_between_items_keeps_partial_report() {
    let inner = Arc::new(MemoryStore::new());
    let cancelled = Arc::new(AtomicBool::new(false));
    let scripted = Scripted {
        cancel_on_insert: Some(cancelled.clone()),
        ..Scripted::new(inner.clone())
    };
    let gw = Gateway::new(Arc::new(scripted)).with_throttle(Duration::ZERO);

    let report = gw
        .save_many(
            vec![user("a", json!({})), user("b", json!({})), user("c", json!({}))],
            &cancelled,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(inner.entity_count(EntityKind::User).await, 1);
}

#[tokio::test]
async fn ping_reports_outage() {
    let store = Arc::new(MemoryStore::new());
    assert!(store.ping().await.is_ok());
    store.go_down_after(0).await;
    let err = store.ping().await.unwrap_err();
    assert!(err.is_systemic());
}
