//! Harvests over simulated lists, persisted through the in-memory store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use simlist::{synthetic_following, synthetic_timeline, VirtualList};
use trawl_archive::{ArchiveError, EntityStore, Gateway, MemoryStore};
use trawl_collector::{ScrollPolicy, Viewport};
use trawl_common::{EntityKind, FileConfig, UserCell, UserProfile};
use trawl_scout::Harvester;

fn harvester(store: Arc<MemoryStore>, config: FileConfig) -> Harvester {
    let gateway = Gateway::new(store).with_throttle(Duration::ZERO);
    Harvester::new(gateway, config).with_scroll(ScrollPolicy::immediate())
}

/// Raises `cancelled` on its `after`th read, as an interrupt mid-run would.
struct InterruptedList {
    inner: VirtualList<UserCell>,
    after: u32,
    reads: AtomicU32,
    cancelled: Arc<AtomicBool>,
}

impl InterruptedList {
    fn new(count: usize, after: u32, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            inner: VirtualList::new("following", synthetic_following(count)),
            after,
            reads: AtomicU32::new(0),
            cancelled,
        }
    }
}

#[async_trait]
impl Viewport for InterruptedList {
    type Unit = UserCell;

    async fn visible_units(&self) -> anyhow::Result<Vec<UserCell>> {
        if self.reads.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.cancelled.store(true, Ordering::Relaxed);
        }
        self.inner.visible_units().await
    }

    async fn scroll_by(&self, fraction: f64) -> anyhow::Result<()> {
        self.inner.scroll_by(fraction).await
    }
}

#[tokio::test]
async fn following_harvest_persists_every_account() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);
    let list = VirtualList::new("following", synthetic_following(60));

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    assert_eq!(report.stop, "converged");
    assert_eq!(report.collected, 60);
    assert!(!report.is_partial());
    let batch = report.batch.as_ref().unwrap();
    assert_eq!(batch.created, 60);
    assert_eq!(batch.updated, 0);
    assert_eq!(store.entity_count(EntityKind::User).await, 60);

    let stored = store
        .find_by_key(EntityKind::User, "user0007")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["display_name"], "User 7");
    assert!(stored.fields.contains_key("last_scraped_at"));
}

#[tokio::test]
async fn second_harvest_updates_instead_of_duplicating() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);

    let first = VirtualList::new("following", synthetic_following(30));
    harvester
        .harvest_following("alice", &first, &cancelled)
        .await
        .unwrap();
    let before = store
        .find_by_key(EntityKind::User, "user0003")
        .await
        .unwrap()
        .unwrap();

    let second = VirtualList::new("following", synthetic_following(35));
    let report = harvester
        .harvest_following("alice", &second, &cancelled)
        .await
        .unwrap();

    let batch = report.batch.unwrap();
    assert_eq!(batch.created, 5);
    assert_eq!(batch.updated, 30);
    assert_eq!(store.entity_count(EntityKind::User).await, 35);

    let after = store
        .find_by_key(EntityKind::User, "user0003")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert!(after.last_seen_at > before.last_seen_at);
}

#[tokio::test]
async fn timeline_is_capped_and_stored_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);
    let now = Utc::now();
    let list = VirtualList::new("timeline", synthetic_timeline("alice", 40, now)).with_capture();

    let report = harvester
        .harvest_timeline("alice", &list, &cancelled)
        .await
        .unwrap();

    assert_eq!(report.stop, "item_cap");
    assert_eq!(report.keys.len(), 10);
    assert_eq!(
        report.keys.last().map(String::as_str),
        Some(format!("{}alice", now.timestamp_millis()).as_str())
    );

    let batch = report.batch.unwrap();
    assert_eq!(batch.created, 10);
    assert_eq!(batch.artifacts_stored, 10);
    assert_eq!(store.entity_count(EntityKind::ContentItem).await, 10);
    assert_eq!(store.artifact_count().await, 10);
}

#[tokio::test]
async fn repeated_timeline_harvest_deduplicates_artifacts() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);
    let now = Utc::now();

    for _ in 0..2 {
        let list =
            VirtualList::new("timeline", synthetic_timeline("alice", 40, now)).with_capture();
        harvester
            .harvest_timeline("alice", &list, &cancelled)
            .await
            .unwrap();
    }

    let list = VirtualList::new("timeline", synthetic_timeline("alice", 40, now)).with_capture();
    let report = harvester
        .harvest_timeline("alice", &list, &cancelled)
        .await
        .unwrap();

    let batch = report.batch.unwrap();
    assert_eq!(batch.created, 0);
    assert_eq!(batch.updated, 10);
    assert_eq!(batch.artifacts_deduplicated, 10);
    assert_eq!(store.artifact_count().await, 10);
}

#[tokio::test]
async fn partial_collection_is_still_persisted() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);
    let list = VirtualList::new("following", synthetic_following(60)).fail_scroll_at(3);

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    assert!(report.is_partial());
    assert!(report.collect_error.is_some());
    assert!(report.collected > 0 && report.collected < 60);
    assert_eq!(report.batch.unwrap().created as usize, report.collected);
    assert_eq!(
        store.entity_count(EntityKind::User).await,
        report.collected
    );
}

#[tokio::test]
async fn partial_collection_can_skip_persistence() {
    let store = Arc::new(MemoryStore::new());
    let mut config = FileConfig::default();
    config.persistence.persist_partial = false;
    let harvester = harvester(store.clone(), config);
    let cancelled = AtomicBool::new(false);
    let list = VirtualList::new("following", synthetic_following(60)).fail_scroll_at(3);

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    assert!(report.collect_error.is_some());
    assert!(report.batch.is_none());
    assert_eq!(store.entity_count(EntityKind::User).await, 0);
}

#[tokio::test]
async fn backend_outage_fails_the_harvest_with_partial_counts() {
    let store = Arc::new(MemoryStore::new());
    store.go_down_after(5).await;
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);
    let list = VirtualList::new("following", synthetic_following(20));

    let err = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap_err();

    match err.downcast_ref::<ArchiveError>() {
        Some(ArchiveError::Unavailable { report, .. }) => {
            assert_eq!(report.created, 5);
            assert_eq!(report.skipped, 15);
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn harvest_cancelled_before_start_saves_nothing() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(true);
    let list = VirtualList::new("following", synthetic_following(20));

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    assert_eq!(report.stop, "cancelled");
    assert!(report.is_partial());
    assert_eq!(store.entity_count(EntityKind::User).await, 0);
}

#[tokio::test]
async fn harvest_cancelled_midway_persists_what_was_gathered() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = Arc::new(AtomicBool::new(false));
    let list = InterruptedList::new(60, 3, cancelled.clone());

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    assert_eq!(report.stop, "cancelled");
    assert_eq!(report.passes, 3);
    assert!(report.is_partial());
    assert!(report.collect_error.is_none());
    assert!(report.collected > 0 && report.collected < 60);

    let batch = report.batch.unwrap();
    assert!(!batch.cancelled);
    assert_eq!(batch.skipped, 0);
    assert_eq!(batch.created as usize, report.collected);
    assert_eq!(
        store.entity_count(EntityKind::User).await,
        report.collected
    );
}

#[tokio::test]
async fn harvest_cancelled_midway_skips_persistence_when_partial_is_off() {
    let store = Arc::new(MemoryStore::new());
    let mut config = FileConfig::default();
    config.persistence.persist_partial = false;
    let harvester = harvester(store.clone(), config);
    let cancelled = Arc::new(AtomicBool::new(false));
    let list = InterruptedList::new(60, 3, cancelled.clone());

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    assert_eq!(report.stop, "cancelled");
    assert!(report.collected > 0);
    assert!(report.batch.is_none());
    assert_eq!(store.entity_count(EntityKind::User).await, 0);
}

#[tokio::test]
async fn profile_merges_onto_harvested_user() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());
    let cancelled = AtomicBool::new(false);
    let list = VirtualList::new("following", synthetic_following(10));
    harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    let profile = UserProfile {
        bio: Some("Writes about rivers".into()),
        followers_count: Some(1200),
        ..Default::default()
    };
    let write = harvester.save_profile("/user0002", &profile).await.unwrap();
    assert!(!write.created);

    let stored = store
        .find_by_key(EntityKind::User, "user0002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, write.id);
    assert_eq!(stored.fields["display_name"], "User 2");
    assert_eq!(stored.fields["bio"], "Writes about rivers");
    assert_eq!(stored.fields["followers_count"], 1200);
}

#[tokio::test]
async fn profile_with_invalid_username_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store.clone(), FileConfig::default());

    let result = harvester
        .save_profile("/i/topics/9", &UserProfile::default())
        .await;

    assert!(result.is_err());
    assert_eq!(store.entity_count(EntityKind::User).await, 0);
}

#[tokio::test]
async fn run_log_is_written_per_harvest() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let harvester = harvester(store, FileConfig::default()).with_run_logs(dir.path());
    let cancelled = AtomicBool::new(false);
    let list = VirtualList::new("following", synthetic_following(15));

    let report = harvester
        .harvest_following("alice", &list, &cancelled)
        .await
        .unwrap();

    let path = report.run_log.clone().unwrap();
    assert!(path.starts_with(dir.path().join("trawl-runs").join("alice")));

    let log: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(log["run_id"], report.run_id.as_str());
    assert_eq!(log["summary"]["collected"], 15);
    let types: Vec<&str> = log["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, ["collect_started", "collect_finished", "batch_saved"]);
}
