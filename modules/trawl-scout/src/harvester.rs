//! Harvester: walks one account's list with the collector and hands the
//! result to the persistence gateway.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use trawl_archive::{ArchiveError, EntityWrite, Gateway, SaveRequest};
use trawl_collector::extractors::username_from_href;
use trawl_collector::{
    CollectConfig, CollectedItem, Collector, Extractor, ScrollPolicy, StopReason,
    TweetCardExtractor, UserCellExtractor, Viewport,
};
use trawl_common::{EntityKind, FileConfig, ListConfig, TweetCard, UserCell, UserProfile};

use crate::report::HarvestReport;
use crate::run_log::{EventKind, RunLog};

pub struct Harvester {
    gateway: Gateway,
    config: FileConfig,
    scroll: Option<ScrollPolicy>,
    data_dir: Option<PathBuf>,
}

impl Harvester {
    pub fn new(gateway: Gateway, config: FileConfig) -> Self {
        Self {
            gateway,
            config,
            scroll: None,
            data_dir: None,
        }
    }

    /// Replace the configured scroll policy (e.g. zero delays for replays).
    pub fn with_scroll(mut self, scroll: ScrollPolicy) -> Self {
        self.scroll = Some(scroll);
        self
    }

    /// Save a run log per harvest under `{data_dir}/trawl-runs/`.
    pub fn with_run_logs(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Collect the accounts `owner` follows and upsert each as a user.
    pub async fn harvest_following<V>(
        &self,
        owner: &str,
        viewport: &V,
        cancelled: &AtomicBool,
    ) -> Result<HarvestReport>
    where
        V: Viewport<Unit = UserCell>,
    {
        let scraped_at = Utc::now();
        self.harvest(
            owner,
            "following",
            &self.config.following,
            viewport,
            &UserCellExtractor,
            cancelled,
            |items| following_requests(items, scraped_at),
        )
        .await
    }

    /// Collect the newest timeline items of `author` and store them
    /// oldest-first, each with its screenshot when one was captured.
    pub async fn harvest_timeline<V>(
        &self,
        author: &str,
        viewport: &V,
        cancelled: &AtomicBool,
    ) -> Result<HarvestReport>
    where
        V: Viewport<Unit = TweetCard>,
    {
        let scraped_at = Utc::now();
        self.harvest(
            author,
            "timeline",
            &self.config.timeline,
            viewport,
            &TweetCardExtractor,
            cancelled,
            |items| timeline_requests(items, scraped_at),
        )
        .await
    }

    /// Merge profile page data onto the user row. Fields the profile does
    /// not carry keep their stored values.
    pub async fn save_profile(&self, username: &str, profile: &UserProfile) -> Result<EntityWrite> {
        let Some(username) = username_from_href(username) else {
            bail!("Invalid username: {username:?}");
        };

        let mut fields = profile.to_fields();
        fields.insert("last_scraped_at".into(), Utc::now().to_rfc3339().into());

        let write = self
            .gateway
            .upsert_entity(EntityKind::User, username, &fields)
            .await
            .with_context(|| format!("Failed to save profile of {username}"))?;
        info!(username, created = write.created, "Profile saved");
        Ok(write)
    }

    #[allow(clippy::too_many_arguments)]
    async fn harvest<V, E, F>(
        &self,
        target: &str,
        list: &str,
        limits: &ListConfig,
        viewport: &V,
        extractor: &E,
        cancelled: &AtomicBool,
        to_requests: F,
    ) -> Result<HarvestReport>
    where
        V: Viewport,
        E: Extractor<V::Unit>,
        F: FnOnce(Vec<CollectedItem>) -> Vec<SaveRequest>,
    {
        let run_id = Uuid::new_v4().to_string();
        let mut log = RunLog::new(run_id.clone(), target.to_string());

        let mut collect_config =
            CollectConfig::from_config(limits, &self.config.scroll, &self.config.retry);
        if let Some(ref scroll) = self.scroll {
            collect_config = collect_config.with_scroll(scroll.clone());
        }
        log.log(EventKind::CollectStarted {
            list: list.to_string(),
            max_passes: collect_config.max_passes,
            max_items: collect_config.max_items,
            max_consecutive_empty_passes: collect_config.max_consecutive_empty_passes,
        });
        info!(account = target, list, run_id = run_id.as_str(), "Harvest starting");

        let outcome = Collector::new(collect_config)
            .collect(viewport, extractor, cancelled)
            .await;
        log.log(EventKind::collect_finished(&outcome));

        let collect_error = outcome.error.as_ref().map(|e| e.to_string());
        if let Some(ref error) = collect_error {
            warn!(
                account = target,
                list,
                error = error.as_str(),
                "Collection ended early, results are partial"
            );
            log.log(EventKind::CollectFailed {
                error: error.clone(),
                collected: outcome.items.len(),
            });
        }

        let collection_cancelled = outcome.stop == StopReason::Cancelled;
        let stop = outcome.stop.to_string();
        let passes = outcome.state.passes_completed;
        let collected = outcome.items.len();
        let requests = to_requests(outcome.items.into_items());

        let mut report = HarvestReport {
            run_id,
            target: target.to_string(),
            list: list.to_string(),
            stop,
            passes,
            collected,
            keys: requests.iter().map(|r| r.key.clone()).collect(),
            collect_error,
            batch: None,
            run_log: None,
        };

        let partial = report.collect_error.is_some() || collection_cancelled;
        // A flag raised during collection must not also discard what was
        // gathered; the batch then runs under its own flag.
        let batch_cancelled = AtomicBool::new(false);
        let batch_flag = if collection_cancelled {
            &batch_cancelled
        } else {
            cancelled
        };

        let persisted = if partial && !self.config.persistence.persist_partial {
            log.log(EventKind::PersistSkipped {
                reason: format!(
                    "partial collection ({}) and persist_partial is off",
                    report.stop
                ),
            });
            Ok(())
        } else {
            match self.gateway.save_many(requests, batch_flag).await {
                Ok(batch) => {
                    log.log(EventKind::BatchSaved {
                        report: batch.clone(),
                    });
                    report.batch = Some(batch);
                    Ok(())
                }
                Err(ArchiveError::Unavailable {
                    report: batch,
                    source,
                }) => {
                    log.log(EventKind::BatchAborted {
                        error: source.to_string(),
                        report: batch.clone(),
                    });
                    report.batch = Some(batch.clone());
                    Err(anyhow::Error::new(ArchiveError::Unavailable {
                        report: batch,
                        source,
                    })
                    .context(format!("Failed to persist {list} of {target}")))
                }
                Err(e) => Err(anyhow::Error::new(e)
                    .context(format!("Failed to persist {list} of {target}"))),
            }
        };

        if let Some(ref dir) = self.data_dir {
            match log.save(dir, &report) {
                Ok(path) => report.run_log = Some(path),
                Err(e) => warn!(error = %e, "Failed to save run log"),
            }
        }

        persisted?;
        info!(
            account = target,
            list,
            collected = report.collected,
            stop = report.stop.as_str(),
            "Harvest complete"
        );
        Ok(report)
    }
}

/// Users in discovery order, stamped with the scrape time.
fn following_requests(items: Vec<CollectedItem>, scraped_at: DateTime<Utc>) -> Vec<SaveRequest> {
    let scraped_at = scraped_at.to_rfc3339();
    items
        .into_iter()
        .map(|item| {
            let mut fields = item.payload;
            fields.insert("last_scraped_at".into(), scraped_at.clone().into());
            SaveRequest::new(EntityKind::User, item.key, fields).with_artifact(item.artifact)
        })
        .collect()
}

/// The timeline renders newest first; items are stored oldest first.
fn timeline_requests(items: Vec<CollectedItem>, scraped_at: DateTime<Utc>) -> Vec<SaveRequest> {
    let scraped_at = scraped_at.to_rfc3339();
    items
        .into_iter()
        .rev()
        .map(|item| {
            let mut fields = item.payload;
            fields.insert("scraped_at".into(), scraped_at.clone().into());
            SaveRequest::new(EntityKind::ContentItem, item.key, fields)
                .with_artifact(item.artifact)
        })
        .collect()
}
