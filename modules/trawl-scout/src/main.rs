use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use simlist::{synthetic_following, synthetic_timeline, PassLog, ReplayViewport, VirtualList};
use trawl_archive::{EntityStore, Gateway, MemoryStore, PgStore};
use trawl_collector::ScrollPolicy;
use trawl_common::{parse_metric_count, Config, TweetCard, UserCell, UserProfile};
use trawl_scout::Harvester;

#[derive(Parser)]
#[command(name = "trawl", about = "Incremental harvester for virtualized account lists")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest a simulated following list, profile and timeline.
    Simulate {
        #[arg(long, default_value = "alice")]
        account: String,
        /// Accounts in the simulated following list.
        #[arg(long, default_value_t = 120)]
        following: usize,
        /// Posts in the simulated timeline.
        #[arg(long, default_value_t = 40)]
        posts: usize,
        /// Fail every Nth read of a list.
        #[arg(long)]
        flaky_every: Option<u32>,
        /// Detach the viewport at the Nth scroll.
        #[arg(long)]
        fail_scroll_at: Option<u32>,
        /// Skip settle and correction delays.
        #[arg(long)]
        fast: bool,
        /// Save the lists' pass logs under DATA_DIR/trawl-sims/ for replay.
        #[arg(long)]
        record: bool,
    },
    /// Replay a recorded pass log through the harvest pipeline.
    Replay {
        path: PathBuf,
        #[arg(long, default_value = "replayed")]
        account: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawl=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("trawl starting...");

    let config = Config::from_env();
    config.log_redacted();
    let file_config = config.file_config()?;

    let store: Arc<dyn EntityStore> = match config.database_url {
        Some(ref url) => {
            let store = PgStore::connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    };
    store.ping().await.context("Storage backend unreachable")?;
    let gateway = Gateway::from_config(store, &file_config.persistence);

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current step");
                cancelled.store(true, Ordering::Relaxed);
            }
        });
    }

    let harvester = Harvester::new(gateway, file_config).with_run_logs(&config.data_dir);

    match cli.command {
        Command::Simulate {
            account,
            following,
            posts,
            flaky_every,
            fail_scroll_at,
            fast,
            record,
        } => {
            let harvester = if fast {
                harvester.with_scroll(ScrollPolicy::immediate())
            } else {
                harvester
            };

            let following_list = with_faults(
                VirtualList::new("following", synthetic_following(following)),
                flaky_every,
                fail_scroll_at,
            );
            let timeline_list = with_faults(
                VirtualList::new("timeline", synthetic_timeline(&account, posts, Utc::now()))
                    .with_capture(),
                flaky_every,
                fail_scroll_at,
            );

            let report = harvester
                .harvest_following(&account, &following_list, &cancelled)
                .await?;
            println!("{report}");

            let profile = UserProfile {
                display_name: Some(format!("{account} (simulated)")),
                bio: Some("Simulated account".into()),
                followers_count: Some(parse_metric_count("1.2K")),
                following_count: Some(following as u64),
                joined_date: NaiveDate::from_ymd_opt(2020, 1, 1),
                ..Default::default()
            };
            harvester.save_profile(&account, &profile).await?;

            let report = harvester
                .harvest_timeline(&account, &timeline_list, &cancelled)
                .await?;
            println!("{report}");

            if record {
                let dir = config.data_dir.join("trawl-sims").join(&account);
                save_pass_log(&following_list.pass_log().await, &dir)?;
                save_pass_log(&timeline_list.pass_log().await, &dir)?;
            }
        }
        Command::Replay { path, account } => {
            let log = PassLog::load(&path)
                .with_context(|| format!("Failed to load pass log {}", path.display()))?;
            let harvester = harvester.with_scroll(ScrollPolicy::immediate());
            let report = match log.label.as_str() {
                "following" => {
                    let viewport = ReplayViewport::<UserCell>::from_log(&log)?;
                    info!(
                        label = viewport.label(),
                        reads = viewport.recorded_reads(),
                        "Replaying pass log"
                    );
                    harvester
                        .harvest_following(&account, &viewport, &cancelled)
                        .await?
                }
                "timeline" => {
                    let viewport = ReplayViewport::<TweetCard>::from_log(&log)?;
                    info!(
                        label = viewport.label(),
                        reads = viewport.recorded_reads(),
                        "Replaying pass log"
                    );
                    harvester
                        .harvest_timeline(&account, &viewport, &cancelled)
                        .await?
                }
                other => bail!("Unknown pass log label: {other}"),
            };
            println!("{report}");
        }
    }

    Ok(())
}

fn with_faults<U>(
    list: VirtualList<U>,
    flaky_every: Option<u32>,
    fail_scroll_at: Option<u32>,
) -> VirtualList<U>
where
    U: serde::Serialize + Clone + Send + Sync,
{
    let list = match flaky_every {
        Some(n) => list.flaky_every(n),
        None => list,
    };
    match fail_scroll_at {
        Some(n) => list.fail_scroll_at(n),
        None => list,
    }
}

fn save_pass_log(log: &PassLog, dir: &Path) -> Result<()> {
    let path = dir.join(format!("{}.json", log.label));
    log.save(&path)?;
    info!(path = %path.display(), "Pass log saved");
    Ok(())
}
