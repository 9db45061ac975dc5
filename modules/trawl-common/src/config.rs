use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::TrawlError;

/// Environment-level configuration: secrets and deployment-specific paths.
/// Tuning knobs live in the TOML [`FileConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the in-memory store is used.
    pub database_url: Option<String>,
    /// Root for run logs (`DATA_DIR`, default `data`).
    pub data_dir: PathBuf,
    /// Optional TOML tuning file (`TRAWL_CONFIG`).
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            config_path: env::var("TRAWL_CONFIG").ok().map(PathBuf::from),
        }
    }

    /// Load the TOML tuning file if one is configured, defaults otherwise.
    pub fn file_config(&self) -> Result<FileConfig, TrawlError> {
        match self.config_path {
            Some(ref path) => FileConfig::load(path),
            None => Ok(FileConfig::default()),
        }
    }

    pub fn log_redacted(&self) {
        let db = match self.database_url {
            Some(ref url) => redact_url(url),
            None => "<not set, using in-memory store>".to_string(),
        };
        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {db}");
        tracing::info!("  DATA_DIR: {}", self.data_dir.display());
        tracing::info!(
            "  TRAWL_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string())
        );
    }
}

/// Keep scheme and host, drop credentials.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TOML tuning file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub following: ListConfig,
    pub timeline: ListConfig,
    pub scroll: ScrollConfig,
    pub retry: RetryConfig,
    pub persistence: PersistenceConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            following: ListConfig::default(),
            timeline: ListConfig::timeline(),
            scroll: ScrollConfig::default(),
            retry: RetryConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, TrawlError> {
        let content = std::fs::read_to_string(path).map_err(|source| TrawlError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| TrawlError::Toml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// What to do with the rest of a pass once `max_items` is reached mid-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapPolicy {
    /// Stop inserting at exactly `max_items`.
    #[default]
    Trim,
    /// Finish the pass; the set may exceed `max_items` by the pass's surplus.
    AllowOvershoot,
}

/// Termination limits for one list layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListConfig {
    pub max_passes: u32,
    pub max_items: Option<usize>,
    pub max_consecutive_empty_passes: u32,
    pub cap_policy: CapPolicy,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            max_passes: 100,
            max_items: None,
            max_consecutive_empty_passes: 4,
            cap_policy: CapPolicy::Trim,
        }
    }
}

impl ListConfig {
    pub fn timeline() -> Self {
        Self {
            max_passes: 20,
            max_items: Some(10),
            max_consecutive_empty_passes: 4,
            cap_policy: CapPolicy::Trim,
        }
    }
}

/// Scroll distance applies while `pass_index < until_pass`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrollStage {
    pub until_pass: u32,
    /// Distance in viewport heights.
    pub fraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrollConfig {
    pub stages: Vec<ScrollStage>,
    pub final_fraction: f64,
    /// Issue a reverse-then-forward correction every N passes (0 disables).
    pub correction_interval: u32,
    pub correction_back: f64,
    pub correction_forward: f64,
    pub correction_pause_ms: u64,
    pub settle_after_new_ms: u64,
    pub settle_after_empty_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                ScrollStage {
                    until_pass: 10,
                    fraction: 0.6,
                },
                ScrollStage {
                    until_pass: 30,
                    fraction: 0.8,
                },
            ],
            final_fraction: 1.2,
            correction_interval: 15,
            correction_back: 0.3,
            correction_forward: 0.5,
            correction_pause_ms: 500,
            settle_after_new_ms: 1000,
            settle_after_empty_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Pause between items in a batch.
    pub throttle_ms: u64,
    /// Independent keys written concurrently. Same-key writes never overlap.
    pub concurrency: usize,
    /// Persist what a failed or cancelled collection run gathered. A
    /// cancellation that arrives once the batch is running still stops it.
    pub persist_partial: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 100,
            concurrency: 1,
            persist_partial: true,
        }
    }
}
