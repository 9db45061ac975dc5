pub mod config;
pub mod error;
pub mod metrics;
pub mod types;
pub mod units;

pub use config::{
    CapPolicy, Config, FileConfig, ListConfig, PersistenceConfig, RetryConfig, ScrollConfig,
    ScrollStage,
};
pub use error::TrawlError;
pub use metrics::parse_metric_count;
pub use types::*;
pub use units::{TweetCard, UserCell};
