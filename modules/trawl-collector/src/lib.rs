//! Incremental collection over virtualized, infinite-scroll lists.
//!
//! A [`Collector`] repeatedly reads the units currently rendered in a
//! [`Viewport`], maps them through an [`Extractor`], and accumulates a
//! deduplicated [`CollectedSet`] until the list stops yielding new keys or a
//! pass/item limit is hit. Completeness is best-effort: convergence is a
//! heuristic, not proof that the underlying list was exhausted.

pub mod collector;
pub mod error;
pub mod extractors;
pub mod policy;
pub mod retry;
pub mod set;
pub mod traits;

#[cfg(feature = "test-support")]
pub mod testing;

pub use collector::{CollectConfig, CollectOutcome, CollectStats, Collector, StopReason};
pub use error::CollectError;
pub use extractors::{TweetCardExtractor, UserCellExtractor};
pub use policy::{Correction, ScrollPlan, ScrollPolicy};
pub use retry::RetryPolicy;
pub use set::{CollectedItem, CollectedSet, ScrollState};
pub use traits::{Extractor, Viewport};
