//! Harvest orchestration: collector runs over account lists, persisted
//! through the deduplicating gateway, with a JSON run log per harvest.

pub mod harvester;
pub mod report;
pub mod run_log;

pub use harvester::Harvester;
pub use report::HarvestReport;
pub use run_log::{EventKind, RunLog};
