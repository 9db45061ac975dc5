pub mod batch;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod pg;
pub mod store;

pub use batch::{BatchReport, ItemFailure, SaveRequest};
pub use error::{ArchiveError, Result};
pub use gateway::{content_hash, ArtifactWrite, EntityWrite, Gateway};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{EntityStore, StoredArtifact, StoredEntity};
