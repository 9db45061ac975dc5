use trawl_common::EntityKind;

use crate::batch::BatchReport;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Insert collided with an existing natural key. The gateway resolves
    /// this by updating instead; callers of the gateway never see it.
    #[error("{kind} {key} already exists")]
    Conflict { kind: EntityKind, key: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend refused one write. Counted per item, never fatal.
    #[error("Write rejected for {key}: {reason}")]
    Rejected { key: String, reason: String },

    #[error("Storage backend unreachable: {0}")]
    Unreachable(String),

    /// A batch was aborted by a systemic failure. `report` holds the counts
    /// accumulated before the abort.
    #[error("Batch aborted after {report}")]
    Unavailable {
        report: BatchReport,
        #[source]
        source: Box<ArchiveError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ArchiveError {
    /// Failures that mean the backend itself is gone, as opposed to one
    /// write going wrong. These abort a batch.
    pub fn is_systemic(&self) -> bool {
        match self {
            ArchiveError::Unreachable(_) | ArchiveError::Unavailable { .. } => true,
            ArchiveError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            ),
            ArchiveError::Conflict { .. }
            | ArchiveError::NotFound(_)
            | ArchiveError::Rejected { .. } => false,
        }
    }
}
