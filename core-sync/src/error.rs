use crate::engine::SyncProgress;
use thiserror::Error;

/// A catalog record that cannot be mirrored because its identity is missing
/// or unreadable. Skipped individually; the rest of the page is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed catalog record (chartId {}): {reason}", chart_id.map(|id| id.to_string()).unwrap_or_else(|| "unknown".to_string()))]
pub struct MalformedRecordError {
    pub chart_id: Option<u64>,
    pub reason: String,
}

impl MalformedRecordError {
    pub fn new(chart_id: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            chart_id,
            reason: reason.into(),
        }
    }
}

/// A page could not be fetched. Ends the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Catalog rejected request (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Catalog still rate limiting after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("Catalog request failed: {0}")]
    Source(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync failed at cursor {}: {source}", progress.cursor)]
    Fetch {
        #[source]
        source: FetchError,
        progress: SyncProgress,
    },

    #[error("Sync cancelled at cursor {}", progress.cursor)]
    Cancelled { progress: SyncProgress },

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// How far the run got before stopping, for resuming later.
    pub fn progress(&self) -> Option<&SyncProgress> {
        match self {
            SyncError::Fetch { progress, .. } | SyncError::Cancelled { progress } => {
                Some(progress)
            }
            SyncError::InvalidConfig(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
