//! Error taxonomy for a sync run.

use chrono::{DateTime, FixedOffset};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Failed to fetch transactions: {0}")]
    Fetch(anyhow::Error),

    #[error("Failed to transform transaction {id}: {reason}")]
    Transform { id: String, reason: String },

    #[error("Failed to read from store: {0}")]
    StoreRead(anyhow::Error),

    #[error("Failed to write to store: {0}")]
    Write(anyhow::Error),

    #[error("Failed to access sync state: {0}")]
    Watermark(anyhow::Error),

    #[error("A sync run is already in progress, please retry in a minute")]
    AlreadyRunning,

    #[error("Sales report failed: {0}")]
    Report(String),
}

impl SyncError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::Precondition(_) => "precondition",
            Self::Fetch(_) => "fetch",
            Self::Transform { .. } => "transform",
            Self::StoreRead(_) => "store_read",
            Self::Write(_) => "write",
            Self::Watermark(_) => "watermark",
            Self::AlreadyRunning => "already_running",
            Self::Report(_) => "report",
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyRunning => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            SyncError::InvalidRange { .. } | SyncError::Precondition(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            SyncError::Fetch(_) => AppError::BadGateway(err.to_string()),
            SyncError::StoreRead(e) | SyncError::Write(e) | SyncError::Watermark(e) => {
                AppError::DatabaseError(e)
            }
            SyncError::Transform { .. } | SyncError::Report(_) => {
                AppError::InternalError(anyhow::anyhow!(err.to_string()))
            }
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
