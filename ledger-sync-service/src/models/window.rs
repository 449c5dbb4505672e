//! A bounded span submitted to the source in one fetch.

use super::record::DATE_FORMAT;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, FixedOffset};
use std::fmt;

/// Inclusive `[start, end]` span, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl DateWindow {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> SyncResult<Self> {
        if end < start {
            return Err(SyncError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    pub fn contains(&self, at: DateTime<FixedOffset>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}
