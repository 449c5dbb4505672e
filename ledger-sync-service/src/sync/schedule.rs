//! Month-bounded window scheduling.
//!
//! The reporting API rejects spans longer than one month, so an arbitrary
//! `[start, end]` is walked as consecutive windows that break at month
//! boundaries. Only the first and last window may be partial.

use crate::error::{SyncError, SyncResult};
use crate::models::DateWindow;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, SubsecRound, TimeZone};

/// Lazy, finite sequence of windows covering `[start, end]`. Clone to restart.
///
/// Bounds are truncated to whole seconds, the resolution of the reporting API.
#[derive(Debug, Clone)]
pub struct DateWindows {
    next_start: Option<DateTime<FixedOffset>>,
    end: DateTime<FixedOffset>,
}

impl DateWindows {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> SyncResult<Self> {
        if start > end {
            return Err(SyncError::InvalidRange { start, end });
        }
        Ok(Self {
            next_start: Some(start.trunc_subsecs(0)),
            end: end.trunc_subsecs(0),
        })
    }
}

impl Iterator for DateWindows {
    type Item = SyncResult<DateWindow>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start.take()?;
        if start > self.end {
            return None;
        }

        let next_month = first_of_next_month(start)?;
        let window_end = (next_month - Duration::seconds(1)).min(self.end);
        self.next_start = Some(next_month);

        Some(DateWindow::new(start, window_end))
    }
}

/// Midnight on the first day of the month after `at`, in `at`'s offset.
fn first_of_next_month(at: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    let midnight = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    at.offset().from_local_datetime(&midnight).single()
}
