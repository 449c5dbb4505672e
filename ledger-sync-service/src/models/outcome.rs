//! Aggregated result of a run and its human-readable summary.

use super::record::DATE_FORMAT;
use chrono::{DateTime, FixedOffset};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: usize,
    pub edited: usize,
    pub skipped: usize,
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
}

impl SyncOutcome {
    pub fn new(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> Self {
        Self {
            created: 0,
            edited: 0,
            skipped: 0,
            from,
            to,
        }
    }

    pub fn add(&mut self, created: usize, edited: usize, skipped: usize) {
        self.created += created;
        self.edited += edited;
        self.skipped += skipped;
    }

    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.edited > 0
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.created, self.edited) {
            (0, 0) => f.write_str("No changes")?,
            (created, 0) => write!(f, "{} new transaction{}", created, plural(created))?,
            (0, edited) => write!(f, "{} transaction{} edited", edited, plural(edited))?,
            (created, edited) => write!(
                f,
                "{} new transaction{} and {} transaction{} edited",
                created,
                plural(created),
                edited,
                plural(edited)
            )?,
        }
        write!(
            f,
            " from {} to {}.",
            self.from.format(DATE_FORMAT),
            self.to.format(DATE_FORMAT)
        )
    }
}
