//! Persisted progress marker driving the next run.

use chrono::{DateTime, FixedOffset, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Reload,
    Incremental,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWatermark {
    /// Start of the last successful run.
    pub last_run_at: Option<DateTime<FixedOffset>>,
    pub reload_requested: bool,
    /// First day to rebuild on reload; `initial_date` when unset.
    pub reload_from: Option<NaiveDate>,
    /// Earliest date the store may ever represent.
    pub initial_date: NaiveDate,
    /// Summary of the last successful run.
    pub last_run_log: Option<String>,
}

impl RunWatermark {
    pub fn new(initial_date: NaiveDate) -> Self {
        Self {
            last_run_at: None,
            reload_requested: false,
            reload_from: None,
            initial_date,
            last_run_log: None,
        }
    }

    pub fn mode(&self) -> RunMode {
        if self.reload_requested {
            RunMode::Reload
        } else {
            RunMode::Incremental
        }
    }

    pub fn reload_start(&self) -> NaiveDate {
        self.reload_from.unwrap_or(self.initial_date)
    }

    /// State to persist after a fully successful run started at `started_at`.
    pub fn completed(&self, started_at: DateTime<FixedOffset>, summary: &str) -> Self {
        Self {
            last_run_at: Some(started_at),
            reload_requested: false,
            reload_from: self.reload_from,
            initial_date: self.initial_date,
            last_run_log: Some(summary.to_string()),
        }
    }
}
