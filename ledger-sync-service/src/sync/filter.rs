//! Accounting-relevance classification of ledger records.

use crate::models::LedgerRecord;
use serde::Deserialize;
use std::collections::HashSet;

/// Event codes starting with this prefix are withdrawals/expenses when negative.
const EXPENSE_PREFIX: &str = "T00";

/// Event code fragments identifying holds and reversals of holds.
const HOLD_PATTERNS: [&str; 4] = ["T15", "T21", "T1110", "T1111"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FilterSettings {
    #[serde(default)]
    pub activate: bool,
    #[serde(default)]
    pub subjects: HashSet<String>,
    #[serde(default)]
    pub event_codes: HashSet<String>,
}

/// Why a record was kept or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Unfiltered,
    Subject,
    EventCode,
    Expense,
    Hold,
    Unmatched,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unfiltered => "unfiltered",
            Self::Subject => "subject",
            Self::EventCode => "event_code",
            Self::Expense => "expense",
            Self::Hold => "hold",
            Self::Unmatched => "unmatched",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub keep: bool,
    pub reason: FilterReason,
}

impl FilterDecision {
    fn keep(reason: FilterReason) -> Self {
        Self { keep: true, reason }
    }

    fn skip(reason: FilterReason) -> Self {
        Self {
            keep: false,
            reason,
        }
    }
}

/// Classify one record. Rules are evaluated in order and the first match wins:
/// allow-lists override the hold/unmatched skips but never the expense rule.
pub fn classify(record: &LedgerRecord, settings: &FilterSettings) -> FilterDecision {
    if !settings.activate {
        return FilterDecision::keep(FilterReason::Unfiltered);
    }

    if record.is_negative() && record.event_code.starts_with(EXPENSE_PREFIX) {
        return FilterDecision::skip(FilterReason::Expense);
    }

    if !settings.subjects.is_empty() && settings.subjects.contains(&record.subject) {
        return FilterDecision::keep(FilterReason::Subject);
    }

    if !settings.event_codes.is_empty() && settings.event_codes.contains(&record.event_code) {
        return FilterDecision::keep(FilterReason::EventCode);
    }

    if HOLD_PATTERNS
        .iter()
        .any(|pattern| record.event_code.contains(pattern))
    {
        return FilterDecision::skip(FilterReason::Hold);
    }

    FilterDecision::skip(FilterReason::Unmatched)
}
