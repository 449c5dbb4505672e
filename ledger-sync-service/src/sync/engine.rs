//! Per-window diff between fetched records and the stored rows.

use super::filter::{classify, FilterSettings};
use crate::models::{CompositeKey, DateWindow, LedgerField, LedgerRecord, RunMode, StoredRow};
use crate::services::metrics::{record_duplicate_key_anomaly, record_filter_decision};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// One cell that differs between a stored row and its fetched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: LedgerField,
    pub old: String,
    pub new: String,
}

/// An existing row with the fetched values applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub row: StoredRow,
    pub record: LedgerRecord,
    pub changes: Vec<FieldChange>,
}

/// Writes needed to bring one window of the store in line with the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_insert: Vec<LedgerRecord>,
    pub to_update: Vec<RowUpdate>,
    /// Records the filter excluded.
    pub skipped: usize,
    /// Records whose row already matches.
    pub unchanged: usize,
    /// Keys that already existed during a reload.
    pub anomalies: usize,
}

impl ReconcilePlan {
    pub fn created(&self) -> usize {
        self.to_insert.len()
    }

    pub fn edited(&self) -> usize {
        self.to_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }
}

/// Mutable cells of `row` that `record` would change. Empty candidate values
/// never blank out a stored cell.
pub fn diff_row(row: &StoredRow, record: &LedgerRecord) -> Vec<FieldChange> {
    LedgerField::ALL
        .iter()
        .filter(|field| field.is_mutable())
        .filter_map(|&field| {
            let new = record.cell(field);
            let old = row.get(field);
            if new.is_empty() || old == new {
                None
            } else {
                Some(FieldChange {
                    field,
                    old: old.to_string(),
                    new,
                })
            }
        })
        .collect()
}

/// Compute the inserts and updates for one window.
#[instrument(skip_all, fields(window = %window, mode = mode.as_str()))]
pub fn reconcile(
    window: &DateWindow,
    existing: &[StoredRow],
    fetched: Vec<LedgerRecord>,
    filter: &FilterSettings,
    mode: RunMode,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let fetched_count = fetched.len();

    // Filter, then collapse repeated keys so a key is scheduled at most once.
    let mut candidates: Vec<LedgerRecord> = Vec::with_capacity(fetched.len());
    let mut positions: HashMap<CompositeKey, usize> = HashMap::new();
    for record in fetched {
        let decision = classify(&record, filter);
        record_filter_decision(decision.reason.as_str());
        if !decision.keep {
            debug!(
                transaction_id = %record.id,
                event_code = %record.event_code,
                reason = decision.reason.as_str(),
                "Skipped transaction"
            );
            plan.skipped += 1;
            continue;
        }

        let key = record.key();
        match positions.get(&key) {
            Some(&position) => {
                warn!(key = %key, "Transaction fetched twice in one window, keeping the latest");
                candidates[position] = record;
            }
            None => {
                positions.insert(key, candidates.len());
                candidates.push(record);
            }
        }
    }

    let mut index: HashMap<CompositeKey, &StoredRow> = HashMap::with_capacity(existing.len());
    for row in existing {
        let key = row.key();
        if index.contains_key(&key) {
            warn!(key = %key, row_id = ?row.row_id(), "Store holds a duplicate key, ignoring later row");
            continue;
        }
        index.insert(key, row);
    }

    for record in candidates {
        let key = record.key();
        let Some(row) = index.get(&key) else {
            plan.to_insert.push(record);
            continue;
        };

        if mode == RunMode::Reload {
            warn!(
                key = %key,
                row_id = ?row.row_id(),
                "Reloaded transaction already present in store, updating instead of inserting"
            );
            record_duplicate_key_anomaly();
            plan.anomalies += 1;
        }

        let changes = diff_row(row, &record);
        if changes.is_empty() {
            plan.unchanged += 1;
            continue;
        }

        let mut updated = (*row).clone();
        for change in &changes {
            debug!(
                key = %key,
                field = %change.field,
                old = %change.old,
                new = %change.new,
                "Updated value"
            );
            updated.set(change.field, change.new.clone());
        }
        plan.to_update.push(RowUpdate {
            row: updated,
            record,
            changes,
        });
    }

    info!(
        fetched = fetched_count,
        considered = fetched_count - plan.skipped,
        to_insert = plan.created(),
        to_update = plan.edited(),
        unchanged = plan.unchanged,
        "Reconciled window"
    );

    plan
}
