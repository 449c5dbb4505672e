//! In-process collaborators for local dry runs and tests.

use crate::models::raw::parse_timestamp;
use crate::models::{DateWindow, RawTransaction, RunWatermark, StoredRow, TransactionPage};
use crate::sync::ports::{RowStore, TransactionSource, WatermarkStore};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct RowState {
    header: Vec<String>,
    rows: Vec<StoredRow>,
    next_id: i64,
    calls: usize,
    write_calls: usize,
    add_row_batches: Vec<usize>,
}

impl RowState {
    fn push(&mut self, row: &StoredRow) {
        self.next_id += 1;
        self.rows
            .push(StoredRow::new(None, row.cells().to_vec()).with_row_id(self.next_id));
    }
}

/// Row store backed by a vector. Row ids are assigned sequentially on append.
#[derive(Default)]
pub struct MemoryRowStore {
    state: Mutex<RowState>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `rows`, bypassing call accounting.
    pub fn with_rows(rows: &[StoredRow]) -> Self {
        let store = Self::new();
        {
            let mut state = lock(&store.state);
            for row in rows {
                state.push(row);
            }
        }
        store
    }

    pub fn snapshot(&self) -> Vec<StoredRow> {
        lock(&self.state).rows.clone()
    }

    pub fn header(&self) -> Vec<String> {
        lock(&self.state).header.clone()
    }

    /// Every trait call, reads included.
    pub fn calls(&self) -> usize {
        lock(&self.state).calls
    }

    /// `add_rows` and `save_row` calls.
    pub fn write_calls(&self) -> usize {
        lock(&self.state).write_calls
    }

    /// Size of each successful `add_rows` call, in call order.
    pub fn add_row_batches(&self) -> Vec<usize> {
        lock(&self.state).add_row_batches.clone()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn rows(&self) -> anyhow::Result<Vec<StoredRow>> {
        let mut state = lock(&self.state);
        state.calls += 1;
        Ok(state.rows.clone())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.rows.clear();
        state.header.clear();
        Ok(())
    }

    async fn set_header(&self, columns: &[&str]) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.header = columns.iter().map(|c| c.to_string()).collect();
        Ok(())
    }

    async fn add_rows(&self, rows: &[StoredRow]) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.write_calls += 1;
        for row in rows {
            state.push(row);
        }
        state.add_row_batches.push(rows.len());
        Ok(())
    }

    async fn save_row(&self, row: &StoredRow) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.write_calls += 1;
        let row_id = row
            .row_id()
            .ok_or_else(|| anyhow::anyhow!("row {} has no row id", row.key()))?;
        let slot = state
            .rows
            .iter_mut()
            .find(|r| r.row_id() == Some(row_id))
            .ok_or_else(|| anyhow::anyhow!("row {} not found", row_id))?;
        *slot = row.clone();
        Ok(())
    }
}

/// Watermark held in memory.
pub struct MemoryWatermarkStore {
    current: Mutex<RunWatermark>,
    saves: Mutex<usize>,
}

impl MemoryWatermarkStore {
    pub fn new(initial: RunWatermark) -> Self {
        Self {
            current: Mutex::new(initial),
            saves: Mutex::new(0),
        }
    }

    pub fn current(&self) -> RunWatermark {
        lock(&self.current).clone()
    }

    pub fn save_calls(&self) -> usize {
        *lock(&self.saves)
    }

    /// Replace the stored watermark, e.g. to request a reload.
    pub fn set(&self, watermark: RunWatermark) {
        *lock(&self.current) = watermark;
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> anyhow::Result<RunWatermark> {
        Ok(self.current())
    }

    async fn save(&self, watermark: &RunWatermark) -> anyhow::Result<()> {
        *lock(&self.current) = watermark.clone();
        *lock(&self.saves) += 1;
        Ok(())
    }
}

#[derive(Default)]
struct SourceState {
    transactions: Vec<RawTransaction>,
    requested: Vec<(DateWindow, u32)>,
}

/// Transaction source answering from a fixed list.
///
/// Entries are served for the windows containing their update timestamp;
/// entries whose timestamp does not parse are served for every window.
pub struct MemorySource {
    state: Mutex<SourceState>,
    page_size: usize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(SourceState::default()),
            page_size: page_size.max(1),
        }
    }

    pub fn push(&self, transactions: Vec<RawTransaction>) {
        lock(&self.state).transactions.extend(transactions);
    }

    /// Replace every transaction.
    pub fn set(&self, transactions: Vec<RawTransaction>) {
        lock(&self.state).transactions = transactions;
    }

    /// Windows requested on their first page, in call order.
    pub fn requested_windows(&self) -> Vec<DateWindow> {
        lock(&self.state)
            .requested
            .iter()
            .filter(|(_, page)| *page == 1)
            .map(|(window, _)| *window)
            .collect()
    }
}

#[async_trait]
impl TransactionSource for MemorySource {
    async fn fetch_page(&self, window: &DateWindow, page: u32) -> anyhow::Result<TransactionPage> {
        let mut state = lock(&self.state);
        state.requested.push((*window, page));

        let matching: Vec<&RawTransaction> = state
            .transactions
            .iter()
            .filter(|t| {
                t.transaction_info
                    .transaction_updated_date
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map_or(true, |at| window.contains(at))
            })
            .collect();

        let total_pages = matching.len().div_ceil(self.page_size).max(1) as u32;
        let transaction_details = matching
            .into_iter()
            .skip((page.saturating_sub(1) as usize) * self.page_size)
            .take(self.page_size)
            .cloned()
            .collect();

        Ok(TransactionPage {
            page,
            total_pages,
            transaction_details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::fixtures::record;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    fn entry(id: &str, updated: &str) -> RawTransaction {
        serde_json::from_value(json!({
            "transaction_info": {
                "transaction_id": id,
                "transaction_event_code": "T0006",
                "transaction_updated_date": updated
            }
        }))
        .unwrap()
    }

    fn march() -> DateWindow {
        let tz = FixedOffset::east_opt(0).unwrap();
        DateWindow::new(
            tz.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2023, 3, 31, 23, 59, 59).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_source_pages_entries_in_window() {
        let source = MemorySource::with_page_size(2);
        source.push(vec![
            entry("TX1", "2023-03-02T10:00:00+0000"),
            entry("TX2", "2023-03-03T10:00:00+0000"),
            entry("TX3", "2023-03-04T10:00:00+0000"),
            entry("TX4", "2023-04-01T10:00:00+0000"),
        ]);

        let first = source.fetch_page(&march(), 1).await.unwrap();
        let second = source.fetch_page(&march(), 2).await.unwrap();

        assert_eq!(first.total_pages, 2);
        assert_eq!(first.transaction_details.len(), 2);
        assert_eq!(second.transaction_details.len(), 1);
        assert_eq!(source.requested_windows(), vec![march()]);
    }

    #[tokio::test]
    async fn test_save_row_requires_known_id() {
        let store = MemoryRowStore::new();
        let row = StoredRow::from_record(&record("TX1", "T0006", "1"));
        store.add_rows(std::slice::from_ref(&row)).await.unwrap();

        assert!(store.save_row(&row).await.is_err());
        assert!(store.save_row(&row.with_row_id(1)).await.is_ok());
    }
}
