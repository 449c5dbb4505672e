//! Collaborator contracts the sync core drives.

use crate::models::{DateWindow, RunWatermark, StoredRow, TransactionPage};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

/// Remote ledger queried one window and one page at a time.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch page `page` (1-based) of the transactions updated within `window`.
    async fn fetch_page(&self, window: &DateWindow, page: u32) -> anyhow::Result<TransactionPage>;
}

/// Tabular destination holding one row per ledger entry.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Full snapshot in store order.
    async fn rows(&self) -> anyhow::Result<Vec<StoredRow>>;

    /// Remove every row and the header.
    async fn clear(&self) -> anyhow::Result<()>;

    async fn set_header(&self, columns: &[&str]) -> anyhow::Result<()>;

    /// Append rows after the existing ones, preserving their order.
    async fn add_rows(&self, rows: &[StoredRow]) -> anyhow::Result<()>;

    /// Persist the cells of a row previously returned by [`RowStore::rows`].
    async fn save_row(&self, row: &StoredRow) -> anyhow::Result<()>;
}

/// Small key/value home for the [`RunWatermark`], separate from the row store.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<RunWatermark>;
    async fn save(&self, watermark: &RunWatermark) -> anyhow::Result<()>;
}

pub trait Clock: Send + Sync {
    /// Current time in the report timezone.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock projected into a fixed report offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}
