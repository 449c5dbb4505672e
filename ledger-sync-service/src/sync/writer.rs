//! Throughput-bounded writes against the row store.

use super::ports::RowStore;
use crate::error::{SyncError, SyncResult};
use crate::models::StoredRow;
use crate::services::metrics::record_rows_written;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Writes rows in fixed-size chunks, strictly one after another, pausing after
/// each write so the destination's per-minute write quota is never exceeded.
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn RowStore>,
    chunk_size: usize,
    pause: Duration,
}

impl BatchWriter {
    /// `chunk_size` is clamped to at least one row.
    pub fn new(store: Arc<dyn RowStore>, chunk_size: usize, pause: Duration) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            pause,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Append `rows` in input order.
    #[instrument(skip_all, fields(rows = rows.len(), chunk_size = self.chunk_size))]
    pub async fn append(&self, rows: &[StoredRow]) -> SyncResult<()> {
        if rows.is_empty() {
            info!("Nothing new to upload");
            return Ok(());
        }

        info!("Uploading rows to store");
        for chunk in rows.chunks(self.chunk_size) {
            info!(
                chunk = chunk.len(),
                pause_ms = self.pause.as_millis() as u64,
                "Adding rows and waiting"
            );
            self.store.add_rows(chunk).await.map_err(SyncError::Write)?;
            record_rows_written("insert", chunk.len());
            tokio::time::sleep(self.pause).await;
        }
        Ok(())
    }

    /// Persist edited rows one by one; every save counts against the quota.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn save_edits(&self, rows: &[StoredRow]) -> SyncResult<()> {
        for row in rows {
            info!(
                row_id = ?row.row_id(),
                key = %row.key(),
                "Updating row and waiting"
            );
            self.store.save_row(row).await.map_err(SyncError::Write)?;
            record_rows_written("update", 1);
            tokio::time::sleep(self.pause).await;
        }
        Ok(())
    }
}
