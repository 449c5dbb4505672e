//! Page-exhausting fetch and normalization of one window.

use super::ports::TransactionSource;
use crate::error::{SyncError, SyncResult};
use crate::models::{DateWindow, LedgerRecord, RawTransaction};
use crate::services::metrics::record_transform_failure;
use chrono::FixedOffset;
use tracing::{info, instrument, warn};

/// Request pages until the total reported by the first page is exhausted.
#[instrument(skip_all, fields(window = %window))]
pub async fn fetch_window(
    source: &dyn TransactionSource,
    window: &DateWindow,
) -> SyncResult<Vec<RawTransaction>> {
    let mut transactions = Vec::new();
    let mut total_pages = 1;
    let mut page = 1;

    while page <= total_pages {
        let response = source
            .fetch_page(window, page)
            .await
            .map_err(SyncError::Fetch)?;
        if page == 1 {
            total_pages = response.total_pages.max(1);
        }
        info!(
            page = page,
            total_pages = total_pages,
            transactions = response.transaction_details.len(),
            "Loaded page"
        );
        transactions.extend(response.transaction_details);
        page += 1;
    }

    Ok(transactions)
}

/// Normalize every raw entry, dropping the ones that cannot be mapped.
pub fn normalize_all(raw: &[RawTransaction], report_offset: FixedOffset) -> Vec<LedgerRecord> {
    let records: Vec<LedgerRecord> = raw
        .iter()
        .filter_map(|entry| match entry.normalize(report_offset) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(transaction_id = %entry.display_id(), error = %e, "Dropping transaction");
                record_transform_failure();
                None
            }
        })
        .collect();

    if !raw.is_empty() && records.is_empty() {
        warn!(fetched = raw.len(), "No transaction in window could be normalized");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionPage;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    struct PagedSource {
        pages: Vec<TransactionPage>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl TransactionSource for PagedSource {
        async fn fetch_page(&self, _window: &DateWindow, page: u32) -> anyhow::Result<TransactionPage> {
            self.requested.lock().unwrap().push(page);
            self.pages
                .get(page as usize - 1)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("page {page} out of range"))
        }
    }

    fn entry(id: &str) -> RawTransaction {
        serde_json::from_value(json!({
            "transaction_info": {
                "transaction_id": id,
                "transaction_event_code": "T0006",
                "transaction_updated_date": "2023-03-10T08:00:00+0000"
            }
        }))
        .unwrap()
    }

    fn window() -> DateWindow {
        let tz = FixedOffset::east_opt(0).unwrap();
        DateWindow::new(
            tz.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_requests_every_page() {
        let source = PagedSource {
            pages: (1..=3)
                .map(|page| TransactionPage {
                    page,
                    total_pages: 3,
                    transaction_details: vec![entry(&format!("TX{page}"))],
                })
                .collect(),
            requested: Mutex::new(Vec::new()),
        };

        let raw = fetch_window(&source, &window()).await.unwrap();

        assert_eq!(raw.len(), 3);
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_page_is_fetch_error() {
        let source = PagedSource {
            pages: vec![TransactionPage {
                page: 1,
                total_pages: 2,
                transaction_details: vec![entry("TX1")],
            }],
            requested: Mutex::new(Vec::new()),
        };

        let err = fetch_window(&source, &window()).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(_)));
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let mut broken = entry("TX2");
        broken.transaction_info.transaction_event_code = None;

        let records = normalize_all(&[entry("TX1"), broken], FixedOffset::east_opt(0).unwrap());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "TX1");
    }

    #[test]
    fn test_all_malformed_yields_empty_window() {
        let mut broken = entry("TX1");
        broken.transaction_info.transaction_updated_date = Some("yesterday".into());

        assert!(normalize_all(&[broken], FixedOffset::east_opt(0).unwrap()).is_empty());
    }
}
