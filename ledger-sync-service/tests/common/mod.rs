//! Common test utilities for ledger-sync-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use ledger_sync_service::config::SyncSettings;
use ledger_sync_service::models::{
    DateWindow, RawTransaction, RunWatermark, StoredRow, TransactionPage,
};
use ledger_sync_service::services::{MemoryRowStore, MemorySource, MemoryWatermarkStore};
use ledger_sync_service::startup::AppState;
use ledger_sync_service::sync::{FixedClock, RowStore, SyncOrchestrator, TransactionSource};
use serde_json::json;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,ledger_sync_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    utc().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Settings without write pauses; the initial date is 2023-01-01.
pub fn settings() -> SyncSettings {
    serde_json::from_value(json!({
        "initial_date": "2023-01-01",
        "write_pause_seconds": 0.0,
        "report": { "subject": "Workshop ticket", "currency": "EUR" }
    }))
    .unwrap()
}

/// A completed sale as the reporting API returns it.
pub fn transaction(id: &str, event_code: &str, updated: &str, amount: &str) -> RawTransaction {
    serde_json::from_value(json!({
        "transaction_info": {
            "transaction_id": id,
            "transaction_event_code": event_code,
            "transaction_status": "S",
            "transaction_subject": "Workshop ticket",
            "transaction_updated_date": updated,
            "transaction_amount": { "currency_code": "EUR", "value": amount },
            "fee_amount": { "currency_code": "EUR", "value": "-0.65" }
        },
        "payer_info": {
            "account_id": "PAYER1",
            "email_address": "buyer@example.com",
            "payer_name": { "alternate_full_name": "Ada Buyer" },
            "country_code": "DE"
        }
    }))
    .unwrap()
}

/// The row a store would hold for `raw`.
pub fn stored(raw: &RawTransaction) -> StoredRow {
    StoredRow::from_record(&raw.normalize(utc()).unwrap())
}

/// Source that waits before answering, to keep a run in flight.
pub struct SlowSource {
    pub inner: MemorySource,
    pub delay: Duration,
}

#[async_trait]
impl TransactionSource for SlowSource {
    async fn fetch_page(&self, window: &DateWindow, page: u32) -> anyhow::Result<TransactionPage> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_page(window, page).await
    }
}

/// Source whose every request fails.
pub struct DownSource;

#[async_trait]
impl TransactionSource for DownSource {
    async fn fetch_page(&self, _window: &DateWindow, _page: u32) -> anyhow::Result<TransactionPage> {
        anyhow::bail!("source unavailable")
    }
}

/// Store rejecting every `add_rows` call once `accepted` batches went through.
pub struct RejectingStore {
    pub inner: MemoryRowStore,
    pub accepted: usize,
}

#[async_trait]
impl RowStore for RejectingStore {
    async fn rows(&self) -> anyhow::Result<Vec<StoredRow>> {
        self.inner.rows().await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear().await
    }

    async fn set_header(&self, columns: &[&str]) -> anyhow::Result<()> {
        self.inner.set_header(columns).await
    }

    async fn add_rows(&self, rows: &[StoredRow]) -> anyhow::Result<()> {
        if self.inner.add_row_batches().len() >= self.accepted {
            anyhow::bail!("append rejected after {} batches", self.accepted);
        }
        self.inner.add_rows(rows).await
    }

    async fn save_row(&self, row: &StoredRow) -> anyhow::Result<()> {
        self.inner.save_row(row).await
    }
}

/// Orchestrator over `source` and `store`, for failure cases the harness cannot express.
pub fn orchestrator_with(
    source: Arc<dyn TransactionSource>,
    store: Arc<dyn RowStore>,
    watermarks: Arc<MemoryWatermarkStore>,
    now: DateTime<FixedOffset>,
) -> SyncOrchestrator {
    init_tracing();
    SyncOrchestrator::new(source, store, watermarks, Arc::new(FixedClock(now)), &settings())
        .expect("valid settings")
}

/// Orchestrator wired to in-memory collaborators.
pub struct TestHarness {
    pub source: Arc<MemorySource>,
    pub store: Arc<MemoryRowStore>,
    pub watermarks: Arc<MemoryWatermarkStore>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl TestHarness {
    pub fn new(now: DateTime<FixedOffset>, watermark: RunWatermark) -> Self {
        Self::with(now, watermark, MemoryRowStore::new(), settings())
    }

    pub fn with(
        now: DateTime<FixedOffset>,
        watermark: RunWatermark,
        store: MemoryRowStore,
        settings: SyncSettings,
    ) -> Self {
        init_tracing();
        let source = Arc::new(MemorySource::new());
        let store = Arc::new(store);
        let watermarks = Arc::new(MemoryWatermarkStore::new(watermark));
        let clock = Arc::new(FixedClock(now));
        let orchestrator = SyncOrchestrator::new(
            source.clone(),
            store.clone(),
            watermarks.clone(),
            clock.clone(),
            &settings,
        )
        .expect("valid settings");

        Self {
            source,
            store,
            watermarks,
            clock,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            source: self.source.clone(),
            watermarks: self.watermarks.clone(),
            clock: self.clock.clone(),
            report: settings().report,
            db: None,
        }
    }
}

/// Watermark after a successful run at `last_run_at`.
pub fn synced_at(last_run_at: DateTime<FixedOffset>) -> RunWatermark {
    let mut watermark = RunWatermark::new(date(2023, 1, 1));
    watermark.last_run_at = Some(last_run_at);
    watermark
}
