//! One guarded end-to-end sync run.

use super::engine::reconcile;
use super::fetch::{fetch_window, normalize_all};
use super::filter::FilterSettings;
use super::ports::{Clock, RowStore, TransactionSource, WatermarkStore};
use super::schedule::DateWindows;
use super::writer::BatchWriter;
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::models::{LedgerField, RunMode, RunWatermark, StoredRow, SyncOutcome};
use crate::services::metrics::record_run;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Cleared on drop so a failed or cancelled run never leaves the flag set.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    source: Arc<dyn TransactionSource>,
    store: Arc<dyn RowStore>,
    watermarks: Arc<dyn WatermarkStore>,
    clock: Arc<dyn Clock>,
    writer: BatchWriter,
    filter: FilterSettings,
    report_offset: FixedOffset,
    running: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn TransactionSource>,
        store: Arc<dyn RowStore>,
        watermarks: Arc<dyn WatermarkStore>,
        clock: Arc<dyn Clock>,
        settings: &SyncSettings,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        Ok(Self {
            writer: BatchWriter::new(store.clone(), settings.chunk_size, settings.write_pause()),
            source,
            store,
            watermarks,
            clock,
            filter: settings.filter.clone(),
            report_offset: settings.report_offset()?,
            running: AtomicBool::new(false),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sync. Concurrent calls are rejected with [`SyncError::AlreadyRunning`].
    ///
    /// The watermark is only advanced when every window was written successfully.
    pub async fn run_once(&self) -> SyncResult<SyncOutcome> {
        self.run(|_| {}).await
    }

    /// Rebuild the store from `from` (the stored reload date when `None`).
    ///
    /// The request is only persisted with the watermark of a successful run,
    /// so a rejected reload date leaves the stored watermark as it was.
    pub async fn run_reload(&self, from: Option<NaiveDate>) -> SyncResult<SyncOutcome> {
        self.run(|watermark| {
            watermark.reload_requested = true;
            if from.is_some() {
                watermark.reload_from = from;
            }
        })
        .await
    }

    #[instrument(skip_all)]
    async fn run(&self, request: impl FnOnce(&mut RunWatermark) + Send) -> SyncResult<SyncOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Sync requested while another run is in progress");
            return Err(SyncError::AlreadyRunning);
        };

        let now = self.clock.now();
        let mut watermark = self.watermarks.load().await.map_err(SyncError::Watermark)?;
        request(&mut watermark);
        let mode = watermark.mode();
        info!(
            mode = mode.as_str(),
            now = %now,
            last_run_at = ?watermark.last_run_at,
            "Starting sync run"
        );

        let result = match mode {
            RunMode::Reload => self.reload(&watermark, now).await,
            RunMode::Incremental => self.incremental(&watermark, now).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(mode = mode.as_str(), kind = e.kind(), error = %e, "Sync run failed");
                record_run(mode.as_str(), "failure");
                return Err(e);
            }
        };

        let summary = outcome.to_string();
        if let Err(e) = self.watermarks.save(&watermark.completed(now, &summary)).await {
            error!(error = %e, "Failed to persist watermark");
            record_run(mode.as_str(), "failure");
            return Err(SyncError::Watermark(e));
        }

        record_run(mode.as_str(), "success");
        info!(
            mode = mode.as_str(),
            created = outcome.created,
            edited = outcome.edited,
            skipped = outcome.skipped,
            summary = %summary,
            "Sync run finished"
        );
        Ok(outcome)
    }

    async fn reload(
        &self,
        watermark: &RunWatermark,
        now: DateTime<FixedOffset>,
    ) -> SyncResult<SyncOutcome> {
        let reload_from = watermark.reload_start();
        if reload_from < watermark.initial_date {
            return Err(SyncError::Precondition(format!(
                "reload date {} is before the initial date {}",
                reload_from, watermark.initial_date
            )));
        }
        if reload_from > now.date_naive() {
            return Err(SyncError::Precondition(format!(
                "reload date {} is in the future",
                reload_from
            )));
        }
        let start = self.midnight(reload_from)?;
        let windows = DateWindows::new(start, now)?;

        info!(reload_from = %reload_from, "Reloading store");
        let rows = self.store.rows().await.map_err(SyncError::StoreRead)?;
        let total = rows.len();
        let (previous, dropped): (Vec<StoredRow>, Vec<StoredRow>) = rows
            .into_iter()
            .partition(|row| row.updated_date().is_some_and(|date| date < reload_from));
        let unreadable = dropped.iter().filter(|r| r.updated_date().is_none()).count();
        if unreadable > 0 {
            warn!(rows = unreadable, "Discarding rows without a readable update date");
        }
        info!(
            rows = total,
            kept = previous.len(),
            "Keeping rows older than the reload date"
        );

        self.store.clear().await.map_err(SyncError::Write)?;
        self.store
            .set_header(&LedgerField::header())
            .await
            .map_err(SyncError::Write)?;
        let previous: Vec<StoredRow> = previous
            .into_iter()
            .map(|row| StoredRow::new(None, row.cells().to_vec()))
            .collect();
        self.writer.append(&previous).await?;

        self.sync_windows(windows, RunMode::Reload, start, now).await
    }

    async fn incremental(
        &self,
        watermark: &RunWatermark,
        now: DateTime<FixedOffset>,
    ) -> SyncResult<SyncOutcome> {
        let start = match watermark.last_run_at {
            Some(last_run_at) if last_run_at > now => {
                return Err(SyncError::Precondition(format!(
                    "last run {} is in the future",
                    last_run_at
                )));
            }
            Some(last_run_at) => (last_run_at - Duration::days(1)).with_timezone(&self.report_offset),
            None => {
                info!(initial_date = %watermark.initial_date, "First run, starting from the initial date");
                self.midnight(watermark.initial_date)?
            }
        };
        let windows = DateWindows::new(start, now)?;

        self.sync_windows(windows, RunMode::Incremental, start, now).await
    }

    async fn sync_windows(
        &self,
        windows: DateWindows,
        mode: RunMode,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> SyncResult<SyncOutcome> {
        let mut outcome = SyncOutcome::new(from, to);

        for window in windows {
            let window = window?;
            info!(window = %window, "Processing window");
            let raw = fetch_window(self.source.as_ref(), &window).await?;
            let records = normalize_all(&raw, self.report_offset);
            let existing = self.store.rows().await.map_err(SyncError::StoreRead)?;

            let plan = reconcile(&window, &existing, records, &self.filter, mode);

            let edits: Vec<StoredRow> = plan.to_update.iter().map(|u| u.row.clone()).collect();
            self.writer.save_edits(&edits).await?;
            let inserts: Vec<StoredRow> = plan.to_insert.iter().map(StoredRow::from_record).collect();
            self.writer.append(&inserts).await?;

            outcome.add(plan.created(), plan.edited(), plan.skipped);
        }

        Ok(outcome)
    }

    fn midnight(&self, date: NaiveDate) -> SyncResult<DateTime<FixedOffset>> {
        self.report_offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single()
            .ok_or_else(|| SyncError::Precondition(format!("cannot place {} in the report timezone", date)))
    }
}
