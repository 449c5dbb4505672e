//! Previous-month sales summary for one product subject.

use super::fetch::{fetch_window, normalize_all};
use super::ports::{Clock, TransactionSource};
use crate::error::{SyncError, SyncResult};
use crate::models::DateWindow;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    /// First day of the reported month.
    pub month: NaiveDate,
    pub subject: String,
    pub count: usize,
    pub gross: Decimal,
    /// Sum of fees, negative as reported by the source.
    pub fees: Decimal,
    pub currency: String,
}

impl SalesSummary {
    pub fn net(&self) -> Decimal {
        self.gross + self.fees
    }
}

impl fmt::Display for SalesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sales of {}: {} | Gross: {} {cur} | Fees: {} {cur} | Net: {} {cur}",
            self.month.format("%B"),
            self.count,
            self.gross,
            self.fees,
            self.net(),
            cur = self.currency
        )
    }
}

/// Calendar month before the one containing `now`, in `now`'s offset.
fn previous_month(now: DateTime<FixedOffset>) -> SyncResult<DateWindow> {
    let this_month = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .ok_or_else(|| SyncError::Report(format!("no month start for {}", now)))?;
    let last_month = this_month
        .pred_opt()
        .and_then(|d| d.with_day(1))
        .ok_or_else(|| SyncError::Report(format!("no previous month for {}", now)))?;

    let offset = now.offset();
    let start = offset
        .from_local_datetime(&last_month.and_time(NaiveTime::MIN))
        .single();
    let end = offset
        .from_local_datetime(&this_month.and_time(NaiveTime::MIN))
        .single()
        .map(|d| d - Duration::seconds(1));
    match (start, end) {
        (Some(start), Some(end)) => DateWindow::new(start, end),
        _ => Err(SyncError::Report(format!("cannot place month before {}", now))),
    }
}

/// Count and sum last month's sales of `subject`. Every counted sale must be in `currency`.
#[instrument(skip(source, clock))]
pub async fn sales_report(
    source: &dyn TransactionSource,
    clock: &dyn Clock,
    subject: &str,
    currency: &str,
) -> SyncResult<SalesSummary> {
    let now = clock.now();
    let window = previous_month(now)?;
    let raw = fetch_window(source, &window).await?;
    let records = normalize_all(&raw, *now.offset());

    let mut summary = SalesSummary {
        month: window.start().date_naive(),
        subject: subject.to_string(),
        count: 0,
        gross: Decimal::ZERO,
        fees: Decimal::ZERO,
        currency: currency.to_string(),
    };

    for record in records.iter().filter(|r| r.subject == subject) {
        if record.currency != currency {
            return Err(SyncError::Report(format!(
                "transaction {} is in {} instead of {}",
                record.id, record.currency, currency
            )));
        }
        if let Some(fee) = record.fee_amount {
            if record.fee_currency != currency {
                return Err(SyncError::Report(format!(
                    "fee of transaction {} is in {} instead of {}",
                    record.id, record.fee_currency, currency
                )));
            }
            summary.fees += fee;
        }
        summary.gross += record.amount.unwrap_or_default();
        summary.count += 1;
    }

    info!(
        month = %summary.month,
        count = summary.count,
        gross = %summary.gross,
        "Built sales report"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemorySource;
    use crate::sync::ports::FixedClock;
    use serde_json::json;

    fn clock() -> FixedClock {
        FixedClock(
            FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2023, 3, 10, 9, 0, 0)
                .unwrap(),
        )
    }

    fn sale(id: &str, subject: &str, amount: &str, currency: &str) -> crate::models::RawTransaction {
        serde_json::from_value(json!({
            "transaction_info": {
                "transaction_id": id,
                "transaction_event_code": "T0006",
                "transaction_subject": subject,
                "transaction_updated_date": "2023-02-14T10:00:00+0000",
                "transaction_amount": { "currency_code": currency, "value": amount },
                "fee_amount": { "currency_code": currency, "value": "-0.65" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_previous_month_window() {
        let window = previous_month(clock().0).unwrap();
        assert_eq!(window.start().to_rfc3339(), "2023-02-01T00:00:00+01:00");
        assert_eq!(window.end().to_rfc3339(), "2023-02-28T23:59:59+01:00");

        let january = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 5, 0, 0, 0)
            .unwrap();
        let window = previous_month(january).unwrap();
        assert_eq!(window.start().date_naive(), NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(window.end().date_naive(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[tokio::test]
    async fn test_sums_matching_subject() {
        let source = MemorySource::new();
        source.push(vec![
            sale("TX1", "Workshop ticket", "25.00", "EUR"),
            sale("TX2", "Workshop ticket", "25.00", "EUR"),
            sale("TX3", "Other", "99.00", "EUR"),
        ]);

        let summary = sales_report(&source, &clock(), "Workshop ticket", "EUR")
            .await
            .unwrap();

        assert_eq!(summary.count, 2);
        assert_eq!(summary.gross, Decimal::new(5000, 2));
        assert_eq!(summary.fees, Decimal::new(-130, 2));
        assert_eq!(
            summary.to_string(),
            "Sales of February: 2 | Gross: 50.00 EUR | Fees: -1.30 EUR | Net: 48.70 EUR"
        );
    }

    #[tokio::test]
    async fn test_foreign_currency_fails() {
        let source = MemorySource::new();
        source.push(vec![sale("TX1", "Workshop ticket", "25.00", "USD")]);

        let err = sales_report(&source, &clock(), "Workshop ticket", "EUR")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Report(_)));
    }
}
