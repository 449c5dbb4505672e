//! Normalized ledger records and their stored counterparts.

use super::field::LedgerField;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use std::fmt;

/// Date format of the `*_date` cells.
pub const DATE_FORMAT: &str = "%d.%m.%Y";
/// Time format of the `*_time` cells.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Identity of a ledger entry. A refund shares its transaction id with the
/// original charge, so the event code is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub id: String,
    pub event_code: String,
}

impl CompositeKey {
    pub fn new(id: impl Into<String>, event_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_code: event_code.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.event_code)
    }
}

/// One remote ledger entry after field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub id: String,
    pub invoice_id: String,
    pub event_code: String,
    pub status: String,
    pub subject: String,
    /// Source timestamp shifted into the report timezone.
    pub updated_at: DateTime<FixedOffset>,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub fee_amount: Option<Decimal>,
    pub fee_currency: String,
    pub payer_id: String,
    pub payer_email: String,
    pub payer_name: String,
    pub payer_country_code: String,
    pub note: String,
    pub reference_id: String,
    pub reference_id_type: String,
}

impl LedgerRecord {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.id.clone(), self.event_code.clone())
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_some_and(|amount| amount < Decimal::ZERO)
    }

    /// Render one cell the way it is persisted.
    pub fn cell(&self, field: LedgerField) -> String {
        match field {
            LedgerField::TrId => self.id.clone(),
            LedgerField::InvoiceId => self.invoice_id.clone(),
            LedgerField::TrEventCode => self.event_code.clone(),
            LedgerField::TrStatus => self.status.clone(),
            LedgerField::TrSubject => self.subject.clone(),
            LedgerField::TrUpdatedDate | LedgerField::TrInsertDate => {
                self.updated_at.format(DATE_FORMAT).to_string()
            }
            LedgerField::TrUpdatedTime | LedgerField::TrInsertTime => {
                self.updated_at.format(TIME_FORMAT).to_string()
            }
            LedgerField::TrAmount => self.amount.map(|a| a.to_string()).unwrap_or_default(),
            LedgerField::TrCurrency => self.currency.clone(),
            LedgerField::TrFeeAmount => self.fee_amount.map(|a| a.to_string()).unwrap_or_default(),
            LedgerField::TrFeeCurrency => self.fee_currency.clone(),
            LedgerField::PayerId => self.payer_id.clone(),
            LedgerField::PayerEmail => self.payer_email.clone(),
            LedgerField::PayerName => self.payer_name.clone(),
            LedgerField::PayerCountryCode => self.payer_country_code.clone(),
            LedgerField::TrNote => self.note.clone(),
            LedgerField::PpRefId => self.reference_id.clone(),
            LedgerField::PpRefIdType => self.reference_id_type.clone(),
        }
    }
}

/// A persisted row: an optional store handle plus one cell per [`LedgerField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    row_id: Option<i64>,
    cells: Vec<String>,
}

impl StoredRow {
    /// Build a row from cells in header order; missing trailing cells are empty.
    pub fn new(row_id: Option<i64>, mut cells: Vec<String>) -> Self {
        cells.resize(LedgerField::COUNT, String::new());
        Self { row_id, cells }
    }

    /// A not-yet-persisted row holding the record's cells.
    pub fn from_record(record: &LedgerRecord) -> Self {
        let cells = LedgerField::ALL.iter().map(|f| record.cell(*f)).collect();
        Self::new(None, cells)
    }

    pub fn row_id(&self) -> Option<i64> {
        self.row_id
    }

    pub fn with_row_id(mut self, row_id: i64) -> Self {
        self.row_id = Some(row_id);
        self
    }

    pub fn get(&self, field: LedgerField) -> &str {
        &self.cells[field.index()]
    }

    pub fn set(&mut self, field: LedgerField, value: impl Into<String>) {
        self.cells[field.index()] = value.into();
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.get(LedgerField::TrId), self.get(LedgerField::TrEventCode))
    }

    /// The `tr_updated_date` cell, if it parses.
    pub fn updated_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.get(LedgerField::TrUpdatedDate), DATE_FORMAT).ok()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn record(id: &str, event_code: &str, amount: &str) -> LedgerRecord {
        LedgerRecord {
            id: id.to_string(),
            invoice_id: String::new(),
            event_code: event_code.to_string(),
            status: "S".to_string(),
            subject: "Workshop ticket".to_string(),
            updated_at: FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2023, 3, 10, 9, 30, 0)
                .unwrap(),
            amount: Some(amount.parse().unwrap()),
            currency: "EUR".to_string(),
            fee_amount: Some("-0.65".parse().unwrap()),
            fee_currency: "EUR".to_string(),
            payer_id: "PAYER1".to_string(),
            payer_email: "buyer@example.com".to_string(),
            payer_name: "Jane Doe".to_string(),
            payer_country_code: "DE".to_string(),
            note: String::new(),
            reference_id: String::new(),
            reference_id_type: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_cells_follow_header_order() {
        let row = StoredRow::from_record(&record("TX1", "T0006", "10.50"));

        assert_eq!(row.cells().len(), LedgerField::COUNT);
        assert_eq!(row.get(LedgerField::TrId), "TX1");
        assert_eq!(row.get(LedgerField::TrEventCode), "T0006");
        assert_eq!(row.get(LedgerField::TrUpdatedDate), "10.03.2023");
        assert_eq!(row.get(LedgerField::TrUpdatedTime), "09:30:00");
        assert_eq!(row.get(LedgerField::TrInsertDate), "10.03.2023");
        assert_eq!(row.get(LedgerField::TrAmount), "10.50");
        assert_eq!(row.get(LedgerField::TrFeeAmount), "-0.65");
    }

    #[test]
    fn test_key_matches_record_key() {
        let rec = record("TX1", "T1107", "-10.50");
        assert_eq!(StoredRow::from_record(&rec).key(), rec.key());
        assert_eq!(rec.key().to_string(), "TX1/T1107");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let row = StoredRow::new(Some(4), vec!["TX9".to_string()]);
        assert_eq!(row.cells().len(), LedgerField::COUNT);
        assert_eq!(row.get(LedgerField::TrEventCode), "");
        assert_eq!(row.row_id(), Some(4));
    }

    #[test]
    fn test_updated_date_parses_cell() {
        let mut row = StoredRow::from_record(&record("TX1", "T0006", "1"));
        assert_eq!(row.updated_date(), NaiveDate::from_ymd_opt(2023, 3, 10));

        row.set(LedgerField::TrUpdatedDate, "not a date");
        assert_eq!(row.updated_date(), None);
    }

    #[test]
    fn test_is_negative() {
        assert!(record("TX1", "T0006", "-1.00").is_negative());
        assert!(!record("TX1", "T0006", "0").is_negative());
        assert!(!record("TX1", "T0006", "3").is_negative());
    }
}
