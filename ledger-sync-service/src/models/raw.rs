//! Wire shapes of the transaction reporting API and their normalization.

use super::record::LedgerRecord;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One page of the transaction search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPage {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub total_pages: u32,
    #[serde(default)]
    pub transaction_details: Vec<RawTransaction>,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub transaction_info: RawTransactionInfo,
    #[serde(default)]
    pub payer_info: RawPayerInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransactionInfo {
    pub transaction_id: Option<String>,
    pub invoice_id: Option<String>,
    pub transaction_event_code: Option<String>,
    pub transaction_status: Option<String>,
    pub transaction_subject: Option<String>,
    pub transaction_updated_date: Option<String>,
    pub transaction_amount: Option<RawMoney>,
    pub fee_amount: Option<RawMoney>,
    pub transaction_note: Option<String>,
    pub paypal_reference_id: Option<String>,
    pub paypal_reference_id_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMoney {
    pub currency_code: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPayerInfo {
    pub account_id: Option<String>,
    pub email_address: Option<String>,
    pub payer_name: Option<RawPayerName>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPayerName {
    pub alternate_full_name: Option<String>,
}

impl RawTransaction {
    /// Identifier for log lines, even when the record is malformed.
    pub fn display_id(&self) -> &str {
        self.transaction_info
            .transaction_id
            .as_deref()
            .unwrap_or("<missing id>")
    }

    /// Map the raw entry to a [`LedgerRecord`], shifting its timestamp into `report_offset`.
    pub fn normalize(&self, report_offset: FixedOffset) -> SyncResult<LedgerRecord> {
        let info = &self.transaction_info;
        let payer = &self.payer_info;

        let id = non_empty(info.transaction_id.as_deref())
            .ok_or_else(|| self.transform_error("missing transaction_id"))?;
        let event_code = non_empty(info.transaction_event_code.as_deref())
            .ok_or_else(|| self.transform_error("missing transaction_event_code"))?;
        let updated_raw = non_empty(info.transaction_updated_date.as_deref())
            .ok_or_else(|| self.transform_error("missing transaction_updated_date"))?;
        let updated_at = parse_timestamp(updated_raw)
            .ok_or_else(|| {
                self.transform_error(&format!("unparsable updated date '{}'", updated_raw))
            })?
            .with_timezone(&report_offset);

        let (amount, currency) = self.money(info.transaction_amount.as_ref(), "amount")?;
        let (fee_amount, fee_currency) = self.money(info.fee_amount.as_ref(), "fee")?;

        Ok(LedgerRecord {
            id: id.to_string(),
            invoice_id: owned(&info.invoice_id),
            event_code: event_code.to_string(),
            status: owned(&info.transaction_status),
            subject: owned(&info.transaction_subject),
            updated_at,
            amount,
            currency,
            fee_amount,
            fee_currency,
            payer_id: owned(&payer.account_id),
            payer_email: owned(&payer.email_address),
            payer_name: payer
                .payer_name
                .as_ref()
                .and_then(|n| n.alternate_full_name.clone())
                .unwrap_or_default(),
            payer_country_code: owned(&payer.country_code),
            note: owned(&info.transaction_note),
            reference_id: owned(&info.paypal_reference_id),
            reference_id_type: owned(&info.paypal_reference_id_type),
        })
    }

    fn money(&self, money: Option<&RawMoney>, what: &str) -> SyncResult<(Option<Decimal>, String)> {
        match money {
            None => Ok((None, String::new())),
            Some(m) => {
                let value = m.value.trim().parse::<Decimal>().map_err(|_| {
                    self.transform_error(&format!("unparsable {} '{}'", what, m.value))
                })?;
                Ok((Some(value), m.currency_code.clone()))
            }
        }
    }

    fn transform_error(&self, reason: &str) -> SyncError {
        SyncError::Transform {
            id: self.display_id().to_string(),
            reason: reason.to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// The reporting API emits `2023-03-10T08:00:00+0000`; RFC 3339 is accepted too.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}
