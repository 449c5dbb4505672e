//! The fixed column list shared by ledger records and stored rows.

/// One column of the ledger table. The declaration order is the header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LedgerField {
    TrId,
    InvoiceId,
    TrEventCode,
    TrStatus,
    TrSubject,
    TrUpdatedDate,
    TrUpdatedTime,
    TrInsertDate,
    TrInsertTime,
    TrAmount,
    TrCurrency,
    TrFeeAmount,
    TrFeeCurrency,
    PayerId,
    PayerEmail,
    PayerName,
    PayerCountryCode,
    TrNote,
    PpRefId,
    PpRefIdType,
}

impl LedgerField {
    pub const ALL: [LedgerField; 20] = [
        Self::TrId,
        Self::InvoiceId,
        Self::TrEventCode,
        Self::TrStatus,
        Self::TrSubject,
        Self::TrUpdatedDate,
        Self::TrUpdatedTime,
        Self::TrInsertDate,
        Self::TrInsertTime,
        Self::TrAmount,
        Self::TrCurrency,
        Self::TrFeeAmount,
        Self::TrFeeCurrency,
        Self::PayerId,
        Self::PayerEmail,
        Self::PayerName,
        Self::PayerCountryCode,
        Self::TrNote,
        Self::PpRefId,
        Self::PpRefIdType,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrId => "tr_id",
            Self::InvoiceId => "invoice_id",
            Self::TrEventCode => "tr_event_code",
            Self::TrStatus => "tr_status",
            Self::TrSubject => "tr_subject",
            Self::TrUpdatedDate => "tr_updated_date",
            Self::TrUpdatedTime => "tr_updated_time",
            Self::TrInsertDate => "tr_insert_date",
            Self::TrInsertTime => "tr_insert_time",
            Self::TrAmount => "tr_amount",
            Self::TrCurrency => "tr_currency",
            Self::TrFeeAmount => "tr_fee_amount",
            Self::TrFeeCurrency => "tr_fee_currency",
            Self::PayerId => "payer_id",
            Self::PayerEmail => "payer_email",
            Self::PayerName => "payer_name",
            Self::PayerCountryCode => "payer_country_code",
            Self::TrNote => "tr_note",
            Self::PpRefId => "pp_ref_id",
            Self::PpRefIdType => "pp_ref_id_type",
        }
    }

    /// Position of this field in the header.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Whether a reconciliation may overwrite this cell on an existing row.
    ///
    /// The composite key identifies the row and the insert stamp records when
    /// the row first appeared, so neither is ever rewritten.
    pub fn is_mutable(&self) -> bool {
        !matches!(
            self,
            Self::TrId | Self::TrEventCode | Self::TrInsertDate | Self::TrInsertTime
        )
    }

    /// Column names in header order.
    pub fn header() -> Vec<&'static str> {
        Self::ALL.iter().map(|f| f.as_str()).collect()
    }
}

impl std::fmt::Display for LedgerField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LedgerField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("Unknown ledger column: {}", s))
    }
}
