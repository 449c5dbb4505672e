//! Domain models for ledger-sync-service.

pub mod field;
pub mod outcome;
pub mod raw;
pub mod record;
pub mod watermark;
pub mod window;

pub use field::LedgerField;
pub use outcome::SyncOutcome;
pub use raw::{RawMoney, RawPayerInfo, RawPayerName, RawTransaction, RawTransactionInfo, TransactionPage};
pub use record::{CompositeKey, LedgerRecord, StoredRow, DATE_FORMAT, TIME_FORMAT};
pub use watermark::{RunMode, RunWatermark};
pub use window::DateWindow;
