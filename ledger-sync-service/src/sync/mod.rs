//! Reconciliation core: window planning, fetching, diffing and throttled writes.

pub mod engine;
pub mod fetch;
pub mod filter;
pub mod orchestrator;
pub mod ports;
pub mod report;
pub mod schedule;
pub mod writer;

pub use engine::{diff_row, reconcile, FieldChange, ReconcilePlan, RowUpdate};
pub use fetch::{fetch_window, normalize_all};
pub use filter::{classify, FilterDecision, FilterReason, FilterSettings};
pub use orchestrator::SyncOrchestrator;
pub use ports::{Clock, FixedClock, RowStore, SystemClock, TransactionSource, WatermarkStore};
pub use report::{sales_report, SalesSummary};
pub use schedule::DateWindows;
pub use writer::BatchWriter;
