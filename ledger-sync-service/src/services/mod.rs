//! Services module for ledger-sync-service.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod paypal;

pub use database::{Database, PgRowStore, PgWatermarkStore};
pub use memory::{MemoryRowStore, MemorySource, MemoryWatermarkStore};
pub use metrics::{get_metrics, init_metrics};
pub use paypal::PaypalClient;
