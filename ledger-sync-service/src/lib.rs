//! Ledger Sync Service - keeps a tabular store eventually consistent with a remote transaction ledger.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
pub mod sync;
