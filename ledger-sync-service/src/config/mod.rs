//! Configuration module for ledger-sync-service.

use crate::sync::FilterSettings;
use chrono::{FixedOffset, NaiveDate};
use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LedgerSyncConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub paypal: PaypalConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub page_size: u32,
}

/// Tunables of a sync run, read from the `sync` section of the layered config.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Rows per append call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause after every write call.
    #[serde(default = "default_write_pause_seconds")]
    pub write_pause_seconds: f64,
    /// Offset of the report timezone, used for the clock and record timestamps.
    #[serde(default)]
    pub report_utc_offset_hours: i32,
    /// Earliest date the store may represent. Seeds the watermark on first start.
    pub initial_date: NaiveDate,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub report: SalesReportSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SalesReportSettings {
    #[serde(default)]
    pub subject: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for SalesReportSettings {
    fn default() -> Self {
        Self {
            subject: String::new(),
            currency: default_currency(),
        }
    }
}

fn default_chunk_size() -> usize {
    60
}

fn default_write_pause_seconds() -> f64 {
    1.0
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Deserialize)]
struct Layered {
    sync: SyncSettings,
}

impl SyncSettings {
    /// Load the `sync` section; list-valued filter keys accept comma-separated env values.
    pub fn load() -> Result<Self, AppError> {
        let layered: Layered =
            core_config::load_layered(&["sync.filter.subjects", "sync.filter.event_codes"])?;
        layered.sync.validate()?;
        Ok(layered.sync)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "sync.chunk_size must be at least 1"
            )));
        }
        if !self.write_pause_seconds.is_finite() || self.write_pause_seconds < 0.0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "sync.write_pause_seconds must be a non-negative number"
            )));
        }
        self.report_offset()?;
        Ok(())
    }

    pub fn write_pause(&self) -> Duration {
        Duration::from_secs_f64(self.write_pause_seconds.max(0.0))
    }

    pub fn report_offset(&self) -> Result<FixedOffset, AppError> {
        self.report_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "sync.report_utc_offset_hours out of range: {}",
                    self.report_utc_offset_hours
                ))
            })
    }
}

impl LedgerSyncConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let sync = SyncSettings::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "ledger-sync-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            paypal: PaypalConfig {
                api_url: env::var("PAYPAL_API_URL")
                    .unwrap_or_else(|_| "https://api-m.paypal.com".to_string()),
                client_id: env::var("PAYPAL_CLIENT_ID").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("PAYPAL_CLIENT_ID is required"))
                })?,
                client_secret: Secret::new(env::var("PAYPAL_CLIENT_SECRET").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("PAYPAL_CLIENT_SECRET is required"))
                })?),
                page_size: env::var("PAYPAL_PAGE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            },
            sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> SyncSettings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = settings(json!({ "initial_date": "2021-01-01" }));

        assert_eq!(s.chunk_size, 60);
        assert_eq!(s.write_pause(), Duration::from_secs(1));
        assert_eq!(s.report_utc_offset_hours, 0);
        assert!(!s.filter.activate);
        assert_eq!(s.report.currency, "EUR");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let s = settings(json!({ "initial_date": "2021-01-01", "chunk_size": 0 }));
        assert!(matches!(s.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_out_of_range_offset_is_rejected() {
        let s = settings(json!({ "initial_date": "2021-01-01", "report_utc_offset_hours": 30 }));
        assert!(matches!(s.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_overflowing_offset_is_rejected() {
        let s = settings(json!({ "initial_date": "2021-01-01", "report_utc_offset_hours": i32::MAX }));
        assert!(matches!(s.report_offset(), Err(AppError::ConfigError(_))));
        assert!(matches!(s.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_filter_lists() {
        let s = settings(json!({
            "initial_date": "2021-01-01",
            "report_utc_offset_hours": 1,
            "filter": {
                "activate": true,
                "subjects": ["Workshop ticket"],
                "event_codes": ["T1107", "T0006"]
            }
        }));

        assert!(s.filter.activate);
        assert!(s.filter.subjects.contains("Workshop ticket"));
        assert_eq!(s.filter.event_codes.len(), 2);
        assert_eq!(s.report_offset().unwrap().local_minus_utc(), 3600);
    }
}
