//! PayPal Transaction Search client.
//!
//! Authenticates with the client-credentials flow and pages through
//! `/v1/reporting/transactions`. The API rejects date ranges longer than
//! 31 days, which the caller guarantees by fetching month-bounded windows.

use crate::config::PaypalConfig;
use crate::models::{DateWindow, TransactionPage};
use crate::services::metrics::record_source_request;
use crate::sync::ports::TransactionSource;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Timestamp layout accepted by the reporting API.
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

pub struct PaypalClient {
    client: Client,
    config: PaypalConfig,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

fn api_timestamp(at: DateTime<FixedOffset>) -> String {
    at.format(API_TIMESTAMP_FORMAT).to_string()
}

impl PaypalClient {
    pub fn new(config: PaypalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        })
    }

    /// A valid access token, requesting a new one when the cached token is near expiry.
    async fn token(&self) -> Result<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    debug!("Using cached PayPal token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        let token = self.acquire_token().await?;
        let mut cache = self.cached_token.write().await;
        *cache = Some(token.clone());
        Ok(token.access_token)
    }

    #[instrument(skip(self))]
    async fn acquire_token(&self) -> Result<CachedToken> {
        let url = format!("{}/v1/oauth2/token", self.config.api_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("PayPal token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            record_source_request("auth_failed");
            return Err(anyhow!(
                "PayPal token request failed with status {}: {}",
                status,
                body
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse PayPal token response")?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        info!(expires_at = %expires_at, "Acquired PayPal access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }

    async fn invalidate_token(&self) {
        *self.cached_token.write().await = None;
    }
}

#[async_trait]
impl TransactionSource for PaypalClient {
    #[instrument(skip(self), fields(window = %window, page = page))]
    async fn fetch_page(&self, window: &DateWindow, page: u32) -> Result<TransactionPage> {
        let token = self.token().await?;
        let url = format!("{}/v1/reporting/transactions", self.config.api_url);
        let page_size = self.config.page_size.to_string();
        let page_number = page.to_string();

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("start_date", api_timestamp(window.start()).as_str()),
                ("end_date", api_timestamp(window.end()).as_str()),
                ("fields", "all"),
                ("page_size", page_size.as_str()),
                ("page", page_number.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                record_source_request("transport_error");
                anyhow!("PayPal transaction request failed: {}", e)
            })?;

        let status = response.status();
        let body = response.text().await.context("Failed to read PayPal response")?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("PayPal rejected the access token, dropping it");
            self.invalidate_token().await;
        }
        if !status.is_success() {
            record_source_request("error");
            return Err(anyhow!(
                "PayPal transaction search failed with status {}: {}",
                status,
                body
            ));
        }

        let page: TransactionPage = serde_json::from_str(&body).map_err(|e| {
            record_source_request("invalid_body");
            anyhow!("Failed to decode PayPal transaction page: {}", e)
        })?;
        record_source_request("success");
        Ok(page)
    }
}
