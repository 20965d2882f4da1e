/*
    conversion.rs - Wincoin exchange rate lookup

    The rate comes from an external HTTP endpoint that answers with a single
    plain-text decimal. Any failure (connect, timeout, non-200, unparseable
    body) is reported as a ConversionError and surfaces to the client as a
    transient external error.
*/

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConversionConfig;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("unparseable rate '{0}'")]
    InvalidRate(String),
}

/// Source of the Wincoin exchange rate
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn rate(&self) -> Result<f64, ConversionError>;
}

/// Fetches the rate over HTTP
#[derive(Debug, Clone)]
pub struct HttpRateConverter {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRateConverter {
    pub fn new(config: &ConversionConfig) -> Self {
        HttpRateConverter {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl CurrencyConverter for HttpRateConverter {
    async fn rate(&self) -> Result<f64, ConversionError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ConversionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConversionError::Request(e.to_string()))?;
        let rate = body
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite() && *r >= 0.0)
            .ok_or_else(|| ConversionError::InvalidRate(body.trim().to_string()))?;

        tracing::debug!(rate, "Fetched conversion rate");
        Ok(rate)
    }
}

/// Constant rate, for tests and offline runs
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub f64);

#[async_trait]
impl CurrencyConverter for FixedRate {
    async fn rate(&self) -> Result<f64, ConversionError> {
        Ok(self.0)
    }
}
