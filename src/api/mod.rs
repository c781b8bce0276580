// Market data providers
pub mod dhan;
pub mod fyers;
pub mod http;

pub use dhan::DhanClient;
pub use fyers::FyersClient;
pub use http::{RateLimitedHttp, RequestPolicy};

use crate::error::ScreenerError;
use crate::models::{Candle, Resolution};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// Failure of a single provider call
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider answered but had no candles for the request
    #[error("no data: {0}")]
    NoData(String),

    /// Non-success HTTP status after retries
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<ProviderError> for ScreenerError {
    fn from(err: ProviderError) -> Self {
        ScreenerError::DataUnavailable(err.to_string())
    }
}

/// One polymorphic source of candles; the screening core never sees
/// provider-specific identifiers or auth.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Candles for `provider_id` between `from` and `to` (inclusive dates),
    /// oldest first, timestamped in exchange-local time.
    async fn fetch_candles(
        &self,
        provider_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError>;
}
