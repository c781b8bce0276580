use super::http::{RateLimitedHttp, RequestPolicy};
use super::{MarketDataSource, ProviderError};
use crate::market::ExchangeSession;
use crate::models::{Candle, Resolution};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

pub const FYERS_API_BASE: &str = "https://api-t1.fyers.in";

/// Response from /data/history
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    s: String,
    #[serde(default)]
    candles: Option<Vec<[f64; 6]>>, // [epoch, open, high, low, close, volume]
    #[serde(default)]
    message: Option<String>,
}

/// Fyers v3 history API client
#[derive(Clone)]
pub struct FyersClient {
    http: RateLimitedHttp,
    base_url: String,
    auth_header: String,
    session: ExchangeSession,
}

impl FyersClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: &str,
        access_token: &str,
        policy: RequestPolicy,
        session: ExchangeSession,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: RateLimitedHttp::new(policy)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: format!("{}:{}", client_id, access_token),
            session,
        })
    }

    fn to_candles(&self, provider_id: &str, body: HistoryResponse) -> Result<Vec<Candle>, ProviderError> {
        if body.s != "ok" {
            return Err(ProviderError::NoData(format!(
                "{}: {}",
                provider_id,
                body.message.unwrap_or_else(|| format!("status '{}'", body.s))
            )));
        }

        let rows = body.candles.unwrap_or_default();
        if rows.is_empty() {
            return Err(ProviderError::NoData(format!("{}: empty candle list", provider_id)));
        }

        rows.into_iter()
            .map(|[ts, open, high, low, close, volume]| {
                let timestamp = self
                    .session
                    .localize_epoch(ts as i64)
                    .ok_or_else(|| ProviderError::Malformed(format!("bad timestamp {}", ts)))?;
                Ok(Candle {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataSource for FyersClient {
    fn name(&self) -> &str {
        "fyers"
    }

    async fn fetch_candles(
        &self,
        provider_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        let url = format!("{}/data/history", self.base_url);
        let resolution = resolution.to_string();
        let range_from = from.format("%Y-%m-%d").to_string();
        let range_to = to.format("%Y-%m-%d").to_string();

        let response = self
            .http
            .send(self.name(), |client| {
                client
                    .get(&url)
                    .header("Authorization", self.auth_header.as_str())
                    .query(&[
                        ("symbol", provider_id),
                        ("resolution", resolution.as_str()),
                        ("date_format", "1"),
                        ("range_from", range_from.as_str()),
                        ("range_to", range_to.as_str()),
                        ("cont_flag", "1"),
                    ])
            })
            .await?;

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let candles = self.to_candles(provider_id, body)?;
        tracing::debug!("Fetched {} {} candles for {}", candles.len(), resolution, provider_id);
        Ok(candles)
    }
}
