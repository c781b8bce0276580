use super::http::{RateLimitedHttp, RequestPolicy};
use super::{MarketDataSource, ProviderError};
use crate::market::ExchangeSession;
use crate::models::{Candle, Resolution};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DHAN_API_BASE: &str = "https://api.dhan.co";

const EXCHANGE_SEGMENT: &str = "NSE_EQ";
const INSTRUMENT: &str = "EQUITY";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartRequest<'a> {
    security_id: &'a str,
    exchange_segment: &'a str,
    instrument: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
    from_date: String,
    to_date: String,
}

/// Columnar chart response shared by /charts/historical and /charts/intraday
#[derive(Debug, Default, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    open: Vec<f64>,
    #[serde(default)]
    high: Vec<f64>,
    #[serde(default)]
    low: Vec<f64>,
    #[serde(default)]
    close: Vec<f64>,
    #[serde(default)]
    volume: Vec<f64>,
    #[serde(default)]
    timestamp: Vec<f64>,
}

/// Dhan v2 charts API client
#[derive(Clone)]
pub struct DhanClient {
    http: RateLimitedHttp,
    base_url: String,
    client_id: Option<String>,
    access_token: String,
    session: ExchangeSession,
}

impl DhanClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: Option<String>,
        access_token: impl Into<String>,
        policy: RequestPolicy,
        session: ExchangeSession,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: RateLimitedHttp::new(policy)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.filter(|id| !id.is_empty()),
            access_token: access_token.into(),
            session,
        })
    }

    fn chart_request<'a>(
        &self,
        security_id: &'a str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> (&'static str, ChartRequest<'a>) {
        match resolution {
            // toDate is exclusive on the daily endpoint
            Resolution::Daily => (
                "/v2/charts/historical",
                ChartRequest {
                    security_id,
                    exchange_segment: EXCHANGE_SEGMENT,
                    instrument: INSTRUMENT,
                    interval: None,
                    from_date: from.format("%Y-%m-%d").to_string(),
                    to_date: (to + Duration::days(1)).format("%Y-%m-%d").to_string(),
                },
            ),
            Resolution::Minutes(minutes) => (
                "/v2/charts/intraday",
                ChartRequest {
                    security_id,
                    exchange_segment: EXCHANGE_SEGMENT,
                    instrument: INSTRUMENT,
                    interval: Some(minutes.to_string()),
                    from_date: from.and_time(self.session.open).format("%Y-%m-%d %H:%M:%S").to_string(),
                    to_date: to.and_time(self.session.close).format("%Y-%m-%d %H:%M:%S").to_string(),
                },
            ),
        }
    }

    fn to_candles(&self, security_id: &str, body: ChartResponse) -> Result<Vec<Candle>, ProviderError> {
        let len = body.timestamp.len();
        if len == 0 {
            return Err(ProviderError::NoData(format!("{}: empty chart", security_id)));
        }

        let columns = [
            ("open", body.open.len()),
            ("high", body.high.len()),
            ("low", body.low.len()),
            ("close", body.close.len()),
            ("volume", body.volume.len()),
        ];
        if let Some((name, n)) = columns.iter().find(|(_, n)| *n != len) {
            return Err(ProviderError::Malformed(format!(
                "{}: column '{}' has {} values, expected {}",
                security_id, name, n, len
            )));
        }

        (0..len)
            .map(|i| {
                let ts = body.timestamp[i];
                let timestamp = self
                    .session
                    .localize_epoch(ts as i64)
                    .ok_or_else(|| ProviderError::Malformed(format!("bad timestamp {}", ts)))?;
                Ok(Candle {
                    timestamp,
                    open: body.open[i],
                    high: body.high[i],
                    low: body.low[i],
                    close: body.close[i],
                    volume: body.volume[i],
                })
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataSource for DhanClient {
    fn name(&self) -> &str {
        "dhan"
    }

    async fn fetch_candles(
        &self,
        provider_id: &str,
        resolution: Resolution,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        let (path, request) = self.chart_request(provider_id, resolution, from, to);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .send(self.name(), |client| {
                let builder = client
                    .post(&url)
                    .header("access-token", self.access_token.as_str())
                    .json(&request);
                match &self.client_id {
                    Some(id) => builder.header("client-id", id.as_str()),
                    None => builder,
                }
            })
            .await?;

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let candles = self.to_candles(provider_id, body)?;
        tracing::debug!("Fetched {} {} candles for {}", candles.len(), resolution, provider_id);
        Ok(candles)
    }
}
