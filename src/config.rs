//! Layered settings: built-in defaults, optional TOML file, `SCREENER__*` env vars
//!
//! ```text
//! SCREENER__PROVIDER__KIND=dhan
//! SCREENER__PROVIDER__DHAN__ACCESS_TOKEN=...
//! SCREENER__SCAN__MAX_DECLINERS=30
//! ```

use crate::api::dhan::DHAN_API_BASE;
use crate::api::fyers::FYERS_API_BASE;
use crate::api::{DhanClient, FyersClient, MarketDataSource, RequestPolicy};
use crate::error::ScreenerError;
use crate::market::ExchangeSession;
use crate::screen::{ConfirmationRule, DEFAULT_MAX_DECLINERS};
use crate::sink::{CsvSink, JsonSink, QuantitySizing, ResultSink, SinkFormat};
use crate::universe::dhan::DEFAULT_SCRIP_MASTER_URL;
use crate::universe::{DhanScripMaster, Nifty500Csv, UniverseSource};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "screener.toml";
pub const ENV_PREFIX: &str = "SCREENER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanSettings,
    pub exchange: ExchangeSettings,
    pub provider: ProviderSettings,
    pub universe: UniverseSettings,
    pub sink: SinkSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub max_decliners: usize,
    pub daily_lookback_days: i64,
    pub intraday_minutes: u32,
    pub rule: ConfirmationRule,
    pub concurrency: usize,
    /// Defaults to the current exchange-local date
    pub scan_date: Option<NaiveDate>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_decliners: DEFAULT_MAX_DECLINERS,
            daily_lookback_days: 7,
            intraday_minutes: 5,
            rule: ConfirmationRule::default(),
            concurrency: 1,
            scan_date: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub timezone: String,
    pub session_open: String,
    pub session_close: String,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            timezone: "Asia/Kolkata".to_string(),
            session_open: "09:15:00".to_string(),
            session_close: "15:30:00".to_string(),
        }
    }
}

impl ExchangeSettings {
    pub fn session(&self) -> Result<ExchangeSession, ScreenerError> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| ScreenerError::Config(format!("exchange.timezone: {}", e)))?;
        Ok(ExchangeSession::new(
            timezone,
            parse_time("exchange.session_open", &self.session_open)?,
            parse_time("exchange.session_close", &self.session_close)?,
        ))
    }
}

fn parse_time(key: &str, value: &str) -> Result<NaiveTime, ScreenerError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|e| ScreenerError::Config(format!("{} '{}': {}", key, value, e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Fyers,
    Dhan,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fyers" => Ok(Self::Fyers),
            "dhan" => Ok(Self::Dhan),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub fyers: Credentials,
    pub dhan: Credentials,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            requests_per_second: 10,
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 2000,
            fyers: Credentials::default(),
            dhan: Credentials::default(),
        }
    }
}

impl ProviderSettings {
    pub fn policy(&self) -> RequestPolicy {
        RequestPolicy {
            requests_per_second: self.requests_per_second,
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UniverseSettings {
    pub symbols_csv: PathBuf,
    /// Dhan scrip master: local path or URL
    pub scrip_master: String,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            symbols_csv: PathBuf::from("ind_nifty500list.csv"),
            scrip_master: DEFAULT_SCRIP_MASTER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub path: PathBuf,
    pub format: SinkFormat,
    /// Optional per-symbol diagnostic of the ranked decliners
    pub ranked_path: Option<PathBuf>,
    pub capital_base: f64,
    pub risk_multiplier: f64,
}

impl Default for SinkSettings {
    fn default() -> Self {
        let sizing = QuantitySizing::default();
        Self {
            path: PathBuf::from("support_breakers.csv"),
            format: SinkFormat::default(),
            ranked_path: None,
            capital_base: sizing.capital_base,
            risk_multiplier: sizing.risk_multiplier,
        }
    }
}

impl Settings {
    /// Load from `path` (required) or `screener.toml` (optional), then env
    pub fn load(path: Option<&Path>) -> Result<Self, ScreenerError> {
        Self::from_sources(path, Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    pub fn from_sources(path: Option<&Path>, env: Environment) -> Result<Self, ScreenerError> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ScreenerError> {
        if self.scan.max_decliners == 0 {
            return Err(ScreenerError::Config("scan.max_decliners must be at least 1".into()));
        }
        if self.scan.concurrency == 0 {
            return Err(ScreenerError::Config("scan.concurrency must be at least 1".into()));
        }
        if self.scan.intraday_minutes == 0 {
            return Err(ScreenerError::Config("scan.intraday_minutes must be positive".into()));
        }
        if self.scan.daily_lookback_days < 2 {
            return Err(ScreenerError::Config(
                "scan.daily_lookback_days must cover at least two sessions".into(),
            ));
        }
        self.exchange.session()?;
        Ok(())
    }

    pub fn sizing(&self) -> QuantitySizing {
        QuantitySizing {
            capital_base: self.sink.capital_base,
            risk_multiplier: self.sink.risk_multiplier,
        }
    }

    /// Provider client for `provider.kind`
    pub fn market_source(&self) -> Result<Arc<dyn MarketDataSource>, ScreenerError> {
        let session = self.exchange.session()?;
        let policy = self.provider.policy();

        match self.provider.kind {
            ProviderKind::Fyers => {
                let creds = &self.provider.fyers;
                let client_id = require(&creds.client_id, "provider.fyers.client_id")?;
                let token = require(&creds.access_token, "provider.fyers.access_token")?;
                let base_url = creds.base_url.as_deref().unwrap_or(FYERS_API_BASE);
                let client = FyersClient::new(base_url, client_id, token, policy, session)
                    .map_err(|e| ScreenerError::Config(format!("fyers client: {}", e)))?;
                Ok(Arc::new(client))
            }
            ProviderKind::Dhan => {
                let creds = &self.provider.dhan;
                let token = require(&creds.access_token, "provider.dhan.access_token")?;
                let base_url = creds.base_url.as_deref().unwrap_or(DHAN_API_BASE);
                let client = DhanClient::new(base_url, creds.client_id.clone(), token, policy, session)
                    .map_err(|e| ScreenerError::Config(format!("dhan client: {}", e)))?;
                Ok(Arc::new(client))
            }
        }
    }

    /// Universe loader matching the provider's identifier scheme
    pub fn universe_source(&self) -> Box<dyn UniverseSource> {
        match self.provider.kind {
            ProviderKind::Fyers => Box::new(Nifty500Csv::new(&self.universe.symbols_csv)),
            ProviderKind::Dhan => Box::new(DhanScripMaster::new(
                &self.universe.symbols_csv,
                self.universe.scrip_master.clone(),
            )),
        }
    }

    pub fn result_sink(&self) -> Box<dyn ResultSink> {
        match self.sink.format {
            SinkFormat::Csv => Box::new(CsvSink::new(&self.sink.path, self.sizing())),
            SinkFormat::Json => Box::new(JsonSink::new(&self.sink.path)),
        }
    }
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ScreenerError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ScreenerError::Config(format!("{} is not set", key)))
}
