use super::nifty::parse_index_constituents;
use super::{Universe, UniverseSource};
use crate::error::ScreenerError;
use crate::models::Instrument;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SCRIP_MASTER_URL: &str = "https://images.dhan.co/api-data/api-scrip-master.csv";

// The full master is tens of MB
const SCRIP_MASTER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct ScripRow {
    #[serde(rename = "SEM_EXM_EXCH_ID")]
    exchange: String,
    #[serde(rename = "SEM_INSTRUMENT", default)]
    instrument: String,
    #[serde(rename = "SEM_TRADING_SYMBOL")]
    trading_symbol: String,
    #[serde(rename = "SEM_SECURITY_ID")]
    security_id: String,
}

/// NSE cash-equity trading symbol → Dhan security id
///
/// Rows that fail to parse are skipped; only an unreadable header fails.
pub fn parse_scrip_master<R: Read>(reader: R) -> Result<HashMap<String, String>, ScreenerError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    csv_reader.headers()?;

    let mut map = HashMap::new();
    let mut malformed = 0usize;
    for record in csv_reader.deserialize::<ScripRow>() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                malformed += 1;
                tracing::debug!("Skipping scrip master row: {}", e);
                continue;
            }
        };
        if row.exchange != "NSE" || row.instrument != "E" {
            continue;
        }
        let symbol = row.trading_symbol.replace("-EQ", "");
        map.insert(symbol, row.security_id);
    }

    if malformed > 0 {
        tracing::warn!("⚠️  Skipped {} malformed scrip master rows", malformed);
    }
    Ok(map)
}

/// Universe from the index constituent CSV mapped through Dhan's scrip master
///
/// `scrip_master` is a local path or an `http(s)://` URL. Symbols with no
/// security id are dropped with a warning.
#[derive(Debug, Clone)]
pub struct DhanScripMaster {
    symbols_csv: PathBuf,
    scrip_master: String,
    http: reqwest::Client,
}

impl DhanScripMaster {
    pub fn new(symbols_csv: impl Into<PathBuf>, scrip_master: impl Into<String>) -> Self {
        Self {
            symbols_csv: symbols_csv.into(),
            scrip_master: scrip_master.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn read_scrip_master(&self) -> Result<HashMap<String, String>, ScreenerError> {
        let parsed = if self.scrip_master.starts_with("http://") || self.scrip_master.starts_with("https://") {
            tracing::info!("Downloading scrip master from {}", self.scrip_master);
            let body = self
                .http
                .get(&self.scrip_master)
                .timeout(SCRIP_MASTER_TIMEOUT)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ScreenerError::UniverseLoad(format!("scrip master download failed: {}", e)))?
                .bytes()
                .await
                .map_err(|e| ScreenerError::UniverseLoad(format!("scrip master read failed: {}", e)))?;
            parse_scrip_master(body.as_ref())
        } else {
            let file = std::fs::File::open(&self.scrip_master).map_err(|e| {
                ScreenerError::UniverseLoad(format!("cannot open {}: {}", self.scrip_master, e))
            })?;
            parse_scrip_master(file)
        };
        parsed.map_err(|e| ScreenerError::UniverseLoad(e.to_string()))
    }

    /// Join constituents against the scrip master, keeping constituent order
    pub fn map_instruments<R: Read>(
        constituents: R,
        security_ids: &HashMap<String, String>,
    ) -> Result<Vec<Instrument>, ScreenerError> {
        let mut instruments = Vec::new();
        for row in parse_index_constituents(constituents)? {
            match security_ids.get(&row.symbol) {
                Some(id) => instruments.push(Instrument {
                    provider_id: id.clone(),
                    symbol: row.symbol,
                    display_name: Some(row.company_name),
                }),
                None => tracing::warn!("⚠️  No Dhan security id for {}, dropping", row.symbol),
            }
        }
        Ok(instruments)
    }
}

#[async_trait]
impl UniverseSource for DhanScripMaster {
    async fn load(&self) -> Result<Universe, ScreenerError> {
        let security_ids = self.read_scrip_master().await?;
        let file = std::fs::File::open(&self.symbols_csv).map_err(|e| {
            ScreenerError::UniverseLoad(format!("cannot open {}: {}", self.symbols_csv.display(), e))
        })?;
        let instruments = Self::map_instruments(file, &security_ids)
            .map_err(|e| ScreenerError::UniverseLoad(e.to_string()))?;

        tracing::info!(
            "Mapped {} symbols to Dhan security ids ({} in scrip master)",
            instruments.len(),
            security_ids.len()
        );

        Universe::new(instruments)
    }
}
