use super::{Universe, UniverseSource};
use crate::error::ScreenerError;
use crate::models::Instrument;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;

/// One row of the NSE index constituent list (`ind_nifty500list.csv`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IndexConstituent {
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Series", default = "default_series")]
    pub series: String,
}

fn default_series() -> String {
    "EQ".to_string()
}

impl IndexConstituent {
    /// Fyers instrument code, e.g. `NSE:SBIN-EQ`
    pub fn fyers_symbol(&self) -> String {
        format!("NSE:{}-{}", self.symbol, self.series)
    }
}

/// Parse the constituent CSV; rows without a symbol are skipped
pub fn parse_index_constituents<R: Read>(reader: R) -> Result<Vec<IndexConstituent>, ScreenerError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.deserialize::<IndexConstituent>() {
        let row = record?;
        if row.symbol.is_empty() {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Universe from the index constituent CSV, mapped to Fyers identifiers
#[derive(Debug, Clone)]
pub struct Nifty500Csv {
    path: PathBuf,
}

impl Nifty500Csv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn instruments_from<R: Read>(reader: R) -> Result<Vec<Instrument>, ScreenerError> {
        Ok(parse_index_constituents(reader)?
            .into_iter()
            .map(|row| Instrument {
                provider_id: row.fyers_symbol(),
                symbol: row.symbol,
                display_name: Some(row.company_name),
            })
            .collect())
    }
}

#[async_trait]
impl UniverseSource for Nifty500Csv {
    async fn load(&self) -> Result<Universe, ScreenerError> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            ScreenerError::UniverseLoad(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        let instruments = Self::instruments_from(file)
            .map_err(|e| ScreenerError::UniverseLoad(e.to_string()))?;

        tracing::info!(
            "Loaded {} symbols from {}",
            instruments.len(),
            self.path.display()
        );

        Universe::new(instruments)
    }
}
