// Result sinks: where a finished scan's candidates are published
pub mod csv_sink;
pub mod json_sink;
pub mod ranked;

pub use csv_sink::CsvSink;
pub use json_sink::JsonSink;
pub use ranked::write_ranked_csv;

use crate::error::ScreenerError;
use crate::models::TradeCandidate;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Destination for the candidates of one run
///
/// Called exactly once per run, also when there are no rows, so a sink can
/// clear stale output from an earlier run.
#[async_trait]
pub trait ResultSink: Send {
    async fn write(&mut self, rows: &[TradeCandidate]) -> Result<(), ScreenerError>;
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Csv,
    Json,
}

impl std::str::FromStr for SinkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Approximate position size shown next to each candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantitySizing {
    pub capital_base: f64,
    pub risk_multiplier: f64,
}

impl Default for QuantitySizing {
    fn default() -> Self {
        Self {
            capital_base: 100_000.0,
            risk_multiplier: 4.76,
        }
    }
}

impl QuantitySizing {
    /// `floor(capital_base / sell * risk_multiplier)`, `None` when `sell <= 0`
    pub fn approx_quantity(&self, sell: Decimal) -> Option<u64> {
        let sell = sell.to_f64()?;
        if sell <= 0.0 {
            return None;
        }
        let qty = (self.capital_base / sell * self.risk_multiplier).floor();
        if qty.is_finite() && qty >= 0.0 {
            Some(qty as u64)
        } else {
            None
        }
    }
}

/// Collects rows in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    writes: Arc<Mutex<Vec<Vec<TradeCandidate>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Rows from the most recent write
    pub fn last_rows(&self) -> Vec<TradeCandidate> {
        self.writes
            .lock()
            .ok()
            .and_then(|w| w.last().cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write(&mut self, rows: &[TradeCandidate]) -> Result<(), ScreenerError> {
        self.writes
            .lock()
            .map_err(|_| ScreenerError::Io("memory sink lock poisoned".to_string()))?
            .push(rows.to_vec());
        Ok(())
    }
}
