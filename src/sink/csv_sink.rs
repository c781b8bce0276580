use super::{QuantitySizing, ResultSink};
use crate::error::ScreenerError;
use crate::models::TradeCandidate;
use async_trait::async_trait;
use std::path::PathBuf;

pub const CSV_HEADER: [&str; 6] = [
    "Date",
    "Stock Name",
    "Approx Qty",
    "Sell Price",
    "SL R1/R2",
    "Target S4/S5",
];

/// Overwrites a CSV file with the candidates of the latest run
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    sizing: QuantitySizing,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, sizing: QuantitySizing) -> Self {
        Self {
            path: path.into(),
            sizing,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// One sheet row: `31 Oct, Name, Qty, 96.70, 101.10/102.20, 93.40/87.76`
    pub fn format_row(&self, row: &TradeCandidate) -> [String; 6] {
        let qty = self
            .sizing
            .approx_quantity(row.entry_price)
            .map(|q| q.to_string())
            .unwrap_or_default();

        [
            row.date.format("%d %b").to_string(),
            row.display_name.clone(),
            qty,
            format!("{:.2}", row.entry_price),
            format!("{:.2}/{:.2}", row.stop_r1, row.stop_r2),
            format!("{:.2}/{:.2}", row.target_s4, row.target_s5),
        ]
    }
}

#[async_trait]
impl ResultSink for CsvSink {
    async fn write(&mut self, rows: &[TradeCandidate]) -> Result<(), ScreenerError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(CSV_HEADER)?;
        for row in rows {
            writer.write_record(self.format_row(row))?;
        }
        writer.flush()?;

        if rows.is_empty() {
            tracing::info!("Cleared {} (no candidates)", self.path.display());
        } else {
            tracing::info!("💾 Wrote {} candidates to {}", rows.len(), self.path.display());
        }
        Ok(())
    }
}
