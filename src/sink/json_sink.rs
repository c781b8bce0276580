use super::ResultSink;
use crate::error::ScreenerError;
use crate::models::TradeCandidate;
use async_trait::async_trait;
use std::path::PathBuf;

/// Writes the candidates as a pretty-printed JSON array
#[derive(Debug, Clone)]
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultSink for JsonSink {
    async fn write(&mut self, rows: &[TradeCandidate]) -> Result<(), ScreenerError> {
        let body = serde_json::to_string_pretty(rows)
            .map_err(|e| ScreenerError::Io(format!("JSON encode failed: {}", e)))?;
        tokio::fs::write(&self.path, body).await?;

        tracing::info!("💾 Wrote {} candidates to {}", rows.len(), self.path.display());
        Ok(())
    }
}
