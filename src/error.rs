use crate::models::TradeCandidate;
use crate::screen::RejectReason;
use thiserror::Error;

/// Errors raised by the screener library
#[derive(Error, Debug)]
pub enum ScreenerError {
    /// Candle data for one symbol is missing, empty or too short
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Invalid numeric input, e.g. a pivot bar with `low = 0`
    #[error("Invalid input: {0}")]
    Domain(String),

    /// The symbol universe could not be loaded; the run is aborted
    #[error("Universe load failed: {0}")]
    UniverseLoad(String),

    /// Persisting results failed. The computed rows are kept so the caller can retry.
    #[error("Failed to write results: {message}")]
    SinkWrite {
        message: String,
        candidates: Vec<TradeCandidate>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ScreenerError {
    fn from(err: std::io::Error) -> Self {
        ScreenerError::Io(err.to_string())
    }
}

impl From<csv::Error> for ScreenerError {
    fn from(err: csv::Error) -> Self {
        ScreenerError::Io(format!("CSV error: {}", err))
    }
}

impl From<::config::ConfigError> for ScreenerError {
    fn from(err: ::config::ConfigError) -> Self {
        ScreenerError::Config(err.to_string())
    }
}

/// Why a symbol was dropped from a scan stage
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Provider failed or returned no candles
    NoData(String),
    /// Fewer than two daily bars in the lookback window
    InsufficientHistory { bars: usize },
    /// No candle at the session open on the scan date
    MissingOpeningCandle,
    /// Prior close was zero or not finite
    ZeroPriorClose,
    /// Prior-day bar cannot produce pivot levels
    InvalidLevels(String),
    /// Data was fine but the confirmation rules did not all hold
    NotConfirmed(RejectReason),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoData(msg) => write!(f, "no data: {}", msg),
            SkipReason::InsufficientHistory { bars } => {
                write!(f, "insufficient daily history ({} bars)", bars)
            }
            SkipReason::MissingOpeningCandle => write!(f, "no opening candle"),
            SkipReason::ZeroPriorClose => write!(f, "prior close is zero"),
            SkipReason::InvalidLevels(msg) => write!(f, "invalid pivot input: {}", msg),
            SkipReason::NotConfirmed(reason) => write!(f, "not confirmed: {}", reason),
        }
    }
}

/// Result of processing one symbol in a batch
///
/// `Skipped` covers expected gaps (missing data, corrupt bars, rejected
/// filters). `Fatal` is any other `ScreenerError` raised for that symbol; the
/// batch still continues. Provider failures always map to `DataUnavailable`,
/// so with the built-in sources a scan reports no fatals.
#[derive(Debug)]
pub enum SymbolOutcome<T> {
    Ok(T),
    Skipped(SkipReason),
    Fatal(ScreenerError),
}

impl<T> SymbolOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            SymbolOutcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SymbolOutcome::Skipped(_))
    }
}

impl<T> From<ScreenerError> for SymbolOutcome<T> {
    fn from(err: ScreenerError) -> Self {
        match err {
            ScreenerError::DataUnavailable(msg) => SymbolOutcome::Skipped(SkipReason::NoData(msg)),
            ScreenerError::Domain(msg) => SymbolOutcome::Skipped(SkipReason::InvalidLevels(msg)),
            other => SymbolOutcome::Fatal(other),
        }
    }
}
