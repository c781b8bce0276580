// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod indicators;
pub mod market;
pub mod models;
pub mod pipeline;
pub mod screen;
pub mod sink;
pub mod universe;

// Re-export commonly used types
pub use api::{MarketDataSource, ProviderError};
pub use error::{ScreenerError, SkipReason, SymbolOutcome};
pub use models::*;
pub use pipeline::{ScanOptions, ScanPipeline, ScanReport};
pub use sink::ResultSink;
pub use universe::{Universe, UniverseSource};

// Error handling
pub type Result<T> = std::result::Result<T, ScreenerError>;
