//! Symbol universe: the tradable list for one scan plus display names
//!
//! Loaded once per run. An empty universe is fatal for the run.

pub mod dhan;
pub mod nifty;

pub use dhan::DhanScripMaster;
pub use nifty::{parse_index_constituents, IndexConstituent, Nifty500Csv};

use crate::error::ScreenerError;
use crate::models::Instrument;
use async_trait::async_trait;
use std::collections::HashMap;

/// Static symbol → company name lookup
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<String, String>,
}

impl NameTable {
    pub fn from_pairs<S, N>(pairs: impl IntoIterator<Item = (S, N)>) -> Self
    where
        S: Into<String>,
        N: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(s, n)| (s.into(), n.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, name: impl Into<String>) {
        self.names.insert(symbol.into(), name.into());
    }

    /// Display name for a symbol, falling back to the symbol itself
    pub fn resolve<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.names.get(symbol).map(String::as_str).unwrap_or(symbol)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Ordered tradable instruments for one run
#[derive(Debug, Clone)]
pub struct Universe {
    instruments: Vec<Instrument>,
    names: NameTable,
}

impl Universe {
    /// Build a universe; fails with `UniverseLoad` when no instrument is mapped
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, ScreenerError> {
        if instruments.is_empty() {
            return Err(ScreenerError::UniverseLoad(
                "no tradable symbols could be mapped to provider identifiers".to_string(),
            ));
        }

        let names = NameTable::from_pairs(instruments.iter().filter_map(|i| {
            i.display_name
                .as_ref()
                .map(|name| (i.symbol.clone(), name.clone()))
        }));

        Ok(Self { instruments, names })
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Supplies the symbol universe for a run
#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn load(&self) -> Result<Universe, ScreenerError>;
}

/// Fixed instrument list, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    instruments: Vec<Instrument>,
}

impl StaticUniverse {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self { instruments }
    }
}

#[async_trait]
impl UniverseSource for StaticUniverse {
    async fn load(&self) -> Result<Universe, ScreenerError> {
        Universe::new(self.instruments.clone())
    }
}
