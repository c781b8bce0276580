//! Extended Camarilla pivot levels
//!
//! Derived from one session's high, low and close. With `range = high - low`:
//! - L1..L4 / H1..H4 sit at `close ∓ range * 1.1 / {12, 6, 4, 2}`
//! - H5 is `high / low * close`, L5 mirrors it below the close
//!
//! L1 > L2 > L3 > L4 and H1 < H2 < H3 < H4 hold whenever `range > 0`.
//! L5/H5 use the ratio formula and are NOT ordered relative to L4/H4.

use crate::error::ScreenerError;
use crate::models::DailyBar;
use serde::{Deserialize, Serialize};

const CAMARILLA_FACTOR: f64 = 1.1;

/// Identifier of a support (L) or resistance (H) level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelId {
    L1,
    L2,
    L3,
    L4,
    L5,
    H1,
    H2,
    H3,
    H4,
    H5,
}

impl LevelId {
    pub const ALL: [LevelId; 10] = [
        LevelId::L1,
        LevelId::L2,
        LevelId::L3,
        LevelId::L4,
        LevelId::L5,
        LevelId::H1,
        LevelId::H2,
        LevelId::H3,
        LevelId::H4,
        LevelId::H5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelId::L1 => "L1",
            LevelId::L2 => "L2",
            LevelId::L3 => "L3",
            LevelId::L4 => "L4",
            LevelId::L5 => "L5",
            LevelId::H1 => "H1",
            LevelId::H2 => "H2",
            LevelId::H3 => "H3",
            LevelId::H4 => "H4",
            LevelId::H5 => "H5",
        }
    }
}

impl std::fmt::Display for LevelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Support/resistance grid for one symbol and one scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotLevels {
    pub l1: f64,
    pub l2: f64,
    pub l3: f64,
    pub l4: f64,
    pub l5: f64,
    pub h1: f64,
    pub h2: f64,
    pub h3: f64,
    pub h4: f64,
    pub h5: f64,
}

impl PivotLevels {
    /// Price at the given level
    pub fn get(&self, level: LevelId) -> f64 {
        match level {
            LevelId::L1 => self.l1,
            LevelId::L2 => self.l2,
            LevelId::L3 => self.l3,
            LevelId::L4 => self.l4,
            LevelId::L5 => self.l5,
            LevelId::H1 => self.h1,
            LevelId::H2 => self.h2,
            LevelId::H3 => self.h3,
            LevelId::H4 => self.h4,
            LevelId::H5 => self.h5,
        }
    }

    /// All ten levels as `(id, price)` pairs, supports first
    pub fn entries(&self) -> Vec<(LevelId, f64)> {
        LevelId::ALL.iter().map(|&id| (id, self.get(id))).collect()
    }

    /// Levels from a prior-day bar
    pub fn from_bar(bar: &DailyBar) -> Result<Self, ScreenerError> {
        calculate_camarilla(bar.high, bar.low, bar.close)
    }
}

/// Calculate extended Camarilla levels
///
/// Fails with `ScreenerError::Domain` when an input is not a positive finite
/// number or `high < low`. `low == 0` would make L5/H5 infinite.
pub fn calculate_camarilla(high: f64, low: f64, close: f64) -> Result<PivotLevels, ScreenerError> {
    for (name, value) in [("high", high), ("low", low), ("close", close)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ScreenerError::Domain(format!(
                "{} must be a positive finite price, got {}",
                name, value
            )));
        }
    }
    if high < low {
        return Err(ScreenerError::Domain(format!(
            "high ({}) is less than low ({})",
            high, low
        )));
    }

    let range = high - low;
    let step = |divisor: f64| range * CAMARILLA_FACTOR / divisor;
    let h5 = high / low * close;

    Ok(PivotLevels {
        l1: close - step(12.0),
        l2: close - step(6.0),
        l3: close - step(4.0),
        l4: close - step(2.0),
        l5: close - (h5 - close),
        h1: close + step(12.0),
        h2: close + step(6.0),
        h3: close + step(4.0),
        h4: close + step(2.0),
        h5,
    })
}
