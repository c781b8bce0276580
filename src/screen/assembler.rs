use crate::error::ScreenerError;
use crate::indicators::{LevelId, PivotLevels};
use crate::models::{DeclineCandidate, TradeCandidate};
use crate::universe::NameTable;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places for published prices
pub const PRICE_DECIMALS: u32 = 2;

/// Round a price to 2 decimals, half away from zero
///
/// For positive prices this is round-half-up. The rounding applies to the
/// decimal form of the float, so `98.165` becomes `98.17`.
pub fn round_price(value: f64) -> Result<Decimal, ScreenerError> {
    let decimal = Decimal::from_f64(value)
        .ok_or_else(|| ScreenerError::Domain(format!("cannot represent {} as a price", value)))?;
    Ok(decimal.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
}

/// Build the published short-trade record for an accepted symbol
///
/// Entry sells at the broken support, stops sit at H1/H2 and targets at L4/L5.
pub fn assemble_candidate(
    scan_date: NaiveDate,
    broken_level: LevelId,
    levels: &PivotLevels,
    decline: &DeclineCandidate,
    names: &NameTable,
) -> Result<TradeCandidate, ScreenerError> {
    Ok(TradeCandidate {
        symbol: decline.symbol.clone(),
        display_name: names.resolve(&decline.symbol).to_string(),
        date: scan_date,
        entry_price: round_price(levels.get(broken_level))?,
        stop_r1: round_price(levels.h1)?,
        stop_r2: round_price(levels.h2)?,
        target_s4: round_price(levels.l4)?,
        target_s5: round_price(levels.l5)?,
        broken_level,
        change_pct: round_price(decline.change_pct)?,
    })
}
