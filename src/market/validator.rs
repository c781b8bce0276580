use crate::models::Candle;

/// Validates provider OHLC bars before they reach the screening rules
pub struct CandleValidator;

impl CandleValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a candle for correctness
    pub fn validate(&self, candle: &Candle) -> Result<(), String> {
        self.validate_prices(candle)?;
        self.validate_ohlc_relationship(candle)?;
        Ok(())
    }

    /// Keep only valid bars, logging each dropped one
    pub fn retain_valid(&self, symbol: &str, candles: Vec<Candle>) -> Vec<Candle> {
        candles
            .into_iter()
            .filter(|candle| match self.validate(candle) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        "Dropping {} bar at {}: {}",
                        symbol,
                        candle.timestamp,
                        e
                    );
                    false
                }
            })
            .collect()
    }

    /// Prices must be positive and finite
    fn validate_prices(&self, candle: &Candle) -> Result<(), String> {
        for (name, value) in [
            ("open", candle.open),
            ("high", candle.high),
            ("low", candle.low),
            ("close", candle.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("Invalid {} price: {}", name, value));
            }
        }
        // Zero volume happens on illiquid opening bars
        if !candle.volume.is_finite() || candle.volume < 0.0 {
            return Err(format!("Invalid volume: {}", candle.volume));
        }
        Ok(())
    }

    /// Validate OHLC relationships (high >= low, open/close inside the range)
    fn validate_ohlc_relationship(&self, candle: &Candle) -> Result<(), String> {
        if candle.high < candle.low {
            return Err(format!(
                "High ({}) is less than low ({})",
                candle.high, candle.low
            ));
        }

        if candle.high < candle.open.max(candle.close) {
            return Err(format!(
                "High ({}) is below open/close ({}/{})",
                candle.high, candle.open, candle.close
            ));
        }

        if candle.low > candle.open.min(candle.close) {
            return Err(format!(
                "Low ({}) is above open/close ({}/{})",
                candle.low, candle.open, candle.close
            ));
        }

        Ok(())
    }
}

impl Default for CandleValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn make_valid_candle() -> Candle {
        Candle {
            timestamp: FixedOffset::east_opt(19_800)
                .unwrap()
                .with_ymd_and_hms(2025, 10, 31, 9, 15, 0)
                .unwrap(),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 25_000.0,
        }
    }

    #[test]
    fn test_validate_valid_candle() {
        let validator = CandleValidator::new();
        assert!(validator.validate(&make_valid_candle()).is_ok());
    }

    #[test]
    fn test_validate_non_positive_prices() {
        let validator = CandleValidator::new();

        let mut candle = make_valid_candle();
        candle.open = -100.0;
        assert!(validator
            .validate(&candle)
            .unwrap_err()
            .contains("Invalid open price"));

        let mut candle = make_valid_candle();
        candle.low = 0.0;
        assert!(validator
            .validate(&candle)
            .unwrap_err()
            .contains("Invalid low price"));

        let mut candle = make_valid_candle();
        candle.close = f64::NAN;
        assert!(validator
            .validate(&candle)
            .unwrap_err()
            .contains("Invalid close price"));
    }

    #[test]
    fn test_validate_volume() {
        let validator = CandleValidator::new();

        let mut candle = make_valid_candle();
        candle.volume = 0.0;
        assert!(validator.validate(&candle).is_ok());

        candle.volume = -1.0;
        assert!(validator.validate(&candle).unwrap_err().contains("Invalid volume"));
    }

    #[test]
    fn test_validate_high_less_than_low() {
        let validator = CandleValidator::new();
        let mut candle = make_valid_candle();
        candle.high = 98.0;

        let err = validator.validate(&candle).unwrap_err();
        assert!(err.contains("less than low"));
    }

    #[test]
    fn test_validate_open_close_outside_range() {
        let validator = CandleValidator::new();

        let mut candle = make_valid_candle();
        candle.close = 105.0;
        assert!(validator.validate(&candle).unwrap_err().contains("below open/close"));

        let mut candle = make_valid_candle();
        candle.open = 98.5;
        assert!(validator.validate(&candle).unwrap_err().contains("above open/close"));
    }

    #[test]
    fn test_retain_valid_drops_bad_bars() {
        let validator = CandleValidator::new();
        let mut bad = make_valid_candle();
        bad.high = 1.0;

        let kept = validator.retain_valid("SBIN", vec![make_valid_candle(), bad]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0], make_valid_candle());
    }
}
