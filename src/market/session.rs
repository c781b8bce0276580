use crate::models::{Candle, DailyBar};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Exchange trading session in its local timezone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeSession {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl ExchangeSession {
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            timezone,
            open,
            close,
        }
    }

    /// Convert provider epoch seconds (UTC) into exchange-local time
    pub fn localize_epoch(&self, epoch_secs: i64) -> Option<DateTime<FixedOffset>> {
        Utc.timestamp_opt(epoch_secs, 0)
            .single()
            .map(|utc| utc.with_timezone(&self.timezone).fixed_offset())
    }

    /// Current trading date at the exchange
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

impl Default for ExchangeSession {
    /// NSE cash market: 09:15 to 15:30 IST
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            open: NaiveTime::from_hms_opt(9, 15, 0).expect("valid session open"),
            close: NaiveTime::from_hms_opt(15, 30, 0).expect("valid session close"),
        }
    }
}

/// The candle starting exactly at `session_open` on `scan_date` (exchange-local)
pub fn find_opening_candle(
    candles: &[Candle],
    scan_date: NaiveDate,
    session_open: NaiveTime,
) -> Option<&Candle> {
    candles
        .iter()
        .find(|c| c.date() == scan_date && c.timestamp.time() == session_open)
}

/// Prior session bar for a scan date
///
/// Requires at least two daily bars. Returns the last bar dated strictly
/// before `scan_date`, which is the second-to-last bar when the provider
/// already includes the in-progress scan day.
pub fn previous_session(bars: &[DailyBar], scan_date: NaiveDate) -> Option<&DailyBar> {
    if bars.len() < 2 {
        return None;
    }
    bars.iter().rev().find(|bar| bar.date() < scan_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(19_800).unwrap()
    }

    fn bar_at(y: i32, m: u32, d: u32, hh: u32, mm: u32, close: f64) -> Candle {
        Candle {
            timestamp: ist().with_ymd_and_hms(y, m, d, hh, mm, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_localize_epoch_to_ist() {
        let session = ExchangeSession::default();
        // 2025-10-31 03:45:00 UTC == 09:15 IST
        let local = session.localize_epoch(1_761_882_300).unwrap();
        assert_eq!(local.date_naive(), date(2025, 10, 31));
        assert_eq!(local.time(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(local.offset().local_minus_utc(), 19_800);
    }

    #[test]
    fn test_daily_epoch_lands_on_local_date() {
        let session = ExchangeSession::default();
        // Daily bars are stamped at local midnight: 2025-10-30 18:30 UTC
        let local = session.localize_epoch(1_761_849_000).unwrap();
        assert_eq!(local.date_naive(), date(2025, 10, 31));
    }

    #[test]
    fn test_find_opening_candle() {
        let open = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        let candles = vec![
            bar_at(2025, 10, 30, 9, 15, 90.0),
            bar_at(2025, 10, 31, 9, 15, 100.0),
            bar_at(2025, 10, 31, 9, 20, 101.0),
        ];

        let first = find_opening_candle(&candles, date(2025, 10, 31), open).unwrap();
        assert_eq!(first.close, 100.0);

        let late_start = &candles[2..];
        assert!(find_opening_candle(late_start, date(2025, 10, 31), open).is_none());
    }

    #[test]
    fn test_previous_session_skips_current_day() {
        let bars = vec![
            bar_at(2025, 10, 29, 0, 0, 98.0),
            bar_at(2025, 10, 30, 0, 0, 100.0),
            bar_at(2025, 10, 31, 0, 0, 97.0),
        ];

        let prev = previous_session(&bars, date(2025, 10, 31)).unwrap();
        assert_eq!(prev.close, 100.0);
    }

    #[test]
    fn test_previous_session_without_current_day_bar() {
        let bars = vec![
            bar_at(2025, 10, 29, 0, 0, 98.0),
            bar_at(2025, 10, 30, 0, 0, 100.0),
        ];

        let prev = previous_session(&bars, date(2025, 10, 31)).unwrap();
        assert_eq!(prev.close, 100.0);
    }

    #[test]
    fn test_previous_session_needs_two_bars() {
        let bars = vec![bar_at(2025, 10, 30, 0, 0, 100.0)];
        assert!(previous_session(&bars, date(2025, 10, 31)).is_none());
        assert!(previous_session(&[], date(2025, 10, 31)).is_none());
    }
}
