use crate::indicators::{LevelId, PivotLevels};
use crate::models::{Candle, DailyBar};
use serde::{Deserialize, Serialize};

/// Supports checked for a break, nearest first
const BREAKDOWN_SUPPORTS: [LevelId; 3] = [LevelId::L1, LevelId::L2, LevelId::L3];

/// Which confirmation rule set to apply to the opening candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationRule {
    /// Prior-day decline, constructive pivot, opening low under prior low and a support
    #[default]
    Breakdown,
    /// Older rule set: opening high tags H1 while the opening close sits below L1
    ResistanceRejection,
}

impl std::str::FromStr for ConfirmationRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "breakdown" => Ok(Self::Breakdown),
            "resistance_rejection" | "rejection" => Ok(Self::ResistanceRejection),
            other => Err(format!("unknown confirmation rule '{}'", other)),
        }
    }
}

/// Why the opening candle did not confirm a short setup
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Prior session closed at or above its open
    PriorSessionNotDecline { open: f64, close: f64 },
    /// Prior-day pivot is at or below L1
    PivotBelowSupport { pivot: f64, l1: f64 },
    /// Opening low held the prior day's low
    PriorLowHeld { opening_low: f64, prior_low: f64 },
    /// Opening low stayed above L1, L2 and L3
    NoSupportBroken { opening_low: f64, l1: f64 },
    /// Opening high did not reach H1
    ResistanceNotTagged { opening_high: f64, h1: f64 },
    /// Opening close did not fall below L1
    CloseAboveSupport { opening_close: f64, l1: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::PriorSessionNotDecline { open, close } => {
                write!(f, "prior session not a decline (O {:.2} / C {:.2})", open, close)
            }
            RejectReason::PivotBelowSupport { pivot, l1 } => {
                write!(f, "pivot {:.2} not above L1 {:.2}", pivot, l1)
            }
            RejectReason::PriorLowHeld {
                opening_low,
                prior_low,
            } => write!(
                f,
                "opening low {:.2} held prior low {:.2}",
                opening_low, prior_low
            ),
            RejectReason::NoSupportBroken { opening_low, l1 } => {
                write!(f, "opening low {:.2} above L1 {:.2}", opening_low, l1)
            }
            RejectReason::ResistanceNotTagged { opening_high, h1 } => {
                write!(f, "opening high {:.2} below H1 {:.2}", opening_high, h1)
            }
            RejectReason::CloseAboveSupport { opening_close, l1 } => {
                write!(f, "opening close {:.2} not below L1 {:.2}", opening_close, l1)
            }
        }
    }
}

/// Outcome of the confirmation filter for one symbol
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Accepted { broken_level: LevelId },
    Rejected(RejectReason),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accepted { .. })
    }

    pub fn broken_level(&self) -> Option<LevelId> {
        match self {
            FilterDecision::Accepted { broken_level } => Some(*broken_level),
            FilterDecision::Rejected(_) => None,
        }
    }
}

/// Multi-stage breakout confirmation over the opening candle
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationFilter {
    rule: ConfirmationRule,
}

impl ConfirmationFilter {
    pub fn new(rule: ConfirmationRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> ConfirmationRule {
        self.rule
    }

    /// Evaluate the opening candle against the prior-day bar and its levels
    pub fn evaluate(&self, prior: &DailyBar, levels: &PivotLevels, opening: &Candle) -> FilterDecision {
        match self.rule {
            ConfirmationRule::Breakdown => evaluate_breakdown(prior, levels, opening),
            ConfirmationRule::ResistanceRejection => evaluate_rejection(levels, opening),
        }
    }
}

/// All four stages must hold:
/// 1. prior close < prior open
/// 2. prior pivot `(H+L+C)/3` > L1
/// 3. opening low < prior low
/// 4. opening low < at least one of L1, L2, L3; the deepest one broken is reported
fn evaluate_breakdown(prior: &DailyBar, levels: &PivotLevels, opening: &Candle) -> FilterDecision {
    if !prior.is_decline() {
        return FilterDecision::Rejected(RejectReason::PriorSessionNotDecline {
            open: prior.open,
            close: prior.close,
        });
    }

    let pivot = prior.pivot_point();
    if pivot <= levels.l1 {
        return FilterDecision::Rejected(RejectReason::PivotBelowSupport {
            pivot,
            l1: levels.l1,
        });
    }

    if opening.low >= prior.low {
        return FilterDecision::Rejected(RejectReason::PriorLowHeld {
            opening_low: opening.low,
            prior_low: prior.low,
        });
    }

    let mut broken = None;
    for level in BREAKDOWN_SUPPORTS {
        if opening.low < levels.get(level) {
            broken = Some(level);
        }
    }

    match broken {
        Some(broken_level) => FilterDecision::Accepted { broken_level },
        None => FilterDecision::Rejected(RejectReason::NoSupportBroken {
            opening_low: opening.low,
            l1: levels.l1,
        }),
    }
}

fn evaluate_rejection(levels: &PivotLevels, opening: &Candle) -> FilterDecision {
    if opening.high < levels.h1 {
        return FilterDecision::Rejected(RejectReason::ResistanceNotTagged {
            opening_high: opening.high,
            h1: levels.h1,
        });
    }
    if opening.close >= levels.l1 {
        return FilterDecision::Rejected(RejectReason::CloseAboveSupport {
            opening_close: opening.close,
            l1: levels.l1,
        });
    }
    FilterDecision::Accepted {
        broken_level: LevelId::L1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::calculate_camarilla;
    use chrono::{FixedOffset, TimeZone};

    fn candle(day: u32, hh: u32, mm: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: FixedOffset::east_opt(19_800)
                .unwrap()
                .with_ymd_and_hms(2025, 10, day, hh, mm, 0)
                .unwrap(),
            open,
            high,
            low,
            close,
            volume: 10_000.0,
        }
    }

    /// Decline day: O 105, H 110, L 98, C 100 → L1 98.9, L2 97.8, L3 96.7
    fn prior_bar() -> DailyBar {
        candle(30, 0, 0, 105.0, 110.0, 98.0, 100.0)
    }

    fn opening_with_low(low: f64) -> Candle {
        candle(31, 9, 15, 99.0, 99.5, low, low + 1.0)
    }

    fn evaluate(prior: &DailyBar, opening: &Candle) -> FilterDecision {
        let levels = PivotLevels::from_bar(prior).unwrap();
        ConfirmationFilter::default().evaluate(prior, &levels, opening)
    }

    #[test]
    fn test_accepts_l1_break() {
        let decision = evaluate(&prior_bar(), &opening_with_low(97.9));
        assert_eq!(
            decision,
            FilterDecision::Accepted {
                broken_level: LevelId::L1
            }
        );
    }

    #[test]
    fn test_deepest_support_wins() {
        // Breaks L1 (98.9) and L2 (97.8) but not L3 (96.7)
        let decision = evaluate(&prior_bar(), &opening_with_low(97.0));
        assert_eq!(decision.broken_level(), Some(LevelId::L2));

        // 96 breaks all three
        let decision = evaluate(&prior_bar(), &opening_with_low(96.0));
        assert_eq!(decision.broken_level(), Some(LevelId::L3));
    }

    #[test]
    fn test_rejects_when_l1_holds() {
        // Wide prior range pushes L1 below the prior low
        let prior = candle(30, 0, 0, 125.0, 140.0, 98.0, 100.0);
        let levels = PivotLevels::from_bar(&prior).unwrap();
        assert!(levels.l1 < 97.0);

        let decision = ConfirmationFilter::default().evaluate(&prior, &levels, &opening_with_low(97.0));
        assert!(matches!(
            decision,
            FilterDecision::Rejected(RejectReason::NoSupportBroken { .. })
        ));
        assert!(decision.broken_level().is_none());
    }

    #[test]
    fn test_rejects_when_prior_low_holds() {
        // Below L1 (98.9) but above the prior low (98.0)
        let decision = evaluate(&prior_bar(), &opening_with_low(98.5));
        assert!(matches!(
            decision,
            FilterDecision::Rejected(RejectReason::PriorLowHeld { .. })
        ));
    }

    #[test]
    fn test_rejects_prior_up_day() {
        let prior = candle(30, 0, 0, 99.0, 110.0, 98.0, 100.0);
        let decision = evaluate(&prior, &opening_with_low(96.0));
        assert!(matches!(
            decision,
            FilterDecision::Rejected(RejectReason::PriorSessionNotDecline { .. })
        ));
    }

    #[test]
    fn test_rejects_pivot_below_l1() {
        // Close at the high of a wide bar puts L1 above the pivot
        let prior = candle(30, 0, 0, 130.0, 130.0, 70.0, 129.0);
        let levels = PivotLevels::from_bar(&prior).unwrap();
        assert!(prior.pivot_point() <= levels.l1);

        let decision = ConfirmationFilter::default().evaluate(&prior, &levels, &opening_with_low(60.0));
        assert!(matches!(
            decision,
            FilterDecision::Rejected(RejectReason::PivotBelowSupport { .. })
        ));
    }

    #[test]
    fn test_resistance_rejection_rule() {
        let prior = prior_bar();
        let levels = calculate_camarilla(prior.high, prior.low, prior.close).unwrap();
        let filter = ConfirmationFilter::new(ConfirmationRule::ResistanceRejection);

        // Tags H1 (101.1), closes under L1 (98.9)
        let opening = candle(31, 9, 15, 100.0, 101.5, 98.0, 98.5);
        assert_eq!(filter.evaluate(&prior, &levels, &opening).broken_level(), Some(LevelId::L1));

        let no_tag = candle(31, 9, 15, 100.0, 100.5, 98.0, 98.5);
        assert!(matches!(
            filter.evaluate(&prior, &levels, &no_tag),
            FilterDecision::Rejected(RejectReason::ResistanceNotTagged { .. })
        ));

        let close_held = candle(31, 9, 15, 100.0, 101.5, 98.0, 99.5);
        assert!(matches!(
            filter.evaluate(&prior, &levels, &close_held),
            FilterDecision::Rejected(RejectReason::CloseAboveSupport { .. })
        ));
    }

    #[test]
    fn test_rule_from_str() {
        assert_eq!("breakdown".parse::<ConfirmationRule>(), Ok(ConfirmationRule::Breakdown));
        assert_eq!(
            "resistance-rejection".parse::<ConfirmationRule>(),
            Ok(ConfirmationRule::ResistanceRejection)
        );
        assert!("momentum".parse::<ConfirmationRule>().is_err());
    }
}
