use crate::models::DeclineCandidate;

/// Default number of decliners carried into the confirmation stage
pub const DEFAULT_MAX_DECLINERS: usize = 50;

/// Opening-candle observation for one symbol, before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct DeclineObservation {
    pub symbol: String,
    pub provider_id: String,
    pub display_name: String,
    /// Close of the opening candle; `None` when it could not be resolved
    pub opening_close: Option<f64>,
    pub prior_close: Option<f64>,
}

impl DeclineObservation {
    /// Percentage change of the opening close versus the prior close
    ///
    /// `None` when either price is missing or the prior close is zero.
    pub fn change_pct(&self) -> Option<f64> {
        let opening = self.opening_close?;
        let prior = self.prior_close?;
        if prior == 0.0 || !prior.is_finite() || !opening.is_finite() {
            return None;
        }
        Some((opening - prior) / prior * 100.0)
    }
}

/// Rank observations by change percent, biggest losers first
///
/// Symbols without a resolvable change are dropped silently. The sort is
/// stable, so equal changes keep their input order. At most `max_count`
/// candidates are returned.
pub fn rank_decliners(
    observations: impl IntoIterator<Item = DeclineObservation>,
    max_count: usize,
) -> Vec<DeclineCandidate> {
    let mut candidates: Vec<DeclineCandidate> = observations
        .into_iter()
        .filter_map(|obs| {
            let change_pct = obs.change_pct()?;
            Some(DeclineCandidate {
                opening_close: obs.opening_close?,
                prior_close: obs.prior_close?,
                symbol: obs.symbol,
                provider_id: obs.provider_id,
                display_name: obs.display_name,
                change_pct,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.change_pct.total_cmp(&b.change_pct));
    candidates.truncate(max_count);

    tracing::debug!(
        "Ranked {} decliners (max {})",
        candidates.len(),
        max_count
    );

    candidates
}
