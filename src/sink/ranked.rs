//! Per-symbol diagnostic for the ranked decliners of a run
//!
//! One row per screened decliner, in rank order, with a match flag and the
//! broken level for those that became candidates.

use crate::error::ScreenerError;
use crate::models::{DeclineCandidate, TradeCandidate};
use std::collections::HashMap;
use std::path::Path;

pub const RANKED_HEADER: [&str; 8] = [
    "Rank",
    "Symbol",
    "Stock Name",
    "Prior Close",
    "Opening Close",
    "Change %",
    "Matched",
    "Broken Level",
];

fn ranked_rows(ranked: &[DeclineCandidate], candidates: &[TradeCandidate]) -> Vec<[String; 8]> {
    let matched: HashMap<&str, &TradeCandidate> =
        candidates.iter().map(|c| (c.symbol.as_str(), c)).collect();

    ranked
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let hit = matched.get(d.symbol.as_str());
            [
                (i + 1).to_string(),
                d.symbol.clone(),
                d.display_name.clone(),
                format!("{:.2}", d.prior_close),
                format!("{:.2}", d.opening_close),
                format!("{:.2}", d.change_pct),
                if hit.is_some() { "YES" } else { "NO" }.to_string(),
                hit.map(|c| c.broken_level.to_string()).unwrap_or_default(),
            ]
        })
        .collect()
}

/// Overwrite `path` with the ranked decliners and their filter outcome
pub fn write_ranked_csv(
    path: &Path,
    ranked: &[DeclineCandidate],
    candidates: &[TradeCandidate],
) -> Result<(), ScreenerError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(RANKED_HEADER)?;
    for row in ranked_rows(ranked, candidates) {
        writer.write_record(row)?;
    }
    writer.flush()?;

    tracing::info!("📋 Wrote {} ranked decliners to {}", ranked.len(), path.display());
    Ok(())
}
