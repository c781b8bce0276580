//! Scan orchestration
//!
//! `LOAD_UNIVERSE → RANK_DECLINERS → FILTER_AND_ASSEMBLE → EMIT`. Only a
//! universe load failure aborts the run; every per-symbol problem becomes a
//! skip (or a counted fatal) and the batch carries on.

use crate::api::MarketDataSource;
use crate::error::{ScreenerError, SkipReason, SymbolOutcome};
use crate::indicators::PivotLevels;
use crate::market::{find_opening_candle, previous_session, CandleValidator, ExchangeSession};
use crate::models::{Candle, DailyBar, DeclineCandidate, Instrument, Resolution, TradeCandidate};
use crate::screen::{
    assemble_candidate, rank_decliners, ConfirmationFilter, ConfirmationRule, DeclineObservation,
    FilterDecision, DEFAULT_MAX_DECLINERS,
};
use crate::sink::ResultSink;
use crate::universe::{NameTable, Universe, UniverseSource};
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument as _;
use uuid::Uuid;

const PROGRESS_EVERY: usize = 25;

/// Per-run parameters; `scan_date` is always injected, never read from the clock here
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub scan_date: NaiveDate,
    pub max_decliners: usize,
    pub daily_lookback_days: i64,
    pub intraday: Resolution,
    pub rule: ConfirmationRule,
    pub concurrency: usize,
}

impl ScanOptions {
    pub fn for_date(scan_date: NaiveDate) -> Self {
        Self {
            scan_date,
            max_decliners: DEFAULT_MAX_DECLINERS,
            daily_lookback_days: 7,
            intraday: Resolution::Minutes(5),
            rule: ConfirmationRule::default(),
            concurrency: 1,
        }
    }
}

/// Summary of one finished run
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub scan_date: NaiveDate,
    pub universe_size: usize,
    /// Symbols with both an opening close and a prior close
    pub observed: usize,
    pub ranked: Vec<DeclineCandidate>,
    pub candidates: Vec<TradeCandidate>,
    pub skipped: usize,
    /// `Fatal` outcomes; zero unless a step raises an error outside the skip taxonomy
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct StageCounts {
    skipped: usize,
    failed: usize,
}

impl StageCounts {
    fn record<T>(&mut self, symbol: &str, outcome: SymbolOutcome<T>) -> Option<T> {
        match outcome {
            SymbolOutcome::Ok(value) => Some(value),
            SymbolOutcome::Skipped(reason) => {
                self.skipped += 1;
                tracing::debug!("⏭️  {} skipped: {}", symbol, reason);
                None
            }
            SymbolOutcome::Fatal(err) => {
                self.failed += 1;
                tracing::error!("❌ {} failed: {}", symbol, err);
                None
            }
        }
    }
}

/// Runs the screening stages against one market data source
pub struct ScanPipeline {
    source: Arc<dyn MarketDataSource>,
    session: ExchangeSession,
    options: ScanOptions,
    filter: ConfirmationFilter,
    validator: CandleValidator,
}

impl ScanPipeline {
    pub fn new(source: Arc<dyn MarketDataSource>, session: ExchangeSession, options: ScanOptions) -> Self {
        let filter = ConfirmationFilter::new(options.rule);
        Self {
            source,
            session,
            options,
            filter,
            validator: CandleValidator::new(),
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Execute a full run and hand the result rows to `sink` exactly once
    ///
    /// Fails with `UniverseLoad` before any fetching if the universe is
    /// unavailable, and with `SinkWrite` (carrying the rows) if emitting fails.
    pub async fn run(
        &self,
        universe_source: &dyn UniverseSource,
        sink: &mut dyn ResultSink,
    ) -> Result<ScanReport, ScreenerError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "scan",
            run_id = %run_id,
            scan_date = %self.options.scan_date,
            provider = self.source.name()
        );

        self.run_stages(run_id, universe_source, sink)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        universe_source: &dyn UniverseSource,
        sink: &mut dyn ResultSink,
    ) -> Result<ScanReport, ScreenerError> {
        // ====================================================================
        // LOAD_UNIVERSE
        // ====================================================================
        let universe = universe_source.load().await?;
        tracing::info!("🚀 Scanning {} symbols via {}", universe.len(), self.source.name());

        // ====================================================================
        // RANK_DECLINERS
        // ====================================================================
        let (ranked, observed, rank_counts) = self.rank_stage(&universe).await;
        tracing::info!(
            "📉 Ranked {} decliners from {} observed symbols ({} skipped, {} failed)",
            ranked.len(),
            observed,
            rank_counts.skipped,
            rank_counts.failed
        );

        // ====================================================================
        // FILTER_AND_ASSEMBLE
        // ====================================================================
        let (candidates, filter_counts) = self.filter_stage(&ranked, universe.names()).await;
        tracing::info!(
            "✅ {} of {} decliners passed confirmation",
            candidates.len(),
            ranked.len()
        );

        // ====================================================================
        // EMIT
        // ====================================================================
        if let Err(e) = sink.write(&candidates).await {
            tracing::error!("Failed to write {} candidates: {}", candidates.len(), e);
            return Err(ScreenerError::SinkWrite {
                message: e.to_string(),
                candidates,
            });
        }

        Ok(ScanReport {
            run_id,
            scan_date: self.options.scan_date,
            universe_size: universe.len(),
            observed,
            ranked,
            candidates,
            skipped: rank_counts.skipped + filter_counts.skipped,
            failed: rank_counts.failed + filter_counts.failed,
        })
    }

    async fn rank_stage(&self, universe: &Universe) -> (Vec<DeclineCandidate>, usize, StageCounts) {
        let total = universe.len();
        let mut counts = StageCounts::default();
        let mut observations = Vec::with_capacity(total);

        let mut outcomes = stream::iter(universe.instruments())
            .map(move |instrument| async move { (instrument, self.observe_symbol(instrument).await) })
            .buffered(self.options.concurrency.max(1));

        let mut processed = 0;
        while let Some((instrument, outcome)) = outcomes.next().await {
            processed += 1;
            if let Some(observation) = counts.record(&instrument.symbol, outcome) {
                observations.push(observation);
            }
            if processed % PROGRESS_EVERY == 0 {
                tracing::info!("   ...observed {}/{} symbols", processed, total);
            }
        }

        let observed = observations.len();
        let ranked = rank_decliners(observations, self.options.max_decliners);
        (ranked, observed, counts)
    }

    async fn filter_stage(
        &self,
        ranked: &[DeclineCandidate],
        names: &NameTable,
    ) -> (Vec<TradeCandidate>, StageCounts) {
        let mut counts = StageCounts::default();
        let mut candidates = Vec::new();

        let mut outcomes = stream::iter(ranked)
            .map(move |decline| async move { (decline, self.screen_symbol(decline, names).await) })
            .buffered(self.options.concurrency.max(1));

        while let Some((decline, outcome)) = outcomes.next().await {
            if let Some(candidate) = counts.record(&decline.symbol, outcome) {
                tracing::info!(
                    "🎯 {} broke {} at {} ({:.2}%)",
                    candidate.symbol,
                    candidate.broken_level,
                    candidate.entry_price,
                    decline.change_pct
                );
                candidates.push(candidate);
            }
        }

        (candidates, counts)
    }

    /// Opening close and prior close for one symbol
    pub async fn observe_symbol(&self, instrument: &Instrument) -> SymbolOutcome<DeclineObservation> {
        let daily = match self.fetch_daily(&instrument.provider_id).await {
            Ok(bars) => bars,
            Err(e) => return e.into(),
        };
        let prior = match self.prior_session(&instrument.provider_id, &daily) {
            Ok(bar) => bar,
            Err(reason) => return SymbolOutcome::Skipped(reason),
        };
        if prior.close == 0.0 || !prior.close.is_finite() {
            return SymbolOutcome::Skipped(SkipReason::ZeroPriorClose);
        }

        let intraday = match self.fetch_intraday(&instrument.provider_id).await {
            Ok(candles) => candles,
            Err(e) => return e.into(),
        };
        let Some(opening) = find_opening_candle(&intraday, self.options.scan_date, self.session.open) else {
            return SymbolOutcome::Skipped(SkipReason::MissingOpeningCandle);
        };

        SymbolOutcome::Ok(DeclineObservation {
            symbol: instrument.symbol.clone(),
            provider_id: instrument.provider_id.clone(),
            display_name: instrument
                .display_name
                .clone()
                .unwrap_or_else(|| instrument.symbol.clone()),
            opening_close: Some(opening.close),
            prior_close: Some(prior.close),
        })
    }

    /// Fresh fetch, confirmation filter and assembly for one ranked decliner
    pub async fn screen_symbol(
        &self,
        decline: &DeclineCandidate,
        names: &NameTable,
    ) -> SymbolOutcome<TradeCandidate> {
        let daily = match self.fetch_daily(&decline.provider_id).await {
            Ok(bars) => bars,
            Err(e) => return e.into(),
        };
        let prior = match self.prior_session(&decline.provider_id, &daily) {
            Ok(bar) => bar,
            Err(reason) => return SymbolOutcome::Skipped(reason),
        };
        let levels = match PivotLevels::from_bar(prior) {
            Ok(levels) => levels,
            Err(e) => return e.into(),
        };

        let intraday = match self.fetch_intraday(&decline.provider_id).await {
            Ok(candles) => candles,
            Err(e) => return e.into(),
        };
        let Some(opening) = find_opening_candle(&intraday, self.options.scan_date, self.session.open) else {
            return SymbolOutcome::Skipped(SkipReason::MissingOpeningCandle);
        };

        match self.filter.evaluate(prior, &levels, opening) {
            FilterDecision::Accepted { broken_level } => {
                match assemble_candidate(self.options.scan_date, broken_level, &levels, decline, names) {
                    Ok(candidate) => SymbolOutcome::Ok(candidate),
                    Err(e) => e.into(),
                }
            }
            FilterDecision::Rejected(reason) => SymbolOutcome::Skipped(SkipReason::NotConfirmed(reason)),
        }
    }

    /// Prior session picked from the raw daily series, then validated
    ///
    /// A corrupt prior bar skips the symbol; falling back to an older
    /// session would compute levels for the wrong day.
    fn prior_session<'a>(
        &self,
        provider_id: &str,
        daily: &'a [DailyBar],
    ) -> Result<&'a DailyBar, SkipReason> {
        let prior = previous_session(daily, self.options.scan_date)
            .ok_or(SkipReason::InsufficientHistory { bars: daily.len() })?;
        self.validator.validate(prior).map_err(|e| {
            tracing::warn!("{} prior session {} is corrupt: {}", provider_id, prior.date(), e);
            SkipReason::InvalidLevels(e)
        })?;
        Ok(prior)
    }

    /// Daily bars as returned by the provider, unfiltered
    async fn fetch_daily(&self, provider_id: &str) -> Result<Vec<DailyBar>, ScreenerError> {
        let to = self.options.scan_date;
        let from = to - Duration::days(self.options.daily_lookback_days);
        let bars = self
            .source
            .fetch_candles(provider_id, Resolution::Daily, from, to)
            .await?;
        Ok(bars)
    }

    async fn fetch_intraday(&self, provider_id: &str) -> Result<Vec<Candle>, ScreenerError> {
        let date = self.options.scan_date;
        let candles = self
            .source
            .fetch_candles(provider_id, self.options.intraday, date, date)
            .await?;
        Ok(self.validator.retain_valid(provider_id, candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProviderError;
    use crate::indicators::LevelId;
    use crate::sink::MemorySink;
    use crate::universe::StaticUniverse;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bar(day: u32, hh: u32, mm: u32, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle {
            timestamp: FixedOffset::east_opt(19_800)
                .unwrap()
                .with_ymd_and_hms(2025, 10, day, hh, mm, 0)
                .unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1_000.0,
        }
    }

    #[derive(Default)]
    struct FakeSource {
        daily: HashMap<String, Vec<Candle>>,
        intraday: HashMap<String, Vec<Candle>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        /// Prior decline day O 105 H 110 L 98 C 100 plus an opening candle
        fn with_setup(mut self, id: &str, opening: Candle) -> Self {
            self.daily.insert(
                id.to_string(),
                vec![
                    bar(29, 0, 0, 100.0, 106.0, 99.0, 105.0),
                    bar(30, 0, 0, 105.0, 110.0, 98.0, 100.0),
                ],
            );
            self.intraday.insert(id.to_string(), vec![opening]);
            self
        }
    }

    #[async_trait]
    impl MarketDataSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_candles(
            &self,
            provider_id: &str,
            resolution: Resolution,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<Candle>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let table = if resolution.is_daily() { &self.daily } else { &self.intraday };
            table
                .get(provider_id)
                .cloned()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ProviderError::NoData(provider_id.to_string()))
        }
    }

    fn options() -> ScanOptions {
        ScanOptions::for_date(NaiveDate::from_ymd_opt(2025, 10, 31).unwrap())
    }

    fn pipeline(source: FakeSource) -> ScanPipeline {
        ScanPipeline::new(Arc::new(source), ExchangeSession::default(), options())
    }

    fn instrument(symbol: &str) -> Instrument {
        Instrument {
            symbol: symbol.to_string(),
            provider_id: symbol.to_string(),
            display_name: None,
        }
    }

    fn decline(symbol: &str) -> DeclineCandidate {
        DeclineCandidate {
            symbol: symbol.into(),
            provider_id: symbol.into(),
            display_name: symbol.into(),
            opening_close: 97.0,
            prior_close: 100.0,
            change_pct: -3.0,
        }
    }

    #[tokio::test]
    async fn test_observe_symbol() {
        let mut source = FakeSource::default().with_setup("SBIN", bar(31, 9, 15, 99.0, 99.5, 96.0, 97.0));
        // Provider already includes the in-progress scan day
        source
            .daily
            .get_mut("SBIN")
            .unwrap()
            .push(bar(31, 0, 0, 99.0, 99.5, 96.0, 97.0));

        let observation = pipeline(source).observe_symbol(&instrument("SBIN")).await.ok().unwrap();

        assert_eq!(observation.prior_close, Some(100.0));
        assert_eq!(observation.opening_close, Some(97.0));
        assert_eq!(observation.display_name, "SBIN");
    }

    #[tokio::test]
    async fn test_missing_data_is_skip_not_error() {
        let mut source = FakeSource::default();
        source
            .daily
            .insert("ONEBAR".into(), vec![bar(30, 0, 0, 105.0, 110.0, 98.0, 100.0)]);
        let pipeline = pipeline(source);

        let outcome = pipeline.observe_symbol(&instrument("NODATA")).await;
        assert!(matches!(outcome, SymbolOutcome::Skipped(SkipReason::NoData(_))));

        let outcome = pipeline.observe_symbol(&instrument("ONEBAR")).await;
        assert!(matches!(
            outcome,
            SymbolOutcome::Skipped(SkipReason::InsufficientHistory { bars: 1 })
        ));
    }

    #[tokio::test]
    async fn test_opening_candle_must_match_session_open() {
        let source = FakeSource::default().with_setup("LATE", bar(31, 9, 20, 99.0, 99.5, 96.0, 97.0));

        let outcome = pipeline(source).observe_symbol(&instrument("LATE")).await;
        assert!(matches!(outcome, SymbolOutcome::Skipped(SkipReason::MissingOpeningCandle)));
    }

    #[tokio::test]
    async fn test_screen_symbol_accepts_breakdown() {
        let source = FakeSource::default().with_setup("SBIN", bar(31, 9, 15, 99.0, 99.5, 96.0, 97.0));
        let names = NameTable::from_pairs([("SBIN", "State Bank of India")]);

        let candidate = pipeline(source)
            .screen_symbol(&decline("SBIN"), &names)
            .await
            .ok()
            .unwrap();

        assert_eq!(candidate.broken_level, LevelId::L3);
        assert_eq!(candidate.display_name, "State Bank of India");
        assert_eq!(candidate.entry_price, Decimal::new(9670, 2));
    }

    #[tokio::test]
    async fn test_corrupt_prior_bar_is_skipped() {
        let mut source = FakeSource::default().with_setup("BAD", bar(31, 9, 15, 99.0, 99.5, 96.0, 97.0));
        source.daily.get_mut("BAD").unwrap()[1].low = 0.0;

        let outcome = pipeline(source).screen_symbol(&decline("BAD"), &NameTable::default()).await;

        assert!(matches!(outcome, SymbolOutcome::Skipped(SkipReason::InvalidLevels(_))));
    }

    #[tokio::test]
    async fn test_corrupt_prior_bar_never_falls_back_to_older_session() {
        // Oct 28 and Oct 29 are clean; Oct 30, the real prior session, has a zero low
        let mut source = FakeSource::default().with_setup("BAD", bar(31, 9, 15, 99.0, 99.5, 96.0, 97.0));
        source.daily.insert(
            "BAD".into(),
            vec![
                bar(28, 0, 0, 100.0, 106.0, 99.0, 105.0),
                bar(29, 0, 0, 105.0, 110.0, 98.0, 100.0),
                bar(30, 0, 0, 100.0, 104.0, 0.0, 101.0),
            ],
        );
        let pipeline = pipeline(source);

        let outcome = pipeline.screen_symbol(&decline("BAD"), &NameTable::default()).await;
        assert!(
            matches!(outcome, SymbolOutcome::Skipped(SkipReason::InvalidLevels(_))),
            "levels must not come from the Oct 29 bar: {outcome:?}"
        );

        let outcome = pipeline.observe_symbol(&instrument("BAD")).await;
        assert!(matches!(outcome, SymbolOutcome::Skipped(SkipReason::InvalidLevels(_))));
    }

    #[tokio::test]
    async fn test_corrupt_older_bar_does_not_block_scan() {
        let mut source = FakeSource::default().with_setup("SBIN", bar(31, 9, 15, 99.0, 99.5, 96.0, 97.0));
        source.daily.get_mut("SBIN").unwrap()[0].high = f64::NAN;

        let candidate = pipeline(source)
            .screen_symbol(&decline("SBIN"), &NameTable::default())
            .await
            .ok()
            .unwrap();

        assert_eq!(candidate.broken_level, LevelId::L3);
    }

    #[test]
    fn test_stage_counts_separate_skips_from_fatals() {
        let mut counts = StageCounts::default();

        assert_eq!(counts.record("OK", SymbolOutcome::Ok(1)), Some(1));
        assert_eq!(counts.record::<i32>("GAP", SymbolOutcome::Skipped(SkipReason::MissingOpeningCandle)), None);
        assert_eq!(counts.record::<i32>("BROKEN", ScreenerError::Io("disk".into()).into()), None);

        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn test_rejected_filter_is_skip() {
        // Opening low holds the prior low (98.0)
        let source = FakeSource::default().with_setup("HELD", bar(31, 9, 15, 99.0, 99.5, 99.0, 99.2));

        let outcome = pipeline(source).screen_symbol(&decline("HELD"), &NameTable::default()).await;
        assert!(matches!(outcome, SymbolOutcome::Skipped(SkipReason::NotConfirmed(_))));
    }

    #[tokio::test]
    async fn test_run_with_empty_universe_aborts_before_fetching() {
        let source = Arc::new(FakeSource::default());
        let pipeline = ScanPipeline::new(source.clone(), ExchangeSession::default(), options());
        let mut sink = MemorySink::new();

        let result = pipeline.run(&StaticUniverse::new(Vec::new()), &mut sink).await;

        assert!(matches!(result, Err(ScreenerError::UniverseLoad(_))));
        assert_eq!(sink.write_count(), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_keeps_rank_order() {
        let mut source = FakeSource::default();
        for symbol in ["A", "B", "C", "D"] {
            source = source.with_setup(symbol, bar(31, 9, 15, 99.0, 99.5, 96.0, 97.0));
        }
        let mut opts = options();
        opts.concurrency = 3;
        let pipeline = ScanPipeline::new(Arc::new(source), ExchangeSession::default(), opts);
        let universe = StaticUniverse::new(["A", "B", "C", "D"].iter().map(|s| instrument(s)).collect());
        let mut sink = MemorySink::new();

        let report = pipeline.run(&universe, &mut sink).await.unwrap();

        let symbols: Vec<_> = report.candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C", "D"]);
        assert_eq!(sink.write_count(), 1);
    }
}
