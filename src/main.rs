use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use pivot_screener::config::{ProviderKind, Settings};
use pivot_screener::models::Resolution;
use pivot_screener::screen::ConfirmationRule;
use pivot_screener::sink::{write_ranked_csv, SinkFormat};
use pivot_screener::{ResultSink, ScanOptions, ScanPipeline, ScanReport, ScreenerError, TradeCandidate};
use std::path::PathBuf;
use std::time::Duration;

const SINK_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "pivot-screener")]
#[command(about = "Camarilla support-breakdown screener for opening-session short setups", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./screener.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Market data provider: fyers or dhan
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Scan date (YYYY-MM-DD); defaults to today at the exchange
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Number of top decliners carried into confirmation
    #[arg(long)]
    top: Option<usize>,

    /// Confirmation rule: breakdown or resistance_rejection
    #[arg(long)]
    rule: Option<ConfirmationRule>,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: csv or json
    #[arg(long)]
    format: Option<SinkFormat>,

    /// Also write every ranked decliner with its filter outcome to this CSV
    #[arg(long)]
    ranked_output: Option<PathBuf>,

    /// Symbols processed concurrently
    #[arg(long)]
    concurrency: Option<usize>,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if let Some(kind) = self.provider {
            settings.provider.kind = kind;
        }
        if let Some(date) = self.date {
            settings.scan.scan_date = Some(date);
        }
        if let Some(top) = self.top {
            settings.scan.max_decliners = top;
        }
        if let Some(rule) = self.rule {
            settings.scan.rule = rule;
        }
        if let Some(output) = self.output {
            settings.sink.path = output;
        }
        if let Some(format) = self.format {
            settings.sink.format = format;
        }
        if let Some(path) = self.ranked_output {
            settings.sink.ranked_path = Some(path);
        }
        if let Some(concurrency) = self.concurrency {
            settings.scan.concurrency = concurrency;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let session = settings.exchange.session()?;
    let scan_date = settings.scan.scan_date.unwrap_or_else(|| session.today());
    let options = ScanOptions {
        scan_date,
        max_decliners: settings.scan.max_decliners,
        daily_lookback_days: settings.scan.daily_lookback_days,
        intraday: Resolution::Minutes(settings.scan.intraday_minutes),
        rule: settings.scan.rule,
        concurrency: settings.scan.concurrency,
    };

    tracing::info!(
        "🔎 Pivot screener starting for {} ({:?} rule, top {})",
        scan_date,
        options.rule,
        options.max_decliners
    );

    let source = settings.market_source().context("Failed to build market data client")?;
    let universe = settings.universe_source();
    let mut sink = settings.result_sink();

    let pipeline = ScanPipeline::new(source, session, options);
    let report = match pipeline.run(universe.as_ref(), sink.as_mut()).await {
        Ok(report) => report,
        Err(ScreenerError::SinkWrite { message, candidates }) => {
            tracing::warn!(
                "⚠️  Result write failed ({}), retrying once in {:?}",
                message,
                SINK_RETRY_DELAY
            );
            tokio::time::sleep(SINK_RETRY_DELAY).await;
            sink.write(&candidates)
                .await
                .with_context(|| format!("Failed to write results to {}", settings.sink.path.display()))?;
            print_candidates(&candidates);
            return Ok(());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Scan aborted")),
    };

    if let Some(path) = &settings.sink.ranked_path {
        if let Err(e) = write_ranked_csv(path, &report.ranked, &report.candidates) {
            tracing::warn!("⚠️  Failed to write ranked decliners to {}: {}", path.display(), e);
        }
    }

    print_summary(&report);
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pivot_screener=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_summary(report: &ScanReport) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SUPPORT BREAKDOWN SCAN                   ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!("   Run:       {}", report.run_id);
    println!("   Date:      {}", report.scan_date);
    println!("   Universe:  {} symbols", report.universe_size);
    println!("   Observed:  {}", report.observed);
    println!("   Ranked:    {}", report.ranked.len());
    println!("   Skipped:   {}", report.skipped);
    if report.failed > 0 {
        println!("   Failed:    {}", report.failed);
    }

    print_candidates(&report.candidates);
}

fn print_candidates(candidates: &[TradeCandidate]) {
    println!();
    if candidates.is_empty() {
        println!("No candidates passed all checks.");
        println!("\n═══════════════════════════════════════════════════════\n");
        return;
    }

    println!(
        "{:<28} {:>6} {:>10} {:>18} {:>18} {:>8}",
        "Stock", "Level", "Sell", "SL R1/R2", "Target S4/S5", "Chg%"
    );
    println!("{}", "─".repeat(94));

    for c in candidates {
        println!(
            "{:<28} {:>6} {:>10.2} {:>18} {:>18} {:>8.2}",
            c.display_name,
            c.broken_level.as_str(),
            c.entry_price,
            format!("{:.2}/{:.2}", c.stop_r1, c.stop_r2),
            format!("{:.2}/{:.2}", c.target_s4, c.target_s5),
            c.change_pct
        );
    }

    println!("\n═══════════════════════════════════════════════════════\n");
}
