use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use strategy_lab::config::{AppConfig, OperatingMode};
use strategy_lab::data::{CsvDataProvider, DataProvider};
use strategy_lab::engines::improvement::{
    ImprovementController, ImprovementHistory, MetricChange, PerturbationProposer, ProposalGenerator,
    RuleBasedProposer,
};
use strategy_lab::engines::optimisation::{ConsoleProgressCallback, WalkForwardEngine};
use strategy_lab::functions::registry::StrategyKind;
use strategy_lab::runner::{run_backtests_with_progress, InstrumentOutcome};

#[derive(Parser)]
#[command(
    name = "strategy-lab",
    version,
    about = "Walk-forward strategy evaluation with a guarded improvement loop",
    propagate_version = true
)]
struct Cli {
    /// TOML or JSON config file; `LAB_*` environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding `<instrument>.csv` price files
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk-forward every enabled strategy on every configured instrument
    Backtest {
        /// Restrict to these strategies instead of the enabled set
        #[arg(long)]
        strategy: Vec<String>,
    },
    /// Run one improvement cycle for a strategy
    Improve {
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        instrument: Option<String>,
        /// Override the configured operating mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        #[arg(long, value_enum, default_value_t = ProposerArg::Rules)]
        proposer: ProposerArg,
    },
    /// Re-check the active record on current data, rolling back on regression
    Revalidate {
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Roll back the active record of a strategy
    Rollback {
        #[arg(long)]
        strategy: String,
        #[arg(long, default_value = "manual rollback")]
        reason: String,
    },
    /// Activate a promotion that was staged for review
    Adopt { record_id: String },
    /// Summarise the improvement ledger
    History {
        #[arg(long)]
        strategy: Option<String>,
        /// With --strategy, list its records from this date (inclusive)
        #[arg(long, requires = "strategy")]
        since: Option<NaiveDate>,
        /// With --strategy, list its records before this date
        #[arg(long, requires = "strategy")]
        until: Option<NaiveDate>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Validation,
    Adoption,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProposerArg {
    Rules,
    Perturbation,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    let provider = CsvDataProvider::new(&cli.data_dir);

    match cli.command {
        Commands::Backtest { strategy } => backtest(&config, &provider, &strategy)?,
        Commands::Improve {
            strategy,
            instrument,
            mode,
            proposer,
        } => {
            if let Some(mode) = mode {
                config.improvement.mode = match mode {
                    ModeArg::Validation => OperatingMode::Validation,
                    ModeArg::Adoption => OperatingMode::Adoption,
                };
            }
            let kind: StrategyKind = strategy.parse()?;
            let series = provider.fetch(&instrument_or_default(&config, instrument)?, None, None)?;
            let generator: Box<dyn ProposalGenerator> = match proposer {
                ProposerArg::Rules => Box::new(RuleBasedProposer::default()),
                ProposerArg::Perturbation => Box::new(PerturbationProposer::new(config.improvement.seed)),
            };

            let mut controller = controller(&config, generator)?;
            let report = controller.run_cycle(&series, kind)?;
            println!(
                "{} on {} (baseline {}, mode {})",
                report.strategy,
                report.instrument,
                score(report.baseline_score),
                config.improvement.mode
            );
            for record in &report.records {
                println!(
                    "  {} {:?} [{}] {}: {}",
                    record.record_id,
                    record.decision,
                    record.proposal.kind,
                    record.proposal.description,
                    record.reason
                );
                if let Some(assessment) = &record.assessment {
                    println!(
                        "    {:?} ({:+.3}), drawdown risk {:?}, {} metric(s) better, {} worse",
                        assessment.level,
                        assessment.improvement_score,
                        assessment.drawdown_risk,
                        assessment.count(MetricChange::Improved),
                        assessment.count(MetricChange::Degraded)
                    );
                }
            }
        }
        Commands::Revalidate { strategy, instrument } => {
            let kind: StrategyKind = strategy.parse()?;
            let series = provider.fetch(&instrument_or_default(&config, instrument)?, None, None)?;
            let mut controller = ImprovementController::from_config(&config)?;
            match controller.revalidate(&series, kind)? {
                Some(record) => println!("{} rolled back: {}", record.record_id, record.reason),
                None => println!("{}: active configuration holds", kind),
            }
        }
        Commands::Rollback { strategy, reason } => {
            let kind: StrategyKind = strategy.parse()?;
            let mut controller = ImprovementController::from_config(&config)?;
            let record = controller.rollback(kind, &reason)?;
            println!(
                "{} rolled back {}; now active: {}",
                record.record_id,
                record.supersedes.as_deref().unwrap_or("-"),
                record.reinstated.as_deref().unwrap_or("defaults")
            );
        }
        Commands::Adopt { record_id } => {
            let mut controller = ImprovementController::from_config(&config)?;
            let record = controller.adopt_staged(&record_id)?;
            println!("{} adopted {} as active", record.record_id, record_id);
        }
        Commands::History { strategy, since, until } => {
            let history = ImprovementHistory::open(&config.improvement.history_path)?;
            if let (Some(name), true) = (strategy.as_deref(), since.is_some() || until.is_some()) {
                let kind: StrategyKind = name.parse()?;
                let from = since.map(midnight).unwrap_or(DateTime::<Utc>::MIN_UTC);
                let to = until.map(midnight).unwrap_or(DateTime::<Utc>::MAX_UTC);
                for record in history.in_range(kind.name(), from, to) {
                    println!(
                        "{} {} {:?} [{}] {}",
                        record.record_id,
                        record.timestamp.to_rfc3339(),
                        record.decision,
                        record.proposal.kind,
                        record.reason
                    );
                }
                return Ok(());
            }
            for (name, summary) in history.summary() {
                if strategy.as_deref().is_some_and(|s| !s.eq_ignore_ascii_case(&name)) {
                    continue;
                }
                println!(
                    "{}: {} records ({} promoted, {} rejected, {} rolled back), best {}, active {}",
                    name,
                    summary.total,
                    summary.promoted,
                    summary.rejected,
                    summary.rolled_back,
                    score(summary.best_score),
                    summary.active_record.as_deref().unwrap_or("defaults")
                );
                println!("  recent: {}", summary.recent.join(", "));
            }
        }
    }

    Ok(())
}

fn backtest(config: &AppConfig, provider: &dyn DataProvider, names: &[String]) -> anyhow::Result<()> {
    let strategies = if names.is_empty() {
        config.strategies.enabled()?
    } else {
        names
            .iter()
            .map(|n| {
                let kind: StrategyKind = n.parse()?;
                Ok((kind, config.strategies.parameters_for(kind)))
            })
            .collect::<strategy_lab::error::Result<Vec<_>>>()?
    };

    let outcomes = run_backtests_with_progress(config, provider, &strategies, &mut ConsoleProgressCallback)?;
    let engine = WalkForwardEngine::from_config(config);

    for outcome in outcomes {
        match outcome {
            InstrumentOutcome::Failed { instrument, reason } => println!("{}: skipped ({})", instrument, reason),
            InstrumentOutcome::Completed { instrument, results } => {
                for result in results {
                    println!(
                        "\n=== {} on {}: composite {}, stability {:.4}, {} healthy / {} degraded ===",
                        result.strategy,
                        instrument,
                        score(result.composite_score),
                        result.parameter_stability,
                        result.healthy_windows,
                        result.degraded_windows
                    );
                    for window in result.windows.iter().filter(|w| !w.is_degraded()) {
                        if let Some(metrics) = &window.metrics {
                            println!("--- window {} ---", window.window.index);
                            println!("{}", engine.metrics_engine().report(metrics));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn controller(config: &AppConfig, proposer: Box<dyn ProposalGenerator>) -> anyhow::Result<ImprovementController> {
    let history = ImprovementHistory::open(&config.improvement.history_path)?;
    Ok(ImprovementController::new(
        config,
        Box::new(WalkForwardEngine::from_config(config)),
        proposer,
        history,
    ))
}

fn instrument_or_default(config: &AppConfig, instrument: Option<String>) -> anyhow::Result<String> {
    instrument
        .or_else(|| config.backtesting.instruments.first().cloned())
        .ok_or_else(|| anyhow::anyhow!("No instrument given and none configured"))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

fn score(value: Option<f64>) -> String {
    value.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "n/a".to_string())
}
