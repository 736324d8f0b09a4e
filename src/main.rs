use analytics::FitnessEvaluator;
use analyzer::{Analyzer, StrategyQuery};
use arena::Arena;
use backtester::{BacktestRequest, BacktestWindow, Backtester, LedgerOrder};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use configuration::{Config, init_tracing, load_config};
use core_types::{Cadence, Candidate, MarketId, MarketOverride, SearchMode, StrategyStatus};
use database::{
    DbRepository, OutcomeSource, OverrideStore, PolicyStore, SnapshotStore, StrategyStore,
    connect, run_migrations,
};
use engine::{DriftMonitor, ResourceGovernor, WorkloadClass};
use ensemble::{EnsembleMiner, MiningRequest};
use promotion::PromotionManager;
use std::path::PathBuf;
use std::sync::Arc;
use stress::{BetReturn, StressTester, StressThresholds};
use time_machine::{TimeMachine, TimeMachineRequest};
use tracing::info;
use uuid::Uuid;

/// The main entry point for the Oddsmith strategy engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine when DATABASE_URL is already exported.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_tracing(&config.logging)?;

    // Initialize the database connection and run migrations
    let pool = connect().await?;
    run_migrations(&pool).await?;
    let store = Arc::new(DbRepository::new(pool, config.policy.defaults.clone()));
    let governor = Arc::new(ResourceGovernor::from_config(&config));

    match cli.command {
        Commands::TimeMachine(args) => handle_time_machine(args, config, &store, &governor).await,
        Commands::Mine(args) => handle_mine(args, config, &store, &governor).await,
        Commands::Stress(args) => handle_stress(args, &config, &store, &governor).await,
        Commands::Strategies(args) => handle_strategies(args, &store).await,
        Commands::Backtest(args) => handle_backtest(args, &config, &store, &governor).await,
        Commands::Activate(args) => handle_activate(args, &config, &store).await,
        Commands::Archive(args) => handle_archive(args, &config, &store).await,
        Commands::Override(args) => handle_override(args, &store).await,
        Commands::DriftCheck(args) => handle_drift_check(args, &config, &store, &governor).await,
        Commands::PolicySet(args) => handle_policy_set(args, &store).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Strategy evolution and risk-gated decisions for betting markets.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to `config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute point-in-time calibration snapshots.
    TimeMachine(TimeMachineArgs),
    /// Mine shadow strategies for a market with an ensemble of searches.
    Mine(MineArgs),
    /// Stress-test a stored strategy.
    Stress(StressArgs),
    /// List strategies grouped by market and lifecycle status.
    Strategies(StrategiesArgs),
    /// Replay a strategy through the decision gate.
    Backtest(BacktestArgs),
    /// Activate a shadow strategy.
    Activate(ActivateArgs),
    /// Archive a shadow or active strategy.
    Archive(ArchiveArgs),
    /// Suppress every decision on a market for a while.
    Override(OverrideArgs),
    /// Check active strategies for live drift and roll back breaches.
    DriftCheck(DriftCheckArgs),
    /// Change one policy value.
    PolicySet(PolicySetArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum CadenceArg {
    Auto,
    Monthly,
    Quarterly,
}

impl From<CadenceArg> for Cadence {
    fn from(arg: CadenceArg) -> Self {
        match arg {
            CadenceArg::Auto => Cadence::Auto,
            CadenceArg::Monthly => Cadence::Monthly,
            CadenceArg::Quarterly => Cadence::Quarterly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Quick,
    Deep,
}

impl From<ModeArg> for SearchMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Quick => SearchMode::Quick,
            ModeArg::Deep => SearchMode::Deep,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Shadow,
    Active,
    Archived,
}

impl From<StatusArg> for StrategyStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Shadow => StrategyStatus::Shadow,
            StatusArg::Active => StrategyStatus::Active,
            StatusArg::Archived => StrategyStatus::Archived,
        }
    }
}

#[derive(Parser)]
struct TimeMachineArgs {
    /// Markets to compute. Defaults to every market with history.
    #[arg(long, value_delimiter = ',')]
    markets: Vec<String>,

    /// Last anchor month (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    as_of: Option<NaiveDate>,

    #[arg(long, value_enum)]
    cadence: Option<CadenceArg>,

    /// Parallel market workers; zero means one per core.
    #[arg(long)]
    workers: Option<usize>,

    /// Compute markets one at a time.
    #[arg(long)]
    sequential: bool,

    /// Clear the markets' retroactive snapshots before recomputing.
    #[arg(long)]
    rerun: bool,
}

#[derive(Parser)]
struct MineArgs {
    #[arg(long)]
    market: String,

    #[arg(long, value_enum, default_value = "quick")]
    mode: ModeArg,

    /// Number of independent searches.
    #[arg(long)]
    runs: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser)]
struct StressArgs {
    #[arg(long)]
    strategy: Uuid,

    /// Start of the window (format: YYYY-MM-DD). Defaults to the validation window.
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
}

#[derive(Parser)]
struct StrategiesArgs {
    #[arg(long)]
    market: Option<String>,

    #[arg(long, value_enum)]
    status: Option<StatusArg>,
}

#[derive(Parser)]
struct BacktestArgs {
    #[arg(long)]
    strategy: Uuid,

    /// Start of the window (format: YYYY-MM-DD). Defaults to the validation window.
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// List the ledger oldest first.
    #[arg(long)]
    oldest_first: bool,

    /// Ledger rows to print.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Parser)]
struct ActivateArgs {
    #[arg(long)]
    strategy: Uuid,

    /// Skip the metric gates. Requires a reason.
    #[arg(long, requires = "reason")]
    manual: bool,

    #[arg(long)]
    reason: Option<String>,

    #[arg(long, default_value = "cli")]
    actor: String,
}

#[derive(Parser)]
struct ArchiveArgs {
    #[arg(long)]
    strategy: Uuid,

    #[arg(long)]
    reason: String,

    #[arg(long, default_value = "cli")]
    actor: String,
}

#[derive(Parser)]
struct OverrideArgs {
    #[arg(long)]
    market: String,

    /// How long the suppression lasts.
    #[arg(long)]
    hours: i64,

    #[arg(long)]
    reason: String,

    #[arg(long, default_value = "cli")]
    actor: String,
}

#[derive(Parser)]
struct DriftCheckArgs {
    /// Markets to check. Defaults to every market with an active strategy.
    #[arg(long, value_delimiter = ',')]
    markets: Vec<String>,
}

#[derive(Parser)]
struct PolicySetArgs {
    /// Operational key name, e.g. SHADOW_MIN_TIPS.
    #[arg(long)]
    key: String,

    /// JSON value; bare words are taken as strings.
    #[arg(long)]
    value: String,

    #[arg(long)]
    reason: String,

    #[arg(long, default_value = "cli")]
    actor: String,
}

// ==============================================================================
// Helpers
// ==============================================================================

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn market_ids(names: &[String]) -> Vec<MarketId> {
    names.iter().map(MarketId::new).collect()
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_time_machine(
    args: TimeMachineArgs,
    mut config: Config,
    store: &Arc<DbRepository>,
    governor: &ResourceGovernor,
) -> anyhow::Result<()> {
    if let Some(workers) = args.workers {
        config.time_machine.workers = workers;
    }
    config.time_machine.sequential |= args.sequential;

    let markets = if args.markets.is_empty() {
        store.markets().await?
    } else {
        market_ids(&args.markets)
    };
    let _permit = governor.acquire(WorkloadClass::Batch).await?;
    governor.checkpoint().await;

    let report = TimeMachine::from_config(&config)
        .run(
            store.as_ref(),
            &TimeMachineRequest {
                markets,
                as_of: args.as_of.unwrap_or_else(|| Utc::now().date_naive()),
                cadence: args.cadence.map(Cadence::from),
                rerun: args.rerun,
                show_progress: true,
            },
        )
        .await?;

    let mut out = table(&["Market", "Cadence", "Records", "Direct", "Carried forward"]);
    for market in &report.markets {
        out.add_row(vec![
            market.market.to_string(),
            format!("{:?}", market.cadence),
            market.records.to_string(),
            market.direct.to_string(),
            market.carried_forward.to_string(),
        ]);
    }
    println!(
        "Anchors {} .. {}, cleared {} retroactive snapshots",
        report.first_anchor, report.last_anchor, report.cleared
    );
    println!("{out}");
    Ok(())
}

async fn handle_mine(
    args: MineArgs,
    mut config: Config,
    store: &Arc<DbRepository>,
    governor: &ResourceGovernor,
) -> anyhow::Result<()> {
    if let Some(runs) = args.runs {
        config.ensemble.runs = runs;
    }
    if let Some(seed) = args.seed {
        config.ensemble.base_seed = seed;
    }
    let market = MarketId::new(&args.market);
    let now = Utc::now();
    let promotion = PromotionManager::from_config(&config);
    let cooldown_until = promotion
        .retraining_cooldown(store.as_ref(), &market, now)
        .await?;

    let _permit = governor.acquire(WorkloadClass::Batch).await?;
    governor.checkpoint().await;

    let lookback = Duration::days(365 * i64::from(config.time_machine.lookback_years));
    let records = store.fetch_history(&market, now - lookback, now).await?;
    let reliability = store
        .latest_snapshot(&market, now.date_naive())
        .await?
        .map(|s| s.reliability_score);
    let policy = config
        .policy
        .for_market(&store.current_policy().await?, &market)?;
    let regime_split = policy.values.regime_split;
    info!(%market, records = records.len(), ?reliability, "Loaded mining inputs");

    let miner = EnsembleMiner::from_config(Arena::from_config(&config), &config);
    let request_market = market.clone();
    let ranges = config.gene_ranges(&market);
    let mode = SearchMode::from(args.mode);
    let (mut outcome, records) = tokio::task::spawn_blocking(move || {
        let mined = miner.mine(&MiningRequest {
            market: request_market,
            records: &records,
            ranges,
            mode,
            reliability,
            regime_split,
            show_progress: true,
            now,
            cooldown_until,
        });
        mined.map(|outcome| (outcome, records))
    })
    .await??;

    governor.checkpoint().await;
    let (from, to) = outcome.validation_window;
    let validation: Vec<_> = records
        .into_iter()
        .filter(|r| (from..=to).contains(&r.kickoff.date_naive()))
        .collect();
    let mut candidates: Vec<Candidate> = outcome
        .archetypes
        .iter()
        .map(|m| m.candidate.clone())
        .collect();
    let tester = StressTester::from_config(&config);
    let evaluator = FitnessEvaluator::new(config.fitness.clone(), regime_split);
    let thresholds = StressThresholds::from(&policy.values);
    let candidates = tokio::task::spawn_blocking(move || {
        tester
            .run(&mut candidates, &evaluator, &validation, &thresholds)
            .map(|()| candidates)
    })
    .await??;
    for (mined, stressed) in outcome.archetypes.iter_mut().zip(candidates) {
        mined.candidate.stress = stressed.stress;
    }

    let strategies = outcome.to_strategies(
        config.time_machine.lookback_years,
        config.fitness.decay_floor,
        now,
    );
    let registered = promotion
        .register_shadows(store.as_ref(), &strategies)
        .await?;

    let mut out = table(&["Strategy", "Archetype", "Val. ROI", "Val. Sharpe", "Bets", "Stress"]);
    for strategy in &strategies {
        out.add_row(vec![
            strategy.id.to_string(),
            strategy
                .archetype
                .map_or_else(|| "-".to_string(), |a| format!("{a:?}")),
            format!("{:.4}", strategy.validation.roi),
            format!("{:.2}", strategy.validation.sharpe),
            strategy.validation.bet_count.to_string(),
            if strategy.stress_passed() { "pass" } else { "fail" }.to_string(),
        ]);
    }
    println!(
        "Mined {market} over seeds {:?}; robust genes: {}; unstable genes: {}",
        outcome.seeds,
        outcome.robust_genes.join(", "),
        outcome.unstable_genes.join(", ")
    );
    println!("{out}");
    println!("Registered {registered} shadow strategies.");
    Ok(())
}

async fn handle_stress(
    args: StressArgs,
    config: &Config,
    store: &Arc<DbRepository>,
    governor: &ResourceGovernor,
) -> anyhow::Result<()> {
    let strategy = store.get_strategy(args.strategy).await?;
    let (from, to) = match (args.from, args.to) {
        (Some(from), Some(to)) => (from, to),
        _ => strategy.notes.validation_window,
    };
    let _permit = governor.acquire(WorkloadClass::Batch).await?;
    governor.checkpoint().await;

    let records = store
        .fetch_history(&strategy.market, day_start(from), day_start(to) + Duration::days(1))
        .await?;
    let policy = config
        .policy
        .for_market(&store.current_policy().await?, &strategy.market)?;
    let evaluator = FitnessEvaluator::new(config.fitness.clone(), policy.values.regime_split);
    let bets: Vec<BetReturn> = evaluator
        .simulate(&strategy.dna, &records)?
        .iter()
        .map(BetReturn::from)
        .collect();
    let result = StressTester::from_config(config).assess_full(
        &strategy.stress_identity(),
        &bets,
        &StressThresholds::from(&policy.values),
    );

    let mut out = table(&["Metric", "Value"]);
    out.add_row(vec!["Stage".to_string(), format!("{:?}", result.stage)]);
    out.add_row(vec!["Bets".to_string(), bets.len().to_string()]);
    out.add_row(vec!["P(ROI > 0)".to_string(), format!("{:.3}", result.prob_positive)]);
    out.add_row(vec![
        format!("ROI {:.0}% CI", result.ci_level * 100.0),
        format!("{:.4} .. {:.4}", result.roi_ci_low, result.roi_ci_high),
    ]);
    out.add_row(vec!["Ruin probability".to_string(), format!("{:.4}", result.ruin_probability)]);
    out.add_row(vec![
        "Drawdown median / p95".to_string(),
        format!("{:.4} / {:.4}", result.drawdown_median, result.drawdown_p95),
    ]);
    out.add_row(vec!["Failures".to_string(), format!("{:?}", result.failures)]);
    out.add_row(vec![
        "Rescue".to_string(),
        result
            .rescue
            .as_ref()
            .map_or_else(|| "-".to_string(), |r| format!("stake x{}", r.stake_scale)),
    ]);
    out.add_row(vec!["Passed".to_string(), result.passed.to_string()]);
    println!("Stress test of {} over {from} .. {to}", strategy.id);
    println!("{out}");
    Ok(())
}

async fn handle_strategies(args: StrategiesArgs, store: &Arc<DbRepository>) -> anyhow::Result<()> {
    let query = StrategyQuery {
        market: args.market.map(MarketId::new),
        status: args.status.map(StrategyStatus::from),
    };
    let report = Analyzer::new().run(store.as_ref(), &query, Utc::now()).await?;

    for market in &report.markets {
        let mut groups = table(&["Status", "Count", "Best ROI", "Avg ROI", "Avg Sharpe", "Avg bets", "Stress pass"]);
        for group in &market.groups {
            groups.add_row(vec![
                group.status.to_string(),
                group.count.to_string(),
                format!("{:.4}", group.best_validation_roi),
                format!("{:.4}", group.avg_validation_roi),
                format!("{:.2}", group.avg_sharpe),
                format!("{:.1}", group.avg_bet_count),
                format!("{:.0}%", group.stress_pass_rate * 100.0),
            ]);
        }
        let mut rows = table(&["Strategy", "Status", "Archetype", "Gen", "Val. ROI", "Sharpe", "Bets", "Stress", "Age (d)"]);
        for row in &market.strategies {
            rows.add_row(vec![
                row.id.to_string(),
                row.status.to_string(),
                row.archetype
                    .map_or_else(|| "-".to_string(), |a| format!("{a:?}")),
                row.generation.to_string(),
                format!("{:.4}", row.validation_roi),
                format!("{:.2}", row.validation_sharpe),
                row.validation_bets.to_string(),
                if row.stress_passed { "pass" } else { "fail" }.to_string(),
                row.age_days.to_string(),
            ]);
        }
        println!("\n{}", market.market);
        println!("{groups}");
        println!("{rows}");
    }

    let portfolio = &report.portfolio;
    println!(
        "\n{} strategies across {} markets ({} active): avg ROI {:.4}, avg Sharpe {:.2}, avg bets {:.1}, stress pass {:.0}%",
        portfolio.strategies,
        portfolio.markets,
        portfolio.active,
        portfolio.avg_validation_roi,
        portfolio.avg_sharpe,
        portfolio.avg_bet_count,
        portfolio.stress_pass_rate * 100.0
    );
    Ok(())
}

async fn handle_backtest(
    args: BacktestArgs,
    config: &Config,
    store: &Arc<DbRepository>,
    governor: &ResourceGovernor,
) -> anyhow::Result<()> {
    let window = match (args.from, args.to) {
        (Some(from), Some(to)) => BacktestWindow::Explicit { from, to },
        _ => BacktestWindow::Validation,
    };
    let order = if args.oldest_first {
        LedgerOrder::OldestFirst
    } else {
        LedgerOrder::NewestFirst
    };
    let _permit = governor.acquire(WorkloadClass::Batch).await?;
    governor.checkpoint().await;

    let report = Backtester::from_config(config)
        .run(
            store.as_ref(),
            &BacktestRequest {
                strategy_id: args.strategy,
                window,
                order,
                show_progress: true,
            },
        )
        .await?;

    println!(
        "Backtest of {} on {} from {} to {} (policy v{})",
        report.strategy_id, report.market, report.from, report.to, report.policy_version
    );
    let mut summary = table(&["Decisions", "Signals", "Staked", "Profit", "ROI", "Max drawdown", "Final bankroll"]);
    summary.add_row(vec![
        report.decisions.to_string(),
        report.signals.to_string(),
        report.total_staked.to_string(),
        report.profit.to_string(),
        format!("{:.4}", report.roi),
        format!("{:.4}", report.max_drawdown),
        report.final_bankroll.to_string(),
    ]);
    println!("{summary}");

    if !report.no_signal.is_empty() {
        let mut reasons = table(&["No-signal reason", "Count"]);
        for (reason, count) in &report.no_signal {
            reasons.add_row(vec![reason.as_str().to_string(), count.to_string()]);
        }
        println!("{reasons}");
    }

    let mut ledger = table(&["Kickoff", "Match", "Pick", "Odds", "Edge", "Stake", "Result", "Profit", "Bankroll"]);
    for entry in report.ledger.iter().take(args.limit) {
        ledger.add_row(vec![
            entry.kickoff.format("%Y-%m-%d %H:%M").to_string(),
            entry.match_id.clone(),
            format!("{:?}", entry.selection),
            entry.odds.round_dp(2).to_string(),
            format!("{:.3}", entry.edge),
            entry.stake.to_string(),
            format!("{:?}", entry.result),
            entry.profit.to_string(),
            entry.bankroll_after.to_string(),
        ]);
    }
    println!("{ledger}");
    Ok(())
}

fn print_audits(audits: &[core_types::TransitionAudit]) {
    let mut out = table(&["Strategy", "From", "To", "Reason", "Actor", "Detail"]);
    for audit in audits {
        out.add_row(vec![
            audit.strategy_id.to_string(),
            audit.from.to_string(),
            audit.to.to_string(),
            format!("{:?}", audit.reason),
            audit.actor.clone(),
            audit.detail.clone(),
        ]);
    }
    println!("{out}");
}

async fn handle_activate(args: ActivateArgs, config: &Config, store: &Arc<DbRepository>) -> anyhow::Result<()> {
    let promotion = PromotionManager::from_config(config);
    let now = Utc::now();
    let audits = match (args.manual, args.reason) {
        (true, Some(reason)) => {
            promotion
                .activate_manual(store.as_ref(), args.strategy, &args.actor, &reason, now)
                .await?
        }
        _ => {
            let strategy = store.get_strategy(args.strategy).await?;
            let policy = config
                .policy
                .for_market(&store.current_policy().await?, &strategy.market)?;
            promotion
                .promote(store.as_ref(), args.strategy, &policy.values, &args.actor, now)
                .await?
        }
    };
    print_audits(&audits);
    Ok(())
}

async fn handle_archive(args: ArchiveArgs, config: &Config, store: &Arc<DbRepository>) -> anyhow::Result<()> {
    let audit = PromotionManager::from_config(config)
        .archive(store.as_ref(), args.strategy, &args.actor, &args.reason, Utc::now())
        .await?;
    print_audits(std::slice::from_ref(&audit));
    Ok(())
}

async fn handle_override(args: OverrideArgs, store: &Arc<DbRepository>) -> anyhow::Result<()> {
    if args.hours <= 0 {
        anyhow::bail!("--hours must be positive");
    }
    let starts_at = Utc::now();
    let market_override = MarketOverride {
        id: Uuid::new_v4(),
        market: MarketId::new(&args.market),
        starts_at,
        ends_at: starts_at + Duration::hours(args.hours),
        reason: args.reason,
        actor: args.actor,
    };
    store.add_override(&market_override).await?;
    info!(
        market = %market_override.market,
        ends_at = %market_override.ends_at,
        actor = %market_override.actor,
        "Market suppressed"
    );
    println!(
        "{} suppressed until {}",
        market_override.market, market_override.ends_at
    );
    Ok(())
}

async fn handle_drift_check(
    args: DriftCheckArgs,
    config: &Config,
    store: &Arc<DbRepository>,
    governor: &Arc<ResourceGovernor>,
) -> anyhow::Result<()> {
    let monitor = DriftMonitor::new(Arc::clone(store), Arc::clone(governor), config);
    let markets = if args.markets.is_empty() {
        monitor.active_markets().await?
    } else {
        market_ids(&args.markets)
    };
    let results = monitor.sweep(&markets, Utc::now()).await?;

    let mut out = table(&["Market", "Tips", "Realized ROI", "Expected ROI", "Divergence", "Rolled back"]);
    for result in &results {
        let reading = result.reading;
        let cell = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
        out.add_row(vec![
            result.market.to_string(),
            reading.map_or_else(|| "-".to_string(), |r| r.tips.to_string()),
            cell(reading.map(|r| r.realized_roi)),
            cell(reading.map(|r| r.expected_roi)),
            cell(reading.map(|r| r.divergence)),
            result
                .rollback
                .as_ref()
                .map_or_else(|| "no".to_string(), |a| a.strategy_id.to_string()),
        ]);
    }
    println!("{out}");
    Ok(())
}

async fn handle_policy_set(args: PolicySetArgs, store: &Arc<DbRepository>) -> anyhow::Result<()> {
    let value = serde_json::from_str(&args.value)
        .unwrap_or_else(|_| serde_json::Value::String(args.value.clone()));
    let snapshot = store
        .update_policy(&args.key, value, &args.actor, &args.reason, Utc::now())
        .await?;
    if let Some(change) = store.policy_history().await?.last() {
        println!(
            "{} changed from {} to {} (policy v{})",
            change.key, change.old_value, change.new_value, snapshot.version
        );
    }
    Ok(())
}
