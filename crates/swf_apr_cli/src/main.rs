//! swf-apr CLI: APR curve, simulation, vault reads, drift checks, monitor, ledger.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use swf_apr::apr::{interpolate, AprCurve, BpsCurve};
use swf_apr::chain::{parse_block_tag, to_whole_tokens, BlockTag, Cache, RpcClient};
use swf_apr::config::SwfConfig;
use swf_apr::monitor::{Monitor, MonitorConfig};
use swf_apr::simulate::{apr_ladder, project_stake};
use swf_apr::store::Store;
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string()),
        )
        .with_writer(std::io::stderr)
        .init();
    let config = match &cli.config {
        Some(path) => SwfConfig::load_from_path(path),
        None => SwfConfig::load(),
    };
    match cli.command {
        Command::Apr(args) => run_apr(config, args),
        Command::Ladder(args) => run_ladder(config, args),
        Command::Simulate(args) => run_simulate(config, args),
        Command::Status(args) => run_status(config, args),
        Command::Balance(args) => run_balance(config, args),
        Command::Drift(args) => run_drift(config, args),
        Command::Monitor(args) => run_monitor(config, args),
        Command::Deposit(args) => run_deposit(args),
        Command::Snapshots(args) => run_snapshots(args),
    }
}

#[derive(Parser)]
#[command(name = "swf-apr")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Dynamic APR toolkit for the SWF staking vault")]
struct Cli {
    /// JSON config file (default: $SWF_CONFIG_PATH, ./config/swf.json, ./swf.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// APR for a deposit total.
    Apr(AprArgs),
    /// APR table across a deposit range.
    Ladder(LadderArgs),
    /// Project the APR and reward for a new stake.
    Simulate(SimulateArgs),
    /// Read vault deposits and the resulting APR.
    Status(ChainArgs),
    /// Token balance of a holder.
    Balance(BalanceArgs),
    /// Compare the controller's APR against the curve. Exits 1 on drift.
    Drift(ChainArgs),
    /// Poll the vault and record APR snapshots.
    Monitor(MonitorArgs),
    /// Local deposit ledger.
    Deposit(DepositArgs),
    /// Recorded APR snapshots, newest first.
    Snapshots(SnapshotsArgs),
}

/// Overrides for the configured curve.
#[derive(Args)]
struct CurveArgs {
    #[arg(long)]
    low: Option<f64>,
    #[arg(long)]
    high: Option<f64>,
    #[arg(long)]
    min_apr: Option<f64>,
    #[arg(long)]
    max_apr: Option<f64>,
}

impl CurveArgs {
    fn apply(&self, base: AprCurve) -> AprCurve {
        AprCurve {
            low_threshold: self.low.unwrap_or(base.low_threshold),
            high_threshold: self.high.unwrap_or(base.high_threshold),
            min_apr: self.min_apr.unwrap_or(base.min_apr),
            max_apr: self.max_apr.unwrap_or(base.max_apr),
        }
    }
}

#[derive(Args)]
struct AprArgs {
    /// Deposit total in whole tokens.
    #[arg(long, allow_negative_numbers = true)]
    deposit: f64,
    /// Use the fixed-point basis-point curve.
    #[arg(long)]
    bps: bool,
    #[command(flatten)]
    curve: CurveArgs,
}

#[derive(Args)]
struct LadderArgs {
    #[arg(long, default_value_t = 0.0)]
    from: f64,
    #[arg(long)]
    to: Option<f64>,
    #[arg(long, default_value_t = 10)]
    steps: u32,
    #[command(flatten)]
    curve: CurveArgs,
}

#[derive(Args)]
struct SimulateArgs {
    #[arg(long)]
    stake: f64,
    #[arg(long, default_value_t = 365.0)]
    days: f64,
    /// Current pool total; read from the vault when omitted.
    #[arg(long)]
    pool: Option<f64>,
    #[command(flatten)]
    curve: CurveArgs,
    #[command(flatten)]
    chain: ChainArgs,
}

#[derive(Args)]
struct ChainArgs {
    /// "latest" or a block number.
    #[arg(long, default_value = "latest")]
    block: String,
    #[arg(long, default_value = "./data/cache")]
    cache_dir: PathBuf,
    /// Serve block-pinned reads from the cache only.
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct BalanceArgs {
    #[arg(long)]
    holder: String,
    #[command(flatten)]
    chain: ChainArgs,
}

#[derive(Args)]
struct MonitorArgs {
    /// Stop after this many ticks.
    #[arg(long)]
    iterations: Option<u64>,
    #[arg(long, default_value = "./data/swf.sqlite")]
    db: PathBuf,
    #[arg(long, default_value = "./data/cache")]
    cache_dir: PathBuf,
}

#[derive(Args)]
struct DepositArgs {
    #[arg(long, default_value = "./data/swf.sqlite")]
    db: PathBuf,
    #[command(subcommand)]
    action: DepositAction,
}

#[derive(Subcommand)]
enum DepositAction {
    Add {
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        tx: Option<String>,
    },
    List {
        #[arg(long)]
        address: Option<String>,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        amount: u64,
    },
    Remove {
        #[arg(long)]
        id: i64,
    },
    Total {
        #[arg(long)]
        address: Option<String>,
    },
}

#[derive(Args)]
struct SnapshotsArgs {
    #[arg(long, default_value = "./data/swf.sqlite")]
    db: PathBuf,
    #[arg(long, default_value_t = 20)]
    limit: u32,
}

fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("rpc.sqlite")
}

fn rpc_client(
    config: &SwfConfig,
    cache_dir: &Path,
    offline: bool,
) -> Result<RpcClient, Box<dyn std::error::Error>> {
    let cache = Cache::open(cache_path(cache_dir))?;
    let mut rpc = config.rpc.clone();
    rpc.offline = offline;
    Ok(RpcClient::new(rpc, Some(cache))?)
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_apr(config: SwfConfig, args: AprArgs) -> CliResult {
    let curve = args.curve.apply(config.curve);
    let pct = interpolate(args.deposit, &curve)?;
    if args.bps {
        let bps = BpsCurve::from_percent(&curve)?.apr_bps(args.deposit.trunc() as u64)?;
        println!("{}", bps);
    } else {
        println!("{:.4}", pct);
    }
    Ok(())
}

fn run_ladder(config: SwfConfig, args: LadderArgs) -> CliResult {
    let curve = args.curve.apply(config.curve);
    let to = args.to.unwrap_or(curve.high_threshold * 1.2);
    for row in apr_ladder(&curve, args.from, to, args.steps)? {
        println!("{:>16.2}\t{:>8.4}", row.deposit, row.apr_pct);
    }
    Ok(())
}

fn run_simulate(config: SwfConfig, args: SimulateArgs) -> CliResult {
    let curve = args.curve.apply(config.curve);
    let pool = match args.pool {
        Some(p) => p,
        None => {
            let rpc = rpc_client(&config, &args.chain.cache_dir, args.chain.offline)?;
            let block = BlockTag::from(parse_block_tag(&args.chain.block)?);
            let rt = tokio::runtime::Runtime::new()?;
            let raw = rt.block_on(rpc.read_uint(
                config.vault()?,
                &config.total_deposits_selector,
                block,
            ))?;
            to_whole_tokens(raw, config.token_decimals) as f64
        }
    };
    let projection = project_stake(&curve, pool, args.stake, args.days)?;
    print_json(&projection)
}

fn run_status(config: SwfConfig, args: ChainArgs) -> CliResult {
    let rpc = rpc_client(&config, &args.cache_dir, args.offline)?;
    let monitor = Monitor::new(&rpc, None, MonitorConfig::from_config(&config)?);
    let block = BlockTag::from(parse_block_tag(&args.block)?);
    let rt = tokio::runtime::Runtime::new()?;
    let state = rt.block_on(monitor.read_state(block))?;
    info!(
        url = %rpc.config().url,
        requests = rpc.request_count(),
        attempts = rpc.attempt_count(),
        "status complete"
    );
    print_json(&state)
}

fn run_balance(config: SwfConfig, args: BalanceArgs) -> CliResult {
    let rpc = rpc_client(&config, &args.chain.cache_dir, args.chain.offline)?;
    let block = BlockTag::from(parse_block_tag(&args.chain.block)?);
    let rt = tokio::runtime::Runtime::new()?;
    let raw = rt.block_on(rpc.balance_of(config.token()?, &args.holder, block))?;
    print_json(&serde_json::json!({
        "holder": args.holder,
        "raw": raw.to_string(),
        "tokens": to_whole_tokens(raw, config.token_decimals).to_string(),
    }))
}

fn run_drift(config: SwfConfig, args: ChainArgs) -> CliResult {
    if config.controller().is_none() {
        return Err("drift needs controller_address and current_apr_selector in config".into());
    }
    let rpc = rpc_client(&config, &args.cache_dir, args.offline)?;
    let monitor = Monitor::new(&rpc, None, MonitorConfig::from_config(&config)?);
    let block = BlockTag::from(parse_block_tag(&args.block)?);
    let rt = tokio::runtime::Runtime::new()?;
    let state = rt.block_on(monitor.read_state(block))?;
    let Some(drift) = state.drift else {
        return Err("controller rate was not read".into());
    };
    print_json(&drift)?;
    if !drift.within_tolerance {
        eprintln!(
            "DRIFT\texpected={}\tonchain={}\tdelta={}",
            drift.expected_bps, drift.onchain_bps, drift.delta_bps
        );
        std::process::exit(1);
    }
    Ok(())
}

fn run_monitor(config: SwfConfig, args: MonitorArgs) -> CliResult {
    let rpc = rpc_client(&config, &args.cache_dir, false)?;
    let store = Store::open(&args.db)?;
    let monitor = Monitor::new(&rpc, Some(&store), MonitorConfig::from_config(&config)?);
    info!(
        url = %rpc.config().url,
        interval_secs = monitor.config().interval.as_secs(),
        iterations = ?args.iterations,
        "monitor starting"
    );
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(monitor.run(args.iterations));
    info!(
        requests = rpc.request_count(),
        attempts = rpc.attempt_count(),
        "monitor complete"
    );
    print_json(&summary)
}

fn run_deposit(args: DepositArgs) -> CliResult {
    let store = Store::open(&args.db)?;
    match args.action {
        DepositAction::Add {
            address,
            amount,
            tx,
        } => print_json(&store.insert_deposit(&address, amount, tx.as_deref())?),
        DepositAction::List { address } => print_json(&store.list_deposits(address.as_deref())?),
        DepositAction::Update { id, amount } => {
            store.update_deposit_amount(id, amount)?;
            print_json(&store.get_deposit(id)?)
        }
        DepositAction::Remove { id } => {
            store.delete_deposit(id)?;
            println!("removed {}", id);
            Ok(())
        }
        DepositAction::Total { address } => {
            println!("{}", store.total_deposits(address.as_deref())?);
            Ok(())
        }
    }
}

fn run_snapshots(args: SnapshotsArgs) -> CliResult {
    let store = Store::open(&args.db)?;
    print_json(&store.list_snapshots(args.limit)?)
}
