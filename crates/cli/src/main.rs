//! Command line entry point for the Uniswap V2 sandwich scanner.

use clap::{Args, Parser, Subcommand, ValueEnum};
use sandwich_scan_db::sink::ETHERSCAN_TX;
use sandwich_scan_db::{CsvSink, ProgressFile, ResultSink, SqliteSink};
use sandwich_scan_heuristics::BlockAnalyzer;
use sandwich_scan_ingestion::scanner::{DEFAULT_END_BLOCK, DEFAULT_START_BLOCK};
use sandwich_scan_ingestion::{
    BlockProcessor, BlockSource, DecodePolicy, RetryPolicy, RpcClient, ScanConfig, Scanner,
};
use sandwich_scan_telemetry::{init_logging, AuditLog, LogFormat, Metrics};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sandwich-scan")]
#[command(about = "Detect Uniswap V2 sandwich attacks over a historical Ethereum block range")]
struct Cli {
    /// Log filter (e.g. "info", "sandwich_scan_ingestion=debug"); defaults to RUST_LOG or info
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Json)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a block range and record every sandwich found
    Scan(ScanArgs),
    /// Print the sandwiches of a single block as JSON without recording them
    DetectBlock {
        /// Ethereum archive JSON-RPC URL
        #[arg(long, env = "SANDWICH_SCAN_RPC_URL")]
        rpc_url: String,

        /// Block to inspect
        #[arg(long)]
        block: u64,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout_secs: u64,
    },
    /// Check that the endpoint answers and serves historical blocks and logs
    CheckRpc {
        /// Ethereum archive JSON-RPC URL
        #[arg(long, env = "SANDWICH_SCAN_RPC_URL")]
        rpc_url: String,

        /// Historical block to fetch
        #[arg(long, default_value_t = DEFAULT_START_BLOCK)]
        block: u64,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout_secs: u64,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Ethereum archive JSON-RPC URL
    #[arg(long, env = "SANDWICH_SCAN_RPC_URL")]
    rpc_url: String,

    /// First block of the range (inclusive)
    #[arg(long, default_value_t = DEFAULT_START_BLOCK)]
    start_block: u64,

    /// Last block of the range (inclusive)
    #[arg(long, default_value_t = DEFAULT_END_BLOCK)]
    end_block: u64,

    /// CSV output path
    #[arg(long, default_value = "sandwiches.csv")]
    output: String,

    /// File holding the last fully recorded block
    #[arg(long, default_value = "progress.txt")]
    progress_file: String,

    /// Where detected attacks are recorded
    #[arg(long, value_enum, default_value_t = SinkKind::Csv)]
    sink: SinkKind,

    /// SQLite database path, used with `--sink sqlite`
    #[arg(long, default_value = "sandwiches.db")]
    database_path: String,

    /// Fetch attempts per block before giving up
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Backoff after the first failed attempt, in milliseconds
    #[arg(long, default_value = "500")]
    initial_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds
    #[arg(long, default_value = "30000")]
    max_backoff_ms: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// What to do with a block whose swaps cannot be decoded
    #[arg(long, value_enum, default_value_t = DecodePolicyArg::Abort)]
    decode_policy: DecodePolicyArg,

    /// Transaction URL prefix for the explorer link columns
    #[arg(long, default_value = ETHERSCAN_TX)]
    explorer_tx_url: String,

    /// Log a progress line every this many blocks
    #[arg(long, default_value = "100")]
    report_every: u64,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long)]
    metrics_bind_address: Option<String>,

    /// Append a JSON line per detected attack to this file
    #[arg(long)]
    sample_output_path: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SinkKind {
    Csv,
    Sqlite,
}

#[derive(Clone, Copy, ValueEnum)]
enum DecodePolicyArg {
    Abort,
    Retry,
}

impl From<DecodePolicyArg> for DecodePolicy {
    fn from(arg: DecodePolicyArg) -> Self {
        match arg {
            DecodePolicyArg::Abort => DecodePolicy::Abort,
            DecodePolicyArg::Retry => DecodePolicy::RetryAsTransient,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Pretty => LogFormat::Pretty,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_format.into())?;

    match cli.command {
        Commands::Scan(args) => run_scan(args).await?,
        Commands::DetectBlock {
            rpc_url,
            block,
            request_timeout_secs,
        } => detect_block(&rpc_url, block, request_timeout_secs).await?,
        Commands::CheckRpc {
            rpc_url,
            block,
            request_timeout_secs,
        } => check_rpc(&rpc_url, block, request_timeout_secs).await?,
    }

    Ok(())
}

async fn run_scan(args: ScanArgs) -> anyhow::Result<()> {
    let mut config = ScanConfig::new(args.start_block, args.end_block)?;
    config.retry = RetryPolicy {
        max_attempts: args.max_attempts.max(1),
        initial_backoff: Duration::from_millis(args.initial_backoff_ms),
        max_backoff: Duration::from_millis(args.max_backoff_ms),
        ..RetryPolicy::default()
    };
    config.decode_policy = args.decode_policy.into();
    config.report_every = args.report_every;

    let metrics = Metrics::new()?;
    if let Some(addr) = &args.metrics_bind_address {
        start_metrics_server(addr, metrics.clone()).await?;
    }

    let rpc_client = RpcClient::new(
        &args.rpc_url,
        Duration::from_secs(args.request_timeout_secs),
        metrics.clone(),
    )?;

    let sink: Box<dyn ResultSink> = match args.sink {
        SinkKind::Csv => Box::new(CsvSink::open(&args.output, args.explorer_tx_url.clone())?),
        SinkKind::Sqlite => Box::new(SqliteSink::open(&args.database_path).await?),
    };

    let audit = args.sample_output_path.map(AuditLog::new);
    let processor = BlockProcessor::new(BlockAnalyzer::default(), metrics.clone(), audit);
    let mut scanner = Scanner::new(
        rpc_client,
        processor,
        sink,
        ProgressFile::new(&args.progress_file),
        metrics,
        config,
    );

    let token = scanner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next block boundary");
            token.cancel();
        }
    });

    let summary = scanner.run().await?;
    info!(
        first_block = summary.first_block,
        last_completed_block = summary.last_completed_block,
        blocks_scanned = summary.blocks_scanned,
        sandwiches = summary.attacks_recorded,
        cancelled = summary.cancelled,
        "Scan finished"
    );
    Ok(())
}

async fn detect_block(rpc_url: &str, block_number: u64, timeout_secs: u64) -> anyhow::Result<()> {
    let metrics = Metrics::new()?;
    let rpc_client = RpcClient::new(rpc_url, Duration::from_secs(timeout_secs), metrics.clone())?;
    let processor = BlockProcessor::new(BlockAnalyzer::default(), metrics, None);

    let block = rpc_client.fetch_block(block_number).await?;
    let attacks = processor.process_block(&block)?;
    info!(block_number, sandwiches = attacks.len(), "Block analyzed");

    println!("{}", serde_json::to_string_pretty(&attacks)?);
    Ok(())
}

async fn check_rpc(rpc_url: &str, block_number: u64, timeout_secs: u64) -> anyhow::Result<()> {
    let rpc_client = RpcClient::new(rpc_url, Duration::from_secs(timeout_secs), Metrics::new()?)?;

    let report = rpc_client.check_connectivity(block_number).await?;
    println!("Connected. Latest block: {}", report.latest_block);
    println!(
        "Block {} (timestamp {}): {} transactions, {} Uniswap V2 swap logs",
        report.block_number, report.timestamp, report.transaction_count, report.swap_log_count
    );
    Ok(())
}

async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<()> {
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
    use std::sync::Arc;

    let metrics = Arc::new(metrics);

    async fn metrics_handler(
        State(metrics): State<Arc<Metrics>>,
    ) -> Result<impl IntoResponse, StatusCode> {
        match metrics.gather() {
            Ok(body) => Ok((StatusCode::OK, body)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
