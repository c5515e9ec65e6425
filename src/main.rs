// -----------------------------------------------------------------------------
// hd-injector - load injector for HyperDrive server and client endpoints
// -----------------------------------------------------------------------------

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hd_injector::config::{Config, ConfigOverrides, Topology};
use hd_injector::constants::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_SERVER_ENDPOINT};
use hd_injector::index::{IndexAggregator, IndexEntries, IndexKind};
use hd_injector::request::Endpoint;
use hd_injector::size_parser::parse_size;
use hd_injector::transport::HttpTransport;
use hd_injector::workload;
use tokio::runtime::Builder as RtBuilder;
use tracing::info;

// -----------------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------------
#[derive(Parser)]
#[command(
    name = "hd-injector",
    version,
    about = "Bounded-concurrency load injector for HyperDrive endpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject store operations, then report index counts
    ///
    /// Examples:
    ///   hd-injector run --workers 128 --size 4KiB
    ///   hd-injector run --hd-type client --nrclients 3
    ///   hd-injector run --config injector.yaml --read-back --results-json /tmp/run.json
    Run(RunArgs),
    /// Print the key index of a server endpoint
    Keys {
        #[arg(long, default_value = DEFAULT_SERVER_ENDPOINT)]
        endpoint: String,
    },
    /// Print the group index of a server endpoint
    Groups {
        #[arg(long, default_value = DEFAULT_SERVER_ENDPOINT)]
        endpoint: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// YAML config file; flags below override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of workers in parallel [default: 64]
    #[arg(long)]
    workers: Option<usize>,

    /// Target API: HyperDrive 'server' or 'client' [default: server]
    #[arg(long = "hd-type", value_enum)]
    hd_type: Option<Topology>,

    /// Payload size, e.g. 1048576, 64KiB, 1MiB [default: 1MiB]
    #[arg(long, value_parser = size_arg)]
    size: Option<u64>,

    /// Number of HyperDrive client endpoints [default: 1]
    #[arg(long)]
    nrclients: Option<usize>,

    /// Operations issued by each worker [default: 1]
    #[arg(long)]
    ops_per_worker: Option<usize>,

    /// Process-wide ceiling on workers in flight [default: 1000]
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Server endpoint for server topology
    #[arg(long)]
    server: Option<String>,

    /// Host of the client endpoints
    #[arg(long)]
    client_host: Option<String>,

    /// Port of client endpoint 0
    #[arg(long)]
    client_port: Option<u16>,

    /// Reference server whose group index is reported (repeatable, max 3)
    #[arg(long = "reference")]
    references: Vec<String>,

    /// Retrieve every key right after storing it
    #[arg(long)]
    read_back: bool,

    /// Delete every key after storing it
    #[arg(long)]
    delete: bool,

    /// Seed for reproducible keys and payloads
    #[arg(long)]
    seed: Option<u64>,

    /// Show a progress bar per pool
    #[arg(long)]
    progress: bool,

    /// Write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    results_json: Option<PathBuf>,
}

fn size_arg(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| e.to_string())
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            topology: self.hd_type,
            workers: self.workers,
            ops_per_worker: self.ops_per_worker,
            payload_size: self.size,
            client_count: self.nrclients,
            server: self.server.clone(),
            client_host: self.client_host.clone(),
            client_base_port: self.client_port,
            reference_endpoints: self.references.clone(),
            max_in_flight: self.max_in_flight,
            read_back: self.read_back,
            delete: self.delete,
            seed: self.seed,
            progress: self.progress,
        }
    }
}

// -----------------------------------------------------------------------------
// main
// -----------------------------------------------------------------------------
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::new(format!("hd_injector={},reqwest=warn,hyper=warn", level));
    fmt().with_env_filter(filter).init();

    let rt = RtBuilder::new_multi_thread().enable_all().build()?;

    match cli.command {
        Commands::Run(args) => rt.block_on(run_cmd(args)),
        Commands::Keys { endpoint } => rt.block_on(index_cmd(&endpoint, IndexKind::Keys)),
        Commands::Groups { endpoint } => rt.block_on(index_cmd(&endpoint, IndexKind::Groups)),
    }
}

// -----------------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------------
async fn run_cmd(args: RunArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };
    cfg.apply(args.overrides());
    info!("Effective config: {:?}", cfg);

    let summary = workload::run(&cfg).await?;
    summary.print();

    if let Some(path) = &args.results_json {
        summary.write_json(path)?;
        info!("Run summary written to {}", path.display());
    }
    Ok(())
}

async fn index_cmd(endpoint: &str, kind: IndexKind) -> Result<()> {
    let endpoint = Endpoint::parse(endpoint)?;
    let transport = HttpTransport::new(DEFAULT_MAX_IN_FLIGHT).context("build HTTP client")?;
    let aggregator = IndexAggregator::new(Arc::new(transport));

    let snapshot = aggregator.snapshot(&endpoint, kind).await;
    match &snapshot.entries {
        IndexEntries::Keys(keys) => {
            for k in keys {
                println!("{}\t{}", k.key, k.version);
            }
            println!("\nTotal keys: {}", keys.len());
        }
        IndexEntries::Groups(groups) => {
            for g in groups {
                println!("{}", g);
            }
            println!("\nTotal groups: {}", groups.len());
        }
    }
    Ok(())
}
