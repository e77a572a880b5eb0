use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use sweep_common::observability::{LogOptions, init_logging};

mod run;

#[derive(Parser)]
#[command(name = "sweep", about = "Active API security scanner (OWASP API Top 10 probes)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a target API described by an OpenAPI 3 document.
    Scan(ScanArgs),
    /// Remove expired jobs, result blobs, and worker registrations.
    Cleanup(CleanupArgs),
}

#[derive(Args)]
pub struct ScanArgs {
    /// OpenAPI 3 spec (local path or URL)
    #[arg(long)]
    pub spec: Option<String>,
    /// Target server base URL (defaults to the spec's first server)
    #[arg(long)]
    pub server: Option<String>,
    /// Output directory for findings and the queue database
    #[arg(long, default_value = "out")]
    pub out: PathBuf,
    /// Outbound requests per second, 0.1 to 10
    #[arg(long)]
    pub rate: Option<f64>,
    /// Per-chunk request budget, 1 to 500
    #[arg(long = "max-requests")]
    pub max_requests: Option<u32>,
    /// Allow probes that send mutating payloads
    #[arg(long)]
    pub dangerous: bool,
    /// Allow the default-credential auth variant
    #[arg(long = "fuzz-auth")]
    pub fuzz_auth: bool,
    /// Number of in-process workers
    #[arg(long)]
    pub workers: Option<usize>,
    /// Optional sweep.yaml overlay
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct CleanupArgs {
    /// Queue database file
    #[arg(long, default_value = "out/queue.db")]
    pub queue: PathBuf,
    /// Remove records older than this many hours
    #[arg(long = "ttl-hours", default_value_t = 24)]
    pub ttl_hours: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // hold the guard so buffered log lines flush on exit
    let _log = match init_logging(LogOptions::default()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("sweep: logging setup failed: {e:#}");
            None
        }
    };

    let result = match cli.command {
        Command::Scan(args) => run::scan(args).await,
        Command::Cleanup(args) => run::cleanup(args).await,
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "sweep.fatal");
            eprintln!("sweep: {e:#}");
            ExitCode::from(1)
        }
    }
}
