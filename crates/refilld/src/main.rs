//! Refill Daemon - serves prefetched values from an external producer
//!
//! Requests arrive on stdin, one JSON argument array per line. Each one is
//! answered on stdout with a single JSON line. Logs go to stderr.

mod driver;
mod producer;

use anyhow::Result;
use clap::Parser;
use refillcache::{CacheConfig, RefillCache, DEFAULT_SNAPSHOT_DIR};
use std::future::Future;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::producer::CommandProducer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding snapshot files
    #[arg(long, env = "REFILL_SNAPSHOT_DIR", default_value = DEFAULT_SNAPSHOT_DIR)]
    snapshot_dir: PathBuf,

    /// Refill a key once fewer than this many values are buffered
    #[arg(short, long, env = "REFILL_THRESHOLD", default_value_t = 2)]
    threshold: usize,

    /// Producer name used for the snapshot file (default: program file name)
    #[arg(short, long)]
    name: Option<String>,

    /// Producer program
    program: String,

    /// Arguments passed to the program ahead of the key arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs on stderr, responses on stdout
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Starting Refill Daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut producer = CommandProducer::new(&args.program, args.program_args);
    if let Some(name) = args.name {
        producer = producer.with_name(name);
    }

    let config = CacheConfig::new()
        .with_threshold(args.threshold)
        .with_snapshot_dir(args.snapshot_dir);
    let cache = RefillCache::new(producer, config)?;

    if let Err(e) = serve(&cache).await {
        error!(error = %e, "Request loop failed");
    }

    if let Err(e) = cache.shutdown().await {
        error!(error = %e, "Final snapshot failed");
    }

    let stats = cache.stats();
    info!(
        ready = stats.ready(),
        loading = stats.loading(),
        refills_succeeded = stats.refills_succeeded(),
        refills_failed = stats.refills_failed(),
        in_flight = cache.in_flight(),
        "Shutting down"
    );

    // Outstanding refills are abandoned rather than awaited
    std::process::exit(0);
}

/// `RUST_LOG` directives when they parse, `info` otherwise
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn serve(cache: &RefillCache<CommandProducer>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let interrupt = tokio::signal::ctrl_c();
    let terminate = terminate();
    tokio::pin!(interrupt, terminate);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Some(response) = driver::handle_line(cache, &line) {
                        stdout.write_all(response.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    }
                }
                None => {
                    info!("Input closed");
                    return Ok(());
                }
            },
            _ = &mut interrupt => {
                info!("Received SIGINT");
                return Ok(());
            }
            _ = &mut terminate => {
                info!("Received SIGTERM");
                return Ok(());
            }
        }
    }
}

/// Resolves on SIGTERM. The handler is installed when this is called, not
/// when the future is first polled.
#[cfg(unix)]
fn terminate() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate());
    async move {
        match sigterm {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
fn terminate() -> impl Future<Output = ()> {
    std::future::pending()
}
