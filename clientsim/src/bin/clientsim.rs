use std::{num::NonZeroU64, time::Duration};

use clap::Parser;
use clientsim::{
    config::Config,
    interrupt,
    orchestrator::{self, Orchestrator, Summary},
};
use jemallocator::Jemalloc;
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Clientsim run failed: {0}")]
    Orchestrator(#[from] orchestrator::Error),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// the maximum time, in seconds, a single request may take; unbounded if
    /// not set
    #[clap(long)]
    request_timeout_seconds: Option<NonZeroU64>,
    /// seed for the producers' random streams; derived from the clock if not
    /// set
    #[clap(long)]
    seed: Option<u64>,
    /// the maximum time to wait, in seconds, for controlled shutdown of the
    /// runtime
    #[clap(long, default_value_t = 30)]
    max_shutdown_delay: u16,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            request_timeout: self
                .request_timeout_seconds
                .map(|secs| Duration::from_secs(secs.get())),
            seed: self.seed,
            ..Config::default()
        }
    }
}

async fn inner_main(config: Config) -> Result<Summary, Error> {
    let (shutdown_watcher, shutdown_broadcast) = clientsim_signal::signal();
    // Handlers are in place before the first producer starts.
    let _interrupts = interrupt::install(shutdown_broadcast);

    let orchestrator = Orchestrator::new(config);
    info!(
        "Starting {} producers. Press Ctrl+C to stop.",
        orchestrator.workers()
    );
    Ok(orchestrator.run(shutdown_watcher).await?)
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .finish()
        .init();

    let args = Cli::parse();
    let version = env!("CARGO_PKG_VERSION");
    info!("Starting clientsim {version} run.");

    // The runtime hosts every producer's HTTP client, building it is the
    // process-wide initialization of the HTTP subsystem.
    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(args.config()));

    let max_shutdown_delay = Duration::from_secs(args.max_shutdown_delay.into());
    info!(
        "Shutting down runtime with a {} second delay.",
        max_shutdown_delay.as_secs(),
    );
    runtime.shutdown_timeout(max_shutdown_delay);

    let summary = res?;
    info!(
        "All producers stopped. {} messages, {} failed.",
        summary.messages(),
        summary.failures(),
    );
    Ok(())
}
