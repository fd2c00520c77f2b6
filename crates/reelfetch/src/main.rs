//! Reelfetch - polls a release feed and downloads new releases through a
//! Transmission daemon

use clap::Parser;
use reelfetch_core::{
    shutdown_channel, Clock, Config, FeedReader, Ledger, Orchestrator, PipelineEvent,
    SystemClock, TorrentGateway, TransmissionClient,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about = "Poll a release feed and download new releases through Transmission")]
struct Args {
    /// JSON config file; defaults to the per-user config location
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("reelfetch: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("reelfetch: cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    log::info!("Starting Reelfetch v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Startup failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, or append to `log_file` in `timestamp - LEVEL - message` form
fn init_logging(config: &Config) -> std::io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = &config.log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} - {} - {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                    record.level(),
                    record.args()
                )
            });
    }

    builder.init();
    Ok(())
}

async fn run(config: Config) -> reelfetch_core::Result<()> {
    config.ensure_directories()?;

    // The only fatal runtime dependency: no daemon, no service
    let daemon = TransmissionClient::connect(&config.daemon).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = TorrentGateway::new(Arc::new(daemon), clock.clone(), &config)?;
    let feed = FeedReader::from_config(&config)?;
    let ledger = Ledger::load(config.ledger_path());

    let (event_sender, event_receiver) = async_channel::unbounded::<PipelineEvent>();
    tokio::spawn(async move {
        while let Ok(event) = event_receiver.recv().await {
            log::debug!("event: {}", event);
        }
    });

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, shutting down");
            trigger.trigger();
        }
    });

    let mut orchestrator =
        Orchestrator::new(config, ledger, Arc::new(feed), gateway, clock).with_events(event_sender);
    orchestrator.run(shutdown).await;
    Ok(())
}
