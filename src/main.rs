//! Tallymark server and command line
//!
//! `serve` (the default) runs the engine with its admin HTTP surface until
//! Ctrl+C or SIGTERM. `add` records a single event and prints the new count.

use clap::{Arg, ArgMatches, Command};
use std::sync::Arc;
use tallymark::api::{start_server, AppState};
use tallymark::core::config::parse_storage_type;
use tallymark::engine::translator::{translate, Format};
use tallymark::engine::{open_engine, ConfiguredEngine};
use tallymark::system::metrics;
use tallymark::{Config, Error, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // Load configuration
    let mut config = if let Some(config_path) = matches.get_one::<String>("config") {
        let mut config = Config::from_file(config_path)?;
        config.apply_env_overrides()?;
        config
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    apply_cli_overrides(&mut config, &matches)?;
    config.validate()?;

    tallymark::init(&config.logging)?;

    match matches.subcommand() {
        Some(("add", args)) => run_add(config, args).await,
        _ => serve(config).await,
    }
}

fn cli() -> Command {
    Command::new("tallymark")
        .version(tallymark::VERSION)
        .about("Entity tagging engine with bucketed event counts.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory path")
        )
        .arg(
            Arg::new("storage-type")
                .long("storage-type")
                .value_name("TYPE")
                .help("Storage backend type (lmdb, memory)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("flush-interval-ms")
                .long("flush-interval-ms")
                .value_name("MS")
                .help("Interval between background flushes")
        )
        .arg(
            Arg::new("total-queues")
                .long("total-queues")
                .value_name("N")
                .help("Number of operation queues")
        )
        .subcommand(Command::new("serve").about("Run the engine and admin server (default)"))
        .subcommand(
            Command::new("add")
                .about("Record one event and print the new count")
                .arg(Arg::new("namespace").required(true))
                .arg(Arg::new("bitmap").required(true))
                .arg(Arg::new("entity_id").required(true)),
        )
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.storage.data_dir = data_dir.into();
    }

    if let Some(storage_type) = matches.get_one::<String>("storage-type") {
        config.storage.storage_type = parse_storage_type(storage_type)?;
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    if let Some(ms) = matches.get_one::<String>("flush-interval-ms") {
        config.engine.maintenance.flush_interval_ms = ms.parse()
            .map_err(|e| Error::config(format!("Invalid flush interval: {}", e)))?;
    }

    if let Some(queues) = matches.get_one::<String>("total-queues") {
        config.engine.routing.total_queues = queues.parse()
            .map_err(|e| Error::config(format!("Invalid queue count: {}", e)))?;
    }

    Ok(())
}

/// Record one event from the command line
async fn run_add(config: Config, args: &ArgMatches) -> Result<()> {
    let field = |name: &str| args.get_one::<String>(name).cloned().unwrap_or_default();
    let (namespace, bitmap, entity_id) = (field("namespace"), field("bitmap"), field("entity_id"));

    let engine = Arc::new(open_engine(&config.storage, config.engine.clone())?);
    let response = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.add(&namespace, &bitmap, &entity_id))
            .await
            .map_err(|e| Error::server(format!("add task failed: {}", e)))?
    };
    stop_engine(engine).await?;

    print!("{}", translate(&response, Format::Text)?);
    Ok(())
}

/// Run until a shutdown signal arrives
async fn serve(config: Config) -> Result<()> {
    info!("Starting tallymark v{}", tallymark::VERSION);
    info!("Storage: {:?} at {:?}", config.storage.storage_type, config.storage.data_dir);

    let engine = Arc::new(open_engine(&config.storage, config.engine.clone())?);
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if config.metrics.enable_http {
        let registered = metrics::init_registry()?;

        // Sample engine statistics into the registry
        let sampler_engine = Arc::clone(&engine);
        let interval = config.metrics.collection_interval();
        let mut stop = stop_rx.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => registered.observe(&sampler_engine.stats()),
                    _ = stop.changed() => break,
                }
            }
            Ok::<(), Error>(())
        }));

        let state = AppState::new(Arc::clone(&engine));
        let mut stop = stop_rx.clone();
        tasks.push(tokio::spawn(start_server(config.server.http_addr, state, async move {
            let _ = stop.changed().await;
        })));
    }

    // Wait for shutdown signal
    setup_shutdown_handler().await;
    warn!("Received shutdown signal, initiating graceful shutdown...");

    let _ = stop_tx.send(true);
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Background task failed: {}", e),
            Err(e) => warn!("Background task panicked: {}", e),
        }
    }

    stop_engine(engine).await?;
    info!("Shutdown complete");
    Ok(())
}

/// Drain the engine off the async runtime; shutdown joins threads
async fn stop_engine(engine: Arc<ConfiguredEngine>) -> Result<()> {
    tokio::task::spawn_blocking(move || engine.shutdown())
        .await
        .map_err(|e| Error::server(format!("shutdown task failed: {}", e)))??;
    Ok(())
}

/// Setup graceful shutdown signal handling
async fn setup_shutdown_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
