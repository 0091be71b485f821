#[macro_use]
extern crate log;

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use radius::accounting::queue::AccountingQueue;
use radius::accounting::sync::UsageSync;
use radius::config::{Config, ConfigError};
use radius::handler::RadiusHandler;
use radius::server::{CidrSecretProvider, Server};
use radius::storage::memory::MemoryStorage;

#[derive(Parser, Debug)]
#[command(name = "radiusd", version, about = "RADIUS authentication and accounting daemon")]
struct Args {
    /// Path to the JSON configuration
    #[arg(short = 'c', long = "config", default_value = "./config.json")]
    config: PathBuf,
    /// Log at debug level
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// Log at trace level, dumping every packet
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    #[error("invalid allowlist: {0}")]
    AllowlistError(#[from] ipnetwork::IpNetworkError),
    #[error("failed to listen on {0}: {1}")]
    BindError(String, io::Error),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.debug {
        "trace"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&args).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn wait_for_shutdown(mut receiver: watch::Receiver<bool>) {
    // a dropped sender counts as shutdown as well
    let _ = receiver.wait_for(|stopping| *stopping).await;
}

async fn run(args: &Args) -> Result<(), StartupError> {
    let config = Config::load(&args.config)?;
    info!(
        "loaded {} with {} listeners and {} users",
        args.config.display(),
        config.listeners.len(),
        config.users.len()
    );

    let storage = Arc::new(MemoryStorage::new(config.users.clone()));
    let queue = Arc::new(AccountingQueue::new());
    let handler = RadiusHandler::new(
        storage.clone(),
        queue.clone(),
        &config.server_identity,
        config.eap_state_ttl(),
    );
    let (shutdown_sender, shutdown_receiver) = watch::channel(false);

    let mut listeners: Vec<JoinHandle<io::Result<()>>> = Vec::new();
    for listener in &config.listeners {
        let provider = CidrSecretProvider::new(listener.secret.as_bytes(), &listener.cidr)?;
        let mut server: Server<(), io::Error, _, _> =
            Server::listen(&listener.addr, handler.clone(), provider)
                .await
                .map_err(|e| StartupError::BindError(listener.addr.clone(), e))?;
        match server.get_listen_address() {
            Ok(addr) => info!("listening on {}", addr),
            Err(e) => warn!("listening on {}; {}", listener.addr, e),
        }

        let shutdown = wait_for_shutdown(shutdown_receiver.clone());
        listeners.push(tokio::spawn(async move { server.run(shutdown).await }));
    }

    let sync = Arc::new(UsageSync::new(storage, queue, &config.hostname()));
    let sync_task = {
        let sync = sync.clone();
        let shutdown = wait_for_shutdown(shutdown_receiver.clone());
        let (interval, jitter) = (config.sync_interval(), config.sync_jitter());
        tokio::spawn(async move { sync.run(interval, jitter, shutdown).await })
    };
    let sweeper_task = {
        let sessions = handler.eap_sessions().clone();
        let shutdown = wait_for_shutdown(shutdown_receiver);
        tokio::spawn(async move { sessions.run_sweeper(shutdown).await })
    };

    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for the shutdown signal; {}", e);
    }
    info!("shutting down");
    let _ = shutdown_sender.send(true);

    for listener in listeners {
        match listener.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("listener stopped with an error; {}", e),
            Err(e) => error!("listener task failed; {}", e),
        }
    }
    for task in [sync_task, sweeper_task] {
        if let Err(e) = task.await {
            error!("background task failed; {}", e);
        }
    }

    let flushed = sync.flush().await;
    info!("final sync flushed usage of {} users", flushed);
    Ok(())
}
