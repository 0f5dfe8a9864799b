mod config;
mod supervisor;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use redirlog_logs::{BroadcastHub, LogIngestor};
use redirlog_web::AppState;

use crate::config::Config;

/// Redirlog - live log viewer for the redirect service
#[derive(Parser, Debug)]
#[command(name = "redirlog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to serve the viewer endpoints on
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Number of recent entries kept for replay
    #[arg(long)]
    capacity: Option<usize>,

    /// Echo service lines that carry nothing important
    #[arg(long)]
    passthrough_unmatched: bool,

    /// Redirect service command; reads stdin when omitted
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if args.passthrough_unmatched {
        config.passthrough_unmatched = true;
    }
    config.validate()?;
    Ok(config)
}

async fn run_app(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    // Stderr only; stdout carries the echoed service output
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let hub = BroadcastHub::new(config.hub_config());
    let (ingestor, mut pump) = LogIngestor::spawn(hub.clone(), &config.ingest_config())
        .context("failed to build line classifier")?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(hub.clone(), config.session_config(), &config.probe_reply);

    let mut server = {
        let bind = config.bind;
        let paths = config.route_paths();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { redirlog_web::serve(bind, state, &paths, shutdown).await })
    };

    let mut source = tokio::spawn(supervisor::run(args.command, ingestor, shutdown.clone()));
    let mut source_done = false;

    // The viewer keeps serving after the service exits so its last lines stay visible
    let server_result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break None;
            }

            result = &mut server => break Some(result),

            result = &mut source, if !source_done => {
                source_done = true;
                match result {
                    Ok(Ok(())) => info!("log source finished"),
                    Ok(Err(e)) => error!(error = %format!("{:#}", e), "log source failed"),
                    Err(e) => error!(error = %e, "log source task panicked"),
                }
            }
        }
    };

    shutdown.cancel();
    hub.shutdown();

    let server_result = match server_result {
        Some(result) => result,
        None => server.await,
    };
    if !source_done {
        match source.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %format!("{:#}", e), "log source stopped with an error"),
            Err(e) => warn!(error = %e, "log source task did not stop cleanly"),
        }
    }
    pump.stop();

    server_result
        .context("viewer server task panicked")?
        .context("viewer server failed")?;
    Ok(())
}
