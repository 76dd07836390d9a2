//! Engine entry point.

use clap::Parser;
use lagbot::{App, BotConfig};
use lagbot_executor::{DryRunExecutor, ExecutionClient};
use lagbot_telemetry::{init_logging, EventBus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lagbot", about = "Up/down prediction-market trading engine")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/lagbot.toml")]
    config: PathBuf,

    /// Force paper trading regardless of the configured mode.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let mut config = BotConfig::load(&args.config)?;
    if args.dry_run {
        config.trading.dry_run = true;
    }

    info!(
        config = %args.config.display(),
        dry_run = config.trading.dry_run,
        markets = config.markets.len(),
        "lagbot starting"
    );

    // The live venue client is an external integration; the engine core
    // ships with the paper-trading executor.
    if !config.trading.dry_run {
        warn!("live execution client not configured, falling back to dry run");
    }
    let executor: Arc<dyn ExecutionClient> = Arc::new(DryRunExecutor::new());

    let events = EventBus::default();
    spawn_event_logger(&events);

    let shutdown = CancellationToken::new();
    let (refresh_tx, refresh_rx) = mpsc::channel(4);
    spawn_signal_handlers(shutdown.clone(), refresh_tx);

    let app = App::new(config, executor, events).with_config_path(args.config);
    if let Err(e) = app.run(shutdown, refresh_rx).await {
        error!(?e, "engine failed");
        return Err(e.into());
    }

    Ok(())
}

/// Log every engine event; this is the default event subscriber.
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(?event, "engine event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

/// SIGINT/SIGTERM shut the engine down; SIGHUP refreshes the market set.
fn spawn_signal_handlers(shutdown: CancellationToken, refresh_tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(?e, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sighup = match signal(SignalKind::hangup()) {
                Ok(s) => s,
                Err(e) => {
                    error!(?e, "failed to install SIGHUP handler");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("SIGINT received");
                        shutdown.cancel();
                        return;
                    }
                    _ = sigterm.recv() => {
                        info!("SIGTERM received");
                        shutdown.cancel();
                        return;
                    }
                    _ = sighup.recv() => {
                        info!("SIGHUP received, refreshing markets");
                        let _ = refresh_tx.send(()).await;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = refresh_tx;
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received");
                shutdown.cancel();
            }
        }
    });
}
