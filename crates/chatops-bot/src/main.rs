//! Chat-operations bot - main entry point.

use anyhow::Context;
use chatops_bot::console::{self, Console};
use chatops_bot::{App, AppResult, Config};
use chatops_core::{Shutdown, ShutdownState};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let mut config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.bot.log_level);

    info!("Starting chat-operations bot...");

    let (out, rx) = mpsc::unbounded_channel();
    let printer = console::spawn_printer(rx);
    let mut input = Box::pin(console::lines(BufReader::new(tokio::io::stdin())));
    let shutdown = Shutdown::new();

    loop {
        let console_settings = config.console.clone();
        let app = App::build(config, shutdown.clone()).await?;
        let mut console = Console::new(console_settings, out.clone());

        let state = tokio::select! {
            state = console.run(&app.dispatcher, &mut input) => state?,
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                ShutdownState::Dying
            }
        };
        if !shutdown.is_set() {
            shutdown.set(state)?;
        }
        app.drain(DRAIN_TIMEOUT).await;

        if state != ShutdownState::Restarting {
            break;
        }
        info!("Restarting...");
        shutdown.clear();
        config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                error!("Reloading configuration failed: {:#}", e);
                return Err(e.into());
            }
        };
    }

    info!("Shutting down...");
    drop(out);
    if let Err(e) = printer.await {
        warn!(error = %e, "Console printer ended abnormally");
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
