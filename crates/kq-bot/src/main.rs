//! kq quoting bot - entry point.
//!
//! Runs the quoting engine against events fed in by a gateway adapter.
//! Without an adapter attached the bot idles on its timers, which is
//! enough to validate a configuration end to end.

use anyhow::Result;
use clap::Parser;
use kq_bot::{AppConfig, Application, OrderCommand};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// kq market-making quoting bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via KQ_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    kq_telemetry::init_logging()?;

    info!("Starting kq-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > KQ_CONFIG env var > config/default.toml > built-in defaults
    let config = match args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(&path)?
        }
        None => AppConfig::load()?,
    };
    info!(
        base = %config.product.base,
        quote = %config.product.quote,
        mode = %config.quoting.mode,
        "Configuration loaded"
    );

    let (orders_tx, mut orders_rx) = mpsc::unbounded_channel::<OrderCommand>();
    let (_events_tx, events_rx) = mpsc::channel(1000);

    let app = Application::new(config, orders_tx)?;

    let mut topics = app.subscribe();
    let topics_handle = tokio::spawn(async move {
        while let Ok(msg) = topics.recv().await {
            debug!(topic = msg.topic.as_str(), payload = %msg.payload, "Topic");
        }
    });
    let orders_handle = tokio::spawn(async move {
        while let Some(cmd) = orders_rx.recv().await {
            info!(?cmd, "Order command");
        }
    });

    app.run(events_rx).await?;

    orders_handle.abort();
    topics_handle.abort();

    Ok(())
}
