use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use nestmon::ingest;
use nestmon::report;
use nestmon::Config;
use nestmon::Dispatcher;
use nestmon::HttpTransport;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Collect thermostat state from the cloud API by polling, streaming, or both.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "nestmon.toml")]
    config: PathBuf,

    /// Enable poll mode regardless of the configuration file
    #[arg(long)]
    enable_poll: bool,

    /// Enable stream mode regardless of the configuration file
    #[arg(long)]
    enable_stream: bool,

    /// Enable the weather loop; requires a [weather] section
    #[arg(long)]
    enable_weather: bool,
}

/// Cancel `shutdown` once `signal` fires.
///
/// A handler that failed to register never fires; the error is logged and
/// the token is left alone.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Received shutdown signal");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.poll.enabled |= args.enable_poll;
    config.stream.enabled |= args.enable_stream;
    if args.enable_weather {
        match config.weather.as_mut() {
            Some(weather) => weather.enabled = true,
            None => anyhow::bail!("--enable-weather needs a [weather] section with zip and app_id"),
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("nestmon starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let transport = HttpTransport::new(
        config.api.access_token.clone(),
        config.api.request_timeout(),
    )
    .context("building HTTP client")?;
    let weather_transport = HttpTransport::anonymous(config.api.request_timeout())
        .context("building weather HTTP client")?;

    let dispatcher = Dispatcher::from_config(
        &config,
        Arc::new(transport),
        Arc::new(weather_transport),
    );
    if dispatcher.is_empty() {
        anyhow::bail!("no acquisition loop is enabled");
    }

    let (tx, rx) = ingest::channel(config.sink.capacity);
    let consumer = tokio::spawn(report::consume(rx));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown));

    tracing::info!("Press Ctrl+C to exit");
    let report = dispatcher.run(Arc::new(tx), cancel).await;

    let updates = consumer.await.context("consumer task panicked")?;
    tracing::info!(
        updates,
        loops = report.outcomes.len(),
        "nestmon shutdown complete"
    );

    Ok(())
}
