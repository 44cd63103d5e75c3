use candlebot::config::{Cli, Config};
use clap::Parser;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    tracing::info!(
        symbols = ?config.symbols,
        interval = %config.interval,
        test_mode = config.test_mode,
        strategies = ?config.strategies.active,
        "candlebot starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut orchestrator = tokio::spawn(candlebot::orchestrator::run(config, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(true);
            // let every trader drain and flush before exit
            match (&mut orchestrator).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(error = ?err, "orchestrator failed during shutdown"),
                Err(err) => tracing::error!(error = %err, "orchestrator task panicked"),
            }
        }
        result = &mut orchestrator => {
            match result {
                Ok(Ok(())) => tracing::info!("orchestrator finished"),
                Ok(Err(err)) => tracing::error!(error = ?err, "orchestrator failed"),
                Err(err) => tracing::error!(error = %err, "orchestrator task panicked"),
            }
        }
    }

    tracing::info!("candlebot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("candlebot=info")),
        )
        .init();
}
