use anyhow::Result;
use clap::Parser;
use tracing::info;

use roundcrank::{telemetry, CrankConfig, RoundCrank};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = CrankConfig::parse();

    telemetry::init(config.log_json);
    info!("Starting roundcrank");

    config.validate()?;
    info!(
        "Configuration: ledger={:?}, poll_interval_ms={}, lock_buffer_secs={}",
        config.ledger, config.poll_interval_ms, config.lock_buffer_secs
    );

    let (crank, notifications) = RoundCrank::initialize(config).await?;
    crank.run().await?;

    // The crank has been dropped, so the notification channel is closed and the task drains.
    let _ = notifications.await;

    info!("Roundcrank shutdown complete");
    Ok(())
}
