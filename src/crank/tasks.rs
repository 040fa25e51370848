//! Run loop: startup recovery, then one tick per poll interval until Ctrl-C.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing::{debug, error, info, span, Instrument, Level};

use super::core::RoundCrank;

/// Wall-clock unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl RoundCrank {
    /// Run the crank until a shutdown signal arrives.
    ///
    /// The next tick is scheduled one poll interval after the previous one completes,
    /// and shutdown is only observed between ticks.
    pub async fn run(mut self) -> Result<()> {
        let span = span!(Level::INFO, "crank_run");

        async move {
            info!(
                "Starting RoundCrank with poll_interval_ms={}",
                self.config.poll_interval_ms
            );
            let poll_interval = self.config.poll_interval();

            loop {
                match self.recover(now_millis()).await {
                    Ok(report) => {
                        info!(
                            pointer = report.pointer,
                            recovered = report.recovered.len(),
                            "Startup recovery complete"
                        );
                        break;
                    }
                    Err(e) => {
                        error!("Startup recovery failed, retrying: {}", e);
                        if !sleep_or_shutdown(poll_interval).await {
                            return Ok(());
                        }
                    }
                }
            }

            loop {
                let report = self.tick().await;
                debug!(
                    round_id = report.round_id,
                    action = ?report.action,
                    background_processed = report.background.processed,
                    "Tick finished"
                );

                if !sleep_or_shutdown(poll_interval).await {
                    break;
                }
            }

            info!(
                current_round = self.current_round(),
                tracked = self.background.len(),
                "RoundCrank stopped"
            );
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Sleep for `delay`. Returns false if a shutdown signal arrived first.
async fn sleep_or_shutdown(delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            false
        }
    }
}
