//! Startup recovery: locate the frontier round and rebuild the background backlog.
//!
//! Nothing about the backlog is persisted locally. The ledger is scanned instead.

use tracing::{info, warn};

use super::core::RoundCrank;
use super::lifecycle::timer_expired;
use crate::error::LedgerError;
use crate::scanner::{scan_frontier, scan_start, ScanTarget};
use crate::traits::{ArchiveClient, LedgerGateway};
use crate::types::{RoundId, RoundStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pointer the crank resumes from.
    pub pointer: RoundId,
    pub archive_hint: Option<RoundId>,
    /// Highest round account found by the frontier scan.
    pub frontier: Option<RoundId>,
    /// Rounds newly added to the background set.
    pub recovered: Vec<RoundId>,
}

impl RoundCrank {
    /// Position the pointer and re-register un-swept rounds from the trailing window.
    ///
    /// Safe to call more than once: already tracked rounds are not added twice.
    pub async fn recover(&mut self, now_ms: u64) -> Result<RecoveryReport, LedgerError> {
        let protocol = self.refresh_protocol_config().await?;
        let now_secs = (now_ms / 1_000) as i64;
        let scan_config = self.config.scan_config();

        let archive_hint = match self.archive.max_known_id().await {
            Ok(hint) => hint,
            Err(e) => {
                warn!("Archive max id unavailable, scanning from round 1: {}", e);
                None
            }
        };

        let start = scan_start(archive_hint);
        let mut scan =
            scan_frontier(&self.ledger, start, ScanTarget::Active, &scan_config, now_secs).await?;
        if scan.frontier.is_none() && start > 1 {
            warn!(start, "Nothing found from the archive hint, rescanning from round 1");
            scan = scan_frontier(&self.ledger, 1, ScanTarget::Active, &scan_config, now_secs).await?;
        }

        let frontier = scan.frontier.as_ref().map(|round| round.id);
        self.pointer = frontier.unwrap_or(protocol.next_round_id).max(1);
        info!(
            pointer = self.pointer,
            ?archive_hint,
            ?frontier,
            scanned = scan.scanned,
            next_round_id = protocol.next_round_id,
            "Frontier located"
        );

        let window_start = self
            .pointer
            .saturating_sub(self.config.recovery_window)
            .max(1);
        let ids: Vec<RoundId> = (window_start..self.pointer).collect();
        let mut recovered = Vec::new();

        for chunk in ids.chunks(scan_config.batch_size.max(1)) {
            let rounds = self.ledger.get_rounds(chunk).await?;
            for round in rounds.into_iter().flatten() {
                let expired_underfilled = round.status == RoundStatus::Open
                    && timer_expired(&round, self.config.lock_buffer_secs, now_secs)
                    && !protocol.is_filled(&round);

                if round.status.is_trackable() || expired_underfilled {
                    if self.track_background(&round, now_ms) {
                        recovered.push(round.id);
                    }
                } else {
                    warn!(
                        round_id = round.id,
                        status = %round.status,
                        "Round behind the frontier is not progressing"
                    );
                }
            }
        }

        info!(
            window_start,
            recovered = recovered.len(),
            tracked = self.background.len(),
            "Background backlog recovered"
        );

        Ok(RecoveryReport {
            pointer: self.pointer,
            archive_hint,
            frontier,
            recovered,
        })
    }
}
