//! Active-round scanner.
//!
//! Walks round ids upward in batches until a run of consecutive missing accounts
//! longer than the configured streak says the scan has passed the frontier.
//! Closed rounds leave gaps, so a single missing id proves nothing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;
use crate::traits::LedgerGateway;
use crate::types::{RoundId, RoundSnapshot};

/// What counts as the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    /// Any round whose account still exists.
    Active,
    /// An Open round whose deposit window has not closed.
    Joinable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Ids fetched per batched read.
    pub batch_size: usize,
    /// Consecutive missing accounts tolerated before concluding the scan.
    pub max_missing_streak: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_missing_streak: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Highest-id round matching the target.
    pub frontier: Option<RoundSnapshot>,
    /// Highest id with an existing account, matching or not.
    pub highest_seen: Option<RoundId>,
    /// Number of ids examined.
    pub scanned: u64,
}

/// Where to start scanning: the archive's max id is a hint, not ground truth.
pub fn scan_start(archive_hint: Option<RoundId>) -> RoundId {
    archive_hint.map(|id| id.max(1)).unwrap_or(1)
}

pub async fn scan_frontier<L>(
    ledger: &L,
    start_id: RoundId,
    target: ScanTarget,
    config: &ScanConfig,
    now_secs: i64,
) -> Result<ScanResult, LedgerError>
where
    L: LedgerGateway + ?Sized,
{
    let batch_size = config.batch_size.max(1) as u64;
    let mut result = ScanResult::default();
    let mut next = start_id.max(1);
    let mut missing_streak = 0usize;

    loop {
        let ids: Vec<RoundId> = (next..next.saturating_add(batch_size)).collect();
        let rounds = ledger.get_rounds(&ids).await?;

        for (id, round) in ids.iter().copied().zip(rounds) {
            result.scanned += 1;
            let Some(round) = round else {
                missing_streak += 1;
                if missing_streak > config.max_missing_streak {
                    debug!(
                        start_id,
                        stopped_at = id,
                        frontier = ?result.frontier.as_ref().map(|r| r.id),
                        "Frontier scan finished"
                    );
                    return Ok(result);
                }
                continue;
            };

            missing_streak = 0;
            result.highest_seen = Some(id);
            let matches = match target {
                ScanTarget::Active => true,
                ScanTarget::Joinable => round.is_joinable(now_secs),
            };
            if matches {
                result.frontier = Some(round);
            }
        }

        next = next.saturating_add(batch_size);
    }
}
