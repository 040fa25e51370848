//! Aggregate health snapshot over the background set.

use std::collections::BTreeMap;

use tracing::info;

use crate::crank::BackgroundRound;
use crate::types::{RoundId, RoundStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub current_round: RoundId,
    pub tracked: usize,
    pub by_status: BTreeMap<RoundStatus, usize>,
    pub due_for_retry: usize,
    pub max_retry_count: u32,
    /// Rounds whose last pass found participants still owed a refund.
    pub rounds_blocked_on_refund: usize,
    pub participants_blocked_on_refund: u64,
}

impl HealthSnapshot {
    pub fn collect<'a>(
        current_round: RoundId,
        rounds: impl IntoIterator<Item = &'a BackgroundRound>,
        now_ms: u64,
    ) -> Self {
        let mut snapshot = HealthSnapshot {
            current_round,
            ..Default::default()
        };
        for round in rounds {
            snapshot.tracked += 1;
            *snapshot.by_status.entry(round.status).or_default() += 1;
            if round.backoff.retry_count > 0 && round.backoff.is_due(now_ms) {
                snapshot.due_for_retry += 1;
            }
            snapshot.max_retry_count = snapshot.max_retry_count.max(round.backoff.retry_count);
            if round.last_stats.blocked > 0 {
                snapshot.rounds_blocked_on_refund += 1;
                snapshot.participants_blocked_on_refund += u64::from(round.last_stats.blocked);
            }
        }
        snapshot
    }

    pub fn count(&self, status: RoundStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or_default()
    }

    pub fn log(&self) {
        info!(
            current_round = self.current_round,
            tracked = self.tracked,
            settled = self.count(RoundStatus::Settled),
            claimed = self.count(RoundStatus::Claimed),
            cancelled = self.count(RoundStatus::Cancelled),
            other = self.tracked
                - self.count(RoundStatus::Settled)
                - self.count(RoundStatus::Claimed)
                - self.count(RoundStatus::Cancelled),
            due_for_retry = self.due_for_retry,
            max_retry_count = self.max_retry_count,
            rounds_blocked_on_refund = self.rounds_blocked_on_refund,
            participants_blocked_on_refund = self.participants_blocked_on_refund,
            "Crank health"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffState;
    use crate::crank::CleanupStats;

    fn tracked(id: RoundId, status: RoundStatus, retries: u32, next_at: u64, blocked: u32) -> BackgroundRound {
        BackgroundRound {
            round_id: id,
            status,
            since_ms: 0,
            archived: false,
            backoff: BackoffState {
                current_delay_ms: 1_000,
                next_eligible_at_ms: next_at,
                retry_count: retries,
                last_reason: None,
            },
            last_stats: CleanupStats {
                blocked,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_collect_counts() {
        let rounds = vec![
            tracked(1, RoundStatus::Cancelled, 3, 500, 2),
            tracked(2, RoundStatus::Cancelled, 1, 5_000, 1),
            tracked(3, RoundStatus::Settled, 0, 0, 0),
            tracked(4, RoundStatus::Claimed, 6, 900, 0),
        ];
        let snapshot = HealthSnapshot::collect(9, &rounds, 1_000);

        assert_eq!(snapshot.current_round, 9);
        assert_eq!(snapshot.tracked, 4);
        assert_eq!(snapshot.count(RoundStatus::Cancelled), 2);
        assert_eq!(snapshot.count(RoundStatus::Settled), 1);
        assert_eq!(snapshot.due_for_retry, 2);
        assert_eq!(snapshot.max_retry_count, 6);
        assert_eq!(snapshot.rounds_blocked_on_refund, 2);
        assert_eq!(snapshot.participants_blocked_on_refund, 3);
    }
}
