//! Retry/backoff planning for background cleanup.
//!
//! Pure functions only: the cleanup engine classifies what happened on a pass and
//! asks [`plan_retry`] when the round should be looked at again.

use serde::{Deserialize, Serialize};

/// Backoff bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub min_ms: u64,
    pub max_ms: u64,
    /// Delay used after a pass that made forward progress. Never longer than `min_ms`.
    pub fast_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_ms: 5_000,
            max_ms: 300_000,
            fast_ms: 2_000,
        }
    }
}

/// Per-round backoff bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffState {
    /// Delay used for the last scheduled retry (0 before the first one).
    pub current_delay_ms: u64,
    /// The round is not processed again before this instant.
    pub next_eligible_at_ms: u64,
    pub retry_count: u32,
    pub last_reason: Option<String>,
}

impl BackoffState {
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_eligible_at_ms
    }

    pub fn apply(&mut self, plan: &RetryPlan) {
        self.current_delay_ms = plan.delay_ms;
        self.next_eligible_at_ms = plan.next_eligible_at_ms;
        self.retry_count = plan.retry_count;
        self.last_reason = Some(plan.reason.clone());
    }
}

/// What a cleanup pass ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Participant accounts still exist after this pass.
    ParticipantsPending {
        existing: u32,
        closed: u32,
        blocked: u32,
    },
    /// The round was terminal when tracked but the fresh read right before the close was not.
    LeftTerminalState { status: String },
    /// The round has not reached a terminal status yet (Settled awaiting claim, Open awaiting cancel).
    AwaitingTerminal { status: String },
    /// The round-close submission failed.
    CloseFailed { error: String },
    /// Any other failure (fetch, archive, enumeration).
    BackgroundError { error: String },
}

impl CleanupOutcome {
    pub fn reason(&self) -> String {
        match self {
            CleanupOutcome::ParticipantsPending {
                existing,
                closed,
                blocked,
            } => format!(
                "participants-pending existing={} closed={} blocked={}",
                existing, closed, blocked
            ),
            CleanupOutcome::LeftTerminalState { status } => {
                format!("left-terminal-state status={}", status)
            }
            CleanupOutcome::AwaitingTerminal { status } => {
                format!("awaiting-terminal status={}", status)
            }
            CleanupOutcome::CloseFailed { error } => format!("close-failed: {}", error),
            CleanupOutcome::BackgroundError { error } => format!("background-error: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPlan {
    pub delay_ms: u64,
    pub next_eligible_at_ms: u64,
    pub retry_count: u32,
    pub reason: String,
    pub fast: bool,
}

/// Plan the next retry for a background round.
///
/// Returns `None` when the outcome is `ParticipantsPending` with nothing left,
/// i.e. participant cleanup is actually finished.
pub fn plan_retry(
    policy: &BackoffPolicy,
    state: &BackoffState,
    outcome: &CleanupOutcome,
    now_ms: u64,
) -> Option<RetryPlan> {
    let fast = match outcome {
        CleanupOutcome::ParticipantsPending {
            existing, closed, ..
        } => {
            let remaining = i64::from(*existing) - i64::from(*closed);
            if remaining <= 0 {
                return None;
            }
            *closed > 0
        }
        _ => false,
    };

    let delay_ms = if fast {
        policy.fast_ms.min(policy.min_ms)
    } else {
        next_slow_delay(policy, state.current_delay_ms)
    };

    Some(RetryPlan {
        delay_ms,
        next_eligible_at_ms: now_ms.saturating_add(delay_ms),
        retry_count: state.retry_count.saturating_add(1),
        reason: outcome.reason(),
        fast,
    })
}

/// `clamp(current * 2, min, max)`.
pub fn next_slow_delay(policy: &BackoffPolicy, current_ms: u64) -> u64 {
    current_ms
        .saturating_mul(2)
        .clamp(policy.min_ms, policy.max_ms.max(policy.min_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            min_ms: 1_000,
            max_ms: 8_000,
            fast_ms: 500,
        }
    }

    fn pending(existing: u32, closed: u32, blocked: u32) -> CleanupOutcome {
        CleanupOutcome::ParticipantsPending {
            existing,
            closed,
            blocked,
        }
    }

    #[test]
    fn test_slow_delay_doubles_and_clamps() {
        let policy = policy();
        let mut state = BackoffState::default();
        let outcome = CleanupOutcome::CloseFailed {
            error: "rpc timeout".into(),
        };

        let mut delays = Vec::new();
        for n in 0..6 {
            let plan = plan_retry(&policy, &state, &outcome, 10_000).unwrap();
            assert_eq!(plan.retry_count, n + 1);
            assert!(!plan.fast);
            delays.push(plan.delay_ms);
            state.apply(&plan);
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
        assert_eq!(state.next_eligible_at_ms, 18_000);
    }

    #[test]
    fn test_progress_uses_fast_delay() {
        let policy = policy();
        let state = BackoffState {
            current_delay_ms: 4_000,
            retry_count: 3,
            ..Default::default()
        };

        let plan = plan_retry(&policy, &state, &pending(3, 1, 2), 0).unwrap();
        assert!(plan.fast);
        assert_eq!(plan.delay_ms, 500);
        assert_eq!(plan.retry_count, 4);
    }

    #[test]
    fn test_fast_delay_never_exceeds_min() {
        let policy = BackoffPolicy {
            min_ms: 1_000,
            max_ms: 8_000,
            fast_ms: 60_000,
        };
        let plan = plan_retry(&policy, &BackoffState::default(), &pending(2, 1, 1), 0).unwrap();
        assert_eq!(plan.delay_ms, 1_000);
    }

    #[test]
    fn test_no_progress_doubles() {
        let policy = policy();
        let state = BackoffState {
            current_delay_ms: 2_000,
            retry_count: 1,
            ..Default::default()
        };
        let plan = plan_retry(&policy, &state, &pending(2, 0, 2), 0).unwrap();
        assert!(!plan.fast);
        assert_eq!(plan.delay_ms, 4_000);
    }

    #[test]
    fn test_only_pending_outcome_can_be_fast() {
        let policy = policy();
        let state = BackoffState::default();
        for outcome in [
            CleanupOutcome::LeftTerminalState {
                status: "settled".into(),
            },
            CleanupOutcome::AwaitingTerminal {
                status: "settled".into(),
            },
            CleanupOutcome::CloseFailed {
                error: "x".into(),
            },
            CleanupOutcome::BackgroundError {
                error: "x".into(),
            },
        ] {
            let plan = plan_retry(&policy, &state, &outcome, 0).unwrap();
            assert!(!plan.fast, "{:?} must use the slow path", outcome);
            assert_eq!(plan.delay_ms, policy.min_ms);
        }
    }

    #[test]
    fn test_nothing_remaining_is_noop() {
        let policy = policy();
        let state = BackoffState::default();
        assert_eq!(plan_retry(&policy, &state, &pending(3, 3, 0), 0), None);
        assert_eq!(plan_retry(&policy, &state, &pending(0, 0, 0), 0), None);
    }

    #[test]
    fn test_reason_is_recorded() {
        let policy = policy();
        let mut state = BackoffState::default();
        let plan = plan_retry(&policy, &state, &pending(3, 1, 2), 0).unwrap();
        state.apply(&plan);
        assert_eq!(
            state.last_reason.as_deref(),
            Some("participants-pending existing=3 closed=1 blocked=2")
        );
    }
}
