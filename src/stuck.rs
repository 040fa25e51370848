//! Stuck-round detection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{RoundId, RoundStatus};

/// What the crank has seen of a round's status. Reset whenever the status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedState {
    pub status: RoundStatus,
    pub first_observed_ms: u64,
    pub last_seen_ms: u64,
}

impl ObservedState {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.first_observed_ms)
    }
}

/// Per-status staleness thresholds in milliseconds. Zero disables the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckThresholds {
    pub open_ms: u64,
    pub locked_ms: u64,
    pub vrf_requested_ms: u64,
    pub settled_ms: u64,
}

impl StuckThresholds {
    pub fn for_status(&self, status: RoundStatus) -> u64 {
        match status {
            RoundStatus::Open => self.open_ms,
            RoundStatus::Locked => self.locked_ms,
            RoundStatus::VrfRequested => self.vrf_requested_ms,
            RoundStatus::Settled => self.settled_ms,
            RoundStatus::Claimed | RoundStatus::Cancelled => 0,
        }
    }
}

/// Decide whether a stuck warning is due for `(round, status)`.
pub fn should_warn(
    observed: Option<&ObservedState>,
    status: RoundStatus,
    threshold_ms: u64,
    last_warning_ms: Option<u64>,
    repeat_ms: u64,
    now_ms: u64,
) -> bool {
    if threshold_ms == 0 {
        return false;
    }
    let Some(observed) = observed else {
        return false;
    };
    if observed.status != status {
        return false;
    }
    if observed.age_ms(now_ms) < threshold_ms {
        return false;
    }
    match last_warning_ms {
        Some(last) => now_ms.saturating_sub(last) >= repeat_ms,
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckWarning {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub age_ms: u64,
    pub threshold_ms: u64,
}

/// Observed-state records and warning throttles for every round the crank looks at.
#[derive(Debug, Default)]
pub struct StuckDetector {
    thresholds: StuckThresholds,
    repeat_ms: u64,
    observed: HashMap<RoundId, ObservedState>,
    last_warning: HashMap<(RoundId, RoundStatus), u64>,
}

impl StuckDetector {
    pub fn new(thresholds: StuckThresholds, repeat_ms: u64) -> Self {
        Self {
            thresholds,
            repeat_ms,
            observed: HashMap::new(),
            last_warning: HashMap::new(),
        }
    }

    /// Record that `round_id` was seen in `status` at `now_ms`.
    pub fn observe(&mut self, round_id: RoundId, status: RoundStatus, now_ms: u64) {
        match self.observed.get_mut(&round_id) {
            Some(state) if state.status == status => state.last_seen_ms = now_ms,
            _ => {
                self.observed.insert(
                    round_id,
                    ObservedState {
                        status,
                        first_observed_ms: now_ms,
                        last_seen_ms: now_ms,
                    },
                );
            }
        }
    }

    pub fn observed(&self, round_id: RoundId) -> Option<&ObservedState> {
        self.observed.get(&round_id)
    }

    /// Returns a warning (and records it for throttling) when one is due.
    pub fn check(
        &mut self,
        round_id: RoundId,
        status: RoundStatus,
        now_ms: u64,
    ) -> Option<StuckWarning> {
        let threshold_ms = self.thresholds.for_status(status);
        let observed = self.observed.get(&round_id);
        let last = self.last_warning.get(&(round_id, status)).copied();
        if !should_warn(observed, status, threshold_ms, last, self.repeat_ms, now_ms) {
            return None;
        }
        let age_ms = observed.map(|o| o.age_ms(now_ms)).unwrap_or_default();
        self.last_warning.insert((round_id, status), now_ms);
        Some(StuckWarning {
            round_id,
            status,
            age_ms,
            threshold_ms,
        })
    }

    /// Drop everything held for a round that no longer exists.
    pub fn forget(&mut self, round_id: RoundId) {
        self.observed.remove(&round_id);
        self.last_warning.retain(|(id, _), _| *id != round_id);
    }

    pub fn tracked(&self) -> usize {
        self.observed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000;

    fn detector() -> StuckDetector {
        StuckDetector::new(
            StuckThresholds {
                locked_ms: 90 * SEC,
                ..Default::default()
            },
            60 * SEC,
        )
    }

    #[test]
    fn test_warning_cadence() {
        let mut d = detector();
        d.observe(5, RoundStatus::Locked, 0);

        assert!(d.check(5, RoundStatus::Locked, 89 * SEC).is_none());
        let first = d.check(5, RoundStatus::Locked, 90 * SEC).expect("first warning");
        assert_eq!(first.age_ms, 90 * SEC);
        assert!(d.check(5, RoundStatus::Locked, 120 * SEC).is_none());
        assert!(d.check(5, RoundStatus::Locked, 149 * SEC).is_none());
        assert!(d.check(5, RoundStatus::Locked, 150 * SEC).is_some());
    }

    #[test]
    fn test_status_change_resets_age() {
        let mut d = detector();
        d.observe(5, RoundStatus::Locked, 0);
        d.observe(5, RoundStatus::VrfRequested, 80 * SEC);
        d.observe(5, RoundStatus::Locked, 85 * SEC);
        assert!(d.check(5, RoundStatus::Locked, 100 * SEC).is_none());
        assert!(d.check(5, RoundStatus::Locked, 175 * SEC).is_some());
    }

    #[test]
    fn test_same_status_keeps_first_observed() {
        let mut d = detector();
        d.observe(5, RoundStatus::Locked, 0);
        d.observe(5, RoundStatus::Locked, 50 * SEC);
        let state = d.observed(5).unwrap();
        assert_eq!(state.first_observed_ms, 0);
        assert_eq!(state.last_seen_ms, 50 * SEC);
    }

    #[test]
    fn test_predicate_requires_matching_status() {
        let observed = ObservedState {
            status: RoundStatus::Settled,
            first_observed_ms: 0,
            last_seen_ms: 0,
        };
        assert!(!should_warn(
            Some(&observed),
            RoundStatus::Locked,
            SEC,
            None,
            SEC,
            100 * SEC
        ));
    }

    #[test]
    fn test_zero_threshold_disables() {
        let mut d = detector();
        d.observe(1, RoundStatus::Open, 0);
        assert!(d.check(1, RoundStatus::Open, 10_000 * SEC).is_none());
    }

    #[test]
    fn test_forget_clears_throttle() {
        let mut d = detector();
        d.observe(5, RoundStatus::Locked, 0);
        assert!(d.check(5, RoundStatus::Locked, 90 * SEC).is_some());
        d.forget(5);
        assert_eq!(d.tracked(), 0);
        d.observe(5, RoundStatus::Locked, 0);
        assert!(d.check(5, RoundStatus::Locked, 100 * SEC).is_some());
    }
}
