//! Background cleanup: archive, close participant accounts, close the round account.
//!
//! Each tracked round is handled independently. A failure on one round schedules a
//! retry for that round only and never stops the pass.

use tracing::{debug, info, span, warn, Instrument, Level};

use super::core::{CleanupStats, RoundCrank};
use super::lifecycle::timer_expired;
use crate::backoff::{plan_retry, CleanupOutcome, RetryPlan};
use crate::error::{LedgerError, RejectCode};
use crate::traits::{ArchiveClient, LedgerGateway};
use crate::types::{Instruction, RoundId, RoundRecord, RoundStatus};

/// What one background pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundPassSummary {
    /// Rounds that were due and got processed.
    pub processed: usize,
    /// Rounds skipped because their backoff window has not elapsed.
    pub deferred: usize,
    /// Rounds whose account this pass closed.
    pub closed: Vec<RoundId>,
    /// Rounds found already gone and dropped from tracking.
    pub dropped: Vec<RoundId>,
    /// Rounds given a new retry time.
    pub retrying: usize,
}

enum CleanupStep {
    Closed,
    Gone,
    Retry(CleanupOutcome),
}

impl RoundCrank {
    /// Process every due background round.
    pub async fn process_background_rounds(&mut self, now_ms: u64) -> BackgroundPassSummary {
        let mut summary = BackgroundPassSummary::default();
        let ids: Vec<RoundId> = self.background.keys().copied().collect();

        for round_id in ids {
            let Some(entry) = self.background.get(&round_id) else {
                continue;
            };
            if !entry.backoff.is_due(now_ms) {
                summary.deferred += 1;
                continue;
            }
            summary.processed += 1;

            let span = span!(Level::INFO, "cleanup", round_id);
            let step = match self.cleanup_round(round_id, now_ms).instrument(span).await {
                Ok(step) => step,
                Err(e) => {
                    warn!(round_id, "Background cleanup failed: {}", e);
                    CleanupStep::Retry(CleanupOutcome::BackgroundError {
                        error: e.to_string(),
                    })
                }
            };

            match step {
                CleanupStep::Closed => {
                    self.untrack(round_id);
                    summary.closed.push(round_id);
                }
                CleanupStep::Gone => {
                    info!(round_id, "Round account already closed, dropping");
                    self.untrack(round_id);
                    summary.dropped.push(round_id);
                }
                CleanupStep::Retry(outcome) => {
                    self.schedule_retry(round_id, &outcome, now_ms);
                    summary.retrying += 1;
                }
            }
        }

        if summary.processed > 0 {
            debug!(
                processed = summary.processed,
                deferred = summary.deferred,
                closed = summary.closed.len(),
                retrying = summary.retrying,
                "Background pass finished"
            );
        }
        summary
    }

    async fn cleanup_round(
        &mut self,
        round_id: RoundId,
        now_ms: u64,
    ) -> Result<CleanupStep, LedgerError> {
        let Some(round) = self.ledger.get_round(round_id).await? else {
            return Ok(CleanupStep::Gone);
        };
        self.track_background(&round, now_ms);
        self.observe_status(round_id, round.status, now_ms);

        if !round.status.is_terminal() {
            let now_secs = (now_ms / 1_000) as i64;
            if round.status == RoundStatus::Open
                && timer_expired(&round, self.config.lock_buffer_secs, now_secs)
            {
                self.retry_cancel(round_id).await;
            }
            return Ok(CleanupStep::Retry(CleanupOutcome::AwaitingTerminal {
                status: round.status.to_string(),
            }));
        }

        let archived = self
            .background
            .get(&round_id)
            .is_some_and(|entry| entry.archived);
        if !archived {
            let record = RoundRecord::from_snapshot(&round, now_ms / 1_000);
            if let Err(e) = self.archive.put(round_id, &record).await {
                warn!(round_id, "Archive failed: {}", e);
                return Ok(CleanupStep::Retry(CleanupOutcome::BackgroundError {
                    error: format!("archive: {}", e),
                }));
            }
            if let Some(entry) = self.background.get_mut(&round_id) {
                entry.archived = true;
            }
            info!(round_id, archive = self.archive.name(), "Round archived");
        }

        let stats = self.close_participants(round_id).await?;
        if let Some(entry) = self.background.get_mut(&round_id) {
            entry.last_stats = stats;
        }
        let pending = CleanupOutcome::ParticipantsPending {
            existing: stats.existing,
            closed: stats.closed,
            blocked: stats.blocked,
        };
        if self.retry_plan(round_id, &pending, now_ms).is_some() {
            return Ok(CleanupStep::Retry(pending));
        }

        // The listing is capped, so confirm nothing is left before closing the round.
        if !self.ledger.list_participants(round_id, 1).await?.is_empty() {
            return Ok(CleanupStep::Retry(CleanupOutcome::ParticipantsPending {
                existing: stats.closed + 1,
                closed: stats.closed,
                blocked: stats.blocked,
            }));
        }

        match self.ledger.get_round(round_id).await? {
            None => return Ok(CleanupStep::Gone),
            Some(fresh) if !fresh.status.is_terminal() => {
                warn!(round_id, status = %fresh.status, "Round left terminal state before close");
                self.track_background(&fresh, now_ms);
                return Ok(CleanupStep::Retry(CleanupOutcome::LeftTerminalState {
                    status: fresh.status.to_string(),
                }));
            }
            Some(_) => {}
        }

        match self
            .ledger
            .submit(&[Instruction::CloseRound { round_id }])
            .await
        {
            Ok(signature) => {
                info!(round_id, %signature, "Round account closed");
                Ok(CleanupStep::Closed)
            }
            Err(e) if e.is_already_done() => {
                info!(round_id, "Round account closed by another actor");
                Ok(CleanupStep::Closed)
            }
            Err(e) => {
                warn!(round_id, "Round close failed: {}", e);
                Ok(CleanupStep::Retry(CleanupOutcome::CloseFailed {
                    error: e.to_string(),
                }))
            }
        }
    }

    /// Enumerate up to `participant_scan_limit` participants and close up to
    /// `participant_close_batch` of the closable ones, one submission each.
    async fn close_participants(&mut self, round_id: RoundId) -> Result<CleanupStats, LedgerError> {
        let participants = self
            .ledger
            .list_participants(round_id, self.config.participant_scan_limit)
            .await?;

        let (closable, blocked): (Vec<_>, Vec<_>) =
            participants.iter().partition(|p| p.is_closable());
        let mut stats = CleanupStats {
            existing: participants.len() as u32,
            closable: closable.len() as u32,
            closed: 0,
            blocked: blocked.len() as u32,
        };

        for participant in closable.into_iter().take(self.config.participant_close_batch) {
            let ix = Instruction::CloseParticipant {
                round_id,
                depositor: participant.depositor,
            };
            match self.ledger.submit(&[ix]).await {
                Ok(signature) => {
                    stats.closed += 1;
                    debug!(
                        round_id,
                        depositor = %hex::encode(participant.depositor),
                        %signature,
                        "Participant account closed"
                    );
                }
                Err(e) if e.is_already_done() => stats.closed += 1,
                Err(e) if e.reject_code() == Some(RejectCode::RefundPending) => {
                    stats.blocked += 1;
                }
                Err(e) => warn!(
                    round_id,
                    depositor = %hex::encode(participant.depositor),
                    "Participant close failed: {}", e
                ),
            }
        }

        if stats.existing > 0 {
            info!(
                round_id,
                existing = stats.existing,
                closed = stats.closed,
                blocked = stats.blocked,
                "Participant cleanup pass"
            );
        }
        Ok(stats)
    }

    /// Re-attempt the cancel of an expired Open round left in the background set.
    async fn retry_cancel(&mut self, round_id: RoundId) {
        match self
            .ledger
            .submit(&[Instruction::CancelRound { round_id }])
            .await
        {
            Ok(signature) => info!(round_id, %signature, "Under-filled round cancelled"),
            Err(e) if e.is_already_done() => debug!(round_id, "Round already cancelled"),
            Err(e) => debug!(round_id, "Cancel retry failed: {}", e),
        }
    }

    fn retry_plan(&self, round_id: RoundId, outcome: &CleanupOutcome, now_ms: u64) -> Option<RetryPlan> {
        let entry = self.background.get(&round_id)?;
        plan_retry(&self.config.backoff_policy(), &entry.backoff, outcome, now_ms)
    }

    fn schedule_retry(&mut self, round_id: RoundId, outcome: &CleanupOutcome, now_ms: u64) {
        let Some(plan) = self.retry_plan(round_id, outcome, now_ms) else {
            return;
        };
        if let Some(entry) = self.background.get_mut(&round_id) {
            entry.backoff.apply(&plan);
        }
        info!(
            round_id,
            delay_ms = plan.delay_ms,
            retry_count = plan.retry_count,
            fast = plan.fast,
            reason = %plan.reason,
            "Cleanup retry scheduled"
        );
    }
}
