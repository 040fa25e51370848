//! Current-round state machine. One `tick` runs to completion before the next is scheduled.

use tracing::{debug, info, span, warn, Instrument, Level};

use super::cleanup::BackgroundPassSummary;
use super::core::RoundCrank;
use super::tasks::now_millis;
use crate::error::{LedgerError, RejectCode};
use crate::traits::LedgerGateway;
use crate::types::{ConfigSnapshot, Instruction, RoundEvent, RoundId, RoundSnapshot, RoundStatus};

/// What a tick did with the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    /// Open and still accepting deposits.
    Waiting { round_id: RoundId },
    Created { round_id: RoundId },
    /// The ledger already had the round; adopted as created.
    CreationAdopted { round_id: RoundId },
    /// Creation submitted earlier or blocked (paused protocol); nothing sent.
    CreationPending { round_id: RoundId },
    /// The round's account is gone (closed); pointer moved past it and any closed run after it.
    GapSkipped { round_id: RoundId },
    /// Expired without filling; cancel attempted, queued for cleanup, pointer moved on.
    SkippedUnderfilled { round_id: RoundId },
    LockRequested { round_id: RoundId },
    RandomnessRequested { round_id: RoundId },
    AwaitingRandomness { round_id: RoundId },
    /// Settled, Claimed or Cancelled: queued for cleanup, pointer moved on.
    Advanced {
        from: RoundId,
        to: RoundId,
        status: RoundStatus,
    },
    /// The fresh re-read before a state change showed another actor got there first.
    Raced {
        round_id: RoundId,
        status: Option<RoundStatus>,
    },
    /// Left to the next tick.
    Failed { round_id: RoundId, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub round_id: RoundId,
    pub action: TickAction,
    pub background: BackgroundPassSummary,
}

impl RoundCrank {
    /// Run one tick against wall-clock time.
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(now_millis()).await
    }

    /// Run one tick as of `now_ms`.
    ///
    /// Background rounds are processed first, then the current round is evaluated.
    /// Errors never escape: they are logged and retried on a later tick.
    pub async fn tick_at(&mut self, now_ms: u64) -> TickReport {
        let round_id = self.pointer;
        let span = span!(Level::INFO, "tick", round_id);

        async move {
            let background = self.process_background_rounds(now_ms).await;

            let action = match self.evaluate_current_round(round_id, now_ms).await {
                Ok(action) => action,
                Err(e) => {
                    warn!(round_id, "Current round evaluation failed: {}", e);
                    TickAction::Failed {
                        round_id,
                        error: e.to_string(),
                    }
                }
            };

            self.maybe_log_health(now_ms);

            TickReport {
                round_id,
                action,
                background,
            }
        }
        .instrument(span)
        .await
    }

    async fn evaluate_current_round(
        &mut self,
        round_id: RoundId,
        now_ms: u64,
    ) -> Result<TickAction, LedgerError> {
        let Some(round) = self.ledger.get_round(round_id).await? else {
            return self.handle_missing_round(round_id).await;
        };

        let now_secs = (now_ms / 1_000) as i64;
        let action = match round.status {
            RoundStatus::Open => {
                if !timer_expired(&round, self.config.lock_buffer_secs, now_secs) {
                    TickAction::Waiting { round_id }
                } else {
                    let protocol = self.protocol_config().await?;
                    if protocol.is_filled(&round) {
                        self.lock_round(round_id, now_ms).await?
                    } else {
                        info!(
                            round_id,
                            participants = round.participant_count,
                            total_stake = round.total_stake,
                            "Round expired under-filled"
                        );
                        self.skip_underfilled(round_id, now_ms).await?
                    }
                }
            }
            RoundStatus::Locked => self.request_randomness(round_id).await?,
            RoundStatus::VrfRequested => TickAction::AwaitingRandomness { round_id },
            RoundStatus::Settled => {
                self.notifications.publish(RoundEvent::settled(&round));
                self.track_background(&round, now_ms);
                self.advance(round_id, round.status)
            }
            RoundStatus::Claimed | RoundStatus::Cancelled => {
                self.track_background(&round, now_ms);
                self.advance(round_id, round.status)
            }
        };

        self.observe_status(round_id, round.status, now_ms);
        Ok(action)
    }

    /// Record the observed status and emit a stuck warning if one is due.
    pub(crate) fn observe_status(&mut self, round_id: RoundId, status: RoundStatus, now_ms: u64) {
        self.stuck.observe(round_id, status, now_ms);
        if let Some(warning) = self.stuck.check(round_id, status, now_ms) {
            warn!(
                round_id,
                status = %warning.status,
                age_secs = warning.age_ms / 1_000,
                threshold_secs = warning.threshold_ms / 1_000,
                "Round appears stuck"
            );
        }
    }

    /// The current round's account does not exist: either it was closed, or it
    /// still has to be created.
    async fn handle_missing_round(&mut self, round_id: RoundId) -> Result<TickAction, LedgerError> {
        if self.last_created.is_some_and(|created| created >= round_id) {
            debug!(round_id, "Creation already submitted, waiting for it to land");
            return Ok(TickAction::CreationPending { round_id });
        }

        let protocol = self.refresh_protocol_config().await?;

        if round_id < protocol.next_round_id {
            self.pointer = self.skip_closed_run(round_id, protocol.next_round_id).await?;
            info!(round_id, next = self.pointer, "Round account already closed, advancing");
            return Ok(TickAction::GapSkipped { round_id });
        }
        if round_id > protocol.next_round_id {
            warn!(
                round_id,
                next_round_id = protocol.next_round_id,
                "Pointer ahead of the ledger, moving back"
            );
            self.pointer = protocol.next_round_id;
            return Ok(TickAction::CreationPending { round_id });
        }
        if protocol.paused {
            debug!(round_id, "Protocol paused, not creating round");
            return Ok(TickAction::CreationPending { round_id });
        }

        match self
            .ledger
            .submit(&[Instruction::StartRound { round_id }])
            .await
        {
            Ok(signature) => {
                self.last_created = Some(round_id);
                info!(round_id, %signature, "Round created");
                Ok(TickAction::Created { round_id })
            }
            Err(e) if e.is_already_done() => {
                self.last_created = Some(round_id);
                info!(round_id, "Round already exists, adopting");
                Ok(TickAction::CreationAdopted { round_id })
            }
            Err(e) => Err(e),
        }
    }

    /// First id after `round_id` whose account is not proven absent, looking ahead at
    /// most one scan batch and never past `next_round_id`.
    async fn skip_closed_run(
        &self,
        round_id: RoundId,
        next_round_id: RoundId,
    ) -> Result<RoundId, LedgerError> {
        let end = next_round_id.min(
            (round_id + 1).saturating_add(self.config.scan_batch_size as u64),
        );
        let ids: Vec<RoundId> = (round_id + 1..end).collect();
        if ids.is_empty() {
            return Ok(round_id + 1);
        }

        let slots = self.ledger.read_rounds(&ids).await?;
        Ok(ids
            .iter()
            .zip(&slots)
            .find(|(_, slot)| slot.is_some())
            .map(|(id, _)| *id)
            .unwrap_or(end))
    }

    async fn lock_round(&mut self, round_id: RoundId, now_ms: u64) -> Result<TickAction, LedgerError> {
        if self.last_locked == Some(round_id) {
            debug!(round_id, "Lock already confirmed, waiting for the status to show it");
            return Ok(TickAction::LockRequested { round_id });
        }

        match self
            .ledger
            .submit(&[Instruction::LockAndRequestRandomness { round_id }])
            .await
        {
            Ok(signature) => {
                self.last_locked = Some(round_id);
                info!(round_id, %signature, "Round locked, randomness requested");
                Ok(TickAction::LockRequested { round_id })
            }
            Err(e) if e.is_already_done() => {
                self.last_locked = Some(round_id);
                info!(round_id, "Round already locked by another actor");
                Ok(TickAction::LockRequested { round_id })
            }
            Err(e) if e.is_under_fill() => {
                info!(round_id, "Ledger reports under-fill: {}", e);
                self.skip_underfilled(round_id, now_ms).await
            }
            Err(e) if e.reject_code() == Some(RejectCode::RoundNotExpired) => {
                debug!(round_id, "Ledger clock behind ours, lock deferred");
                Ok(TickAction::Waiting { round_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Skip locking an under-filled round: cancel it, queue it for cleanup and move on.
    async fn skip_underfilled(
        &mut self,
        round_id: RoundId,
        now_ms: u64,
    ) -> Result<TickAction, LedgerError> {
        let fresh = match self.ledger.get_round(round_id).await? {
            Some(fresh) if fresh.status == RoundStatus::Open => fresh,
            other => {
                let status = other.map(|r| r.status);
                info!(round_id, ?status, "Round changed before skip, re-evaluating next tick");
                return Ok(TickAction::Raced { round_id, status });
            }
        };

        match self
            .ledger
            .submit(&[Instruction::CancelRound { round_id }])
            .await
        {
            Ok(signature) => info!(round_id, %signature, "Under-filled round cancelled"),
            Err(e) if e.is_already_done() => debug!(round_id, "Round already cancelled"),
            Err(e) => warn!(round_id, "Cancel failed, background cleanup will retry: {}", e),
        }

        self.track_background(&fresh, now_ms);
        self.pointer = round_id + 1;
        info!(round_id, next = self.pointer, "Skipped under-filled round");
        Ok(TickAction::SkippedUnderfilled { round_id })
    }

    async fn request_randomness(&mut self, round_id: RoundId) -> Result<TickAction, LedgerError> {
        if self.last_randomness_requested == Some(round_id) {
            return Ok(TickAction::AwaitingRandomness { round_id });
        }

        match self
            .ledger
            .submit(&[Instruction::RequestRandomness { round_id }])
            .await
        {
            Ok(signature) => {
                self.last_randomness_requested = Some(round_id);
                info!(round_id, %signature, "Randomness requested for externally locked round");
                Ok(TickAction::RandomnessRequested { round_id })
            }
            Err(e) if e.is_already_done() => {
                self.last_randomness_requested = Some(round_id);
                Ok(TickAction::AwaitingRandomness { round_id })
            }
            Err(e) => Err(e),
        }
    }

    fn advance(&mut self, round_id: RoundId, status: RoundStatus) -> TickAction {
        self.pointer = round_id + 1;
        info!(round_id, %status, next = self.pointer, "Advancing to next round");
        TickAction::Advanced {
            from: round_id,
            to: self.pointer,
            status,
        }
    }

    /// Cached protocol config, fetched on first use.
    async fn protocol_config(&mut self) -> Result<ConfigSnapshot, LedgerError> {
        match &self.protocol {
            Some(protocol) => Ok(protocol.clone()),
            None => self.refresh_protocol_config().await,
        }
    }

    pub(crate) async fn refresh_protocol_config(&mut self) -> Result<ConfigSnapshot, LedgerError> {
        let protocol = self.ledger.get_config().await?;
        self.protocol = Some(protocol.clone());
        Ok(protocol)
    }

    fn maybe_log_health(&mut self, now_ms: u64) {
        let interval_ms = self.config.health_interval_secs.saturating_mul(1_000);
        if interval_ms == 0 {
            return;
        }
        let due = match self.last_health_ms {
            Some(last) => now_ms.saturating_sub(last) >= interval_ms,
            None => true,
        };
        if due {
            self.health(now_ms).log();
            self.last_health_ms = Some(now_ms);
        }
    }
}

/// Whether an Open round's deposit window plus lock buffer has passed.
pub(crate) fn timer_expired(round: &RoundSnapshot, lock_buffer_secs: i64, now_secs: i64) -> bool {
    now_secs >= round.end_ts.saturating_add(lock_buffer_secs)
}
