use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::decoder;
use crate::error::{LedgerError, RejectCode};
use crate::traits::{LedgerGateway, RoundSlot};
use crate::types::{
    ConfigSnapshot, Instruction, ParticipantSnapshot, Pubkey, RoundId, RoundSnapshot, RoundStatus,
};

/// Failure queued for the next `submit` call.
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    Transport(String),
    Reject(RejectCode),
}

impl From<InjectedFailure> for LedgerError {
    fn from(failure: InjectedFailure) -> Self {
        match failure {
            InjectedFailure::Transport(msg) => LedgerError::Transport(msg),
            InjectedFailure::Reject(code) => LedgerError::rejected(code),
        }
    }
}

#[derive(Clone, Default)]
struct Accounts {
    config: Vec<u8>,
    rounds: BTreeMap<RoundId, Vec<u8>>,
    participants: BTreeMap<(RoundId, Pubkey), Vec<u8>>,
}

#[derive(Default)]
struct MockLedgerState {
    accounts: Accounts,
    submitted: Vec<Instruction>,
    submit_failures: VecDeque<InjectedFailure>,
    reads_failing: bool,
    batch_reads: usize,
    /// Status changes applied right after the next read of a round.
    status_after_read: BTreeMap<RoundId, RoundStatus>,
    now_secs: Option<i64>,
    signature_seq: u64,
}

/// In-memory ledger for testing.
///
/// Accounts are held as raw bytes and decoded on every read, and submitted
/// instructions are applied with the same checks and rejections as the program,
/// atomically per `submit` call.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<MockLedgerState>>,
}

impl MockLedger {
    pub fn new(config: ConfigSnapshot) -> Self {
        let ledger = Self::default();
        ledger.set_config(&config);
        ledger
    }

    pub fn set_config(&self, config: &ConfigSnapshot) {
        self.state.lock().unwrap().accounts.config = decoder::encode_config(config);
    }

    pub fn config(&self) -> ConfigSnapshot {
        let state = self.state.lock().unwrap();
        decoder::decode_config(&state.accounts.config).expect("mock config is always valid")
    }

    pub fn put_round(&self, round: &RoundSnapshot) {
        self.put_raw_round(round.id, decoder::encode_round(round));
    }

    /// Store arbitrary bytes at a round's address (e.g. to simulate corrupt data).
    pub fn put_raw_round(&self, id: RoundId, data: Vec<u8>) {
        self.state.lock().unwrap().accounts.rounds.insert(id, data);
    }

    pub fn put_participant(&self, participant: &ParticipantSnapshot) {
        self.state.lock().unwrap().accounts.participants.insert(
            (participant.round_id, participant.depositor),
            decoder::encode_participant(participant),
        );
    }

    pub fn round(&self, id: RoundId) -> Option<RoundSnapshot> {
        let state = self.state.lock().unwrap();
        state
            .accounts
            .rounds
            .get(&id)
            .and_then(|data| decoder::decode_round(data).ok())
    }

    pub fn participants(&self, round_id: RoundId) -> Vec<ParticipantSnapshot> {
        let state = self.state.lock().unwrap();
        participants_of(&state.accounts, round_id)
    }

    /// Overwrite a round's status, as another actor or the oracle would.
    pub fn set_status(&self, id: RoundId, status: RoundStatus) {
        if let Some(mut round) = self.round(id) {
            round.status = status;
            self.put_round(&round);
        }
    }

    /// Oracle callback: settle a round with a winner.
    pub fn settle(&self, id: RoundId, winner: Pubkey) {
        if let Some(mut round) = self.round(id) {
            round.status = RoundStatus::Settled;
            round.winner = Some(winner);
            self.put_round(&round);
        }
    }

    /// Depositor refund after a cancel.
    pub fn refund(&self, round_id: RoundId, depositor: Pubkey) {
        let mut state = self.state.lock().unwrap();
        let key = (round_id, depositor);
        let Some(data) = state.accounts.participants.get(&key) else {
            return;
        };
        if let Ok(mut participant) = decoder::decode_participant(data) {
            participant.refundable = 0;
            state
                .accounts
                .participants
                .insert(key, decoder::encode_participant(&participant));
        }
    }

    pub fn remove_round(&self, id: RoundId) {
        self.state.lock().unwrap().accounts.rounds.remove(&id);
    }

    pub fn submitted(&self) -> Vec<Instruction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn clear_submitted(&self) {
        self.state.lock().unwrap().submitted.clear();
    }

    pub fn fail_next_submit(&self, failure: InjectedFailure) {
        self.state.lock().unwrap().submit_failures.push_back(failure);
    }

    /// Change a round's status as soon as the next read of it has been served, as an
    /// actor racing the crank between two of its reads would.
    pub fn set_status_after_next_read(&self, id: RoundId, status: RoundStatus) {
        self.state
            .lock()
            .unwrap()
            .status_after_read
            .insert(id, status);
    }

    pub fn set_reads_failing(&self, failing: bool) {
        self.state.lock().unwrap().reads_failing = failing;
    }

    /// Number of `get_rounds` calls served.
    pub fn batch_reads(&self) -> usize {
        self.state.lock().unwrap().batch_reads
    }

    /// Pin the ledger clock used for `StartRound` and expiry checks.
    pub fn set_now(&self, now_secs: i64) {
        self.state.lock().unwrap().now_secs = Some(now_secs);
    }

    fn check_reads(state: &MockLedgerState) -> Result<(), LedgerError> {
        if state.reads_failing {
            return Err(LedgerError::Transport("mock ledger unreachable".into()));
        }
        Ok(())
    }
}

fn participants_of(accounts: &Accounts, round_id: RoundId) -> Vec<ParticipantSnapshot> {
    accounts
        .participants
        .range((round_id, [0u8; 32])..=(round_id, [0xffu8; 32]))
        .filter_map(|(_, data)| decoder::decode_participant(data).ok())
        .collect()
}

fn load_round(accounts: &Accounts, id: RoundId) -> Result<RoundSnapshot, LedgerError> {
    accounts
        .rounds
        .get(&id)
        .and_then(|data| decoder::decode_round(data).ok())
        .ok_or_else(|| LedgerError::rejected(RejectCode::AccountAlreadyClosed))
}

fn store_round(accounts: &mut Accounts, round: &RoundSnapshot) {
    accounts.rounds.insert(round.id, decoder::encode_round(round));
}

fn apply(accounts: &mut Accounts, ix: &Instruction, now_secs: i64) -> Result<(), LedgerError> {
    let mut config =
        decoder::decode_config(&accounts.config).map_err(|e| LedgerError::Transport(e.to_string()))?;

    match ix {
        Instruction::StartRound { round_id } => {
            if accounts.rounds.contains_key(round_id) {
                return Err(LedgerError::rejected(RejectCode::RoundAlreadyExists));
            }
            if config.paused {
                return Err(LedgerError::rejected(RejectCode::ProtocolPaused));
            }
            if *round_id != config.next_round_id {
                return Err(LedgerError::rejected(RejectCode::InvalidStatus));
            }
            store_round(
                accounts,
                &RoundSnapshot {
                    id: *round_id,
                    status: RoundStatus::Open,
                    start_ts: now_secs,
                    end_ts: now_secs + config.round_duration_secs,
                    participant_count: 0,
                    total_stake: 0,
                    total_tickets: 0,
                    winner: None,
                    vrf_reimbursed: false,
                },
            );
            config.next_round_id += 1;
            accounts.config = decoder::encode_config(&config);
        }
        Instruction::LockAndRequestRandomness { round_id } => {
            let mut round = load_round(accounts, *round_id)?;
            match round.status {
                RoundStatus::Open => {}
                RoundStatus::Locked | RoundStatus::VrfRequested => {
                    return Err(LedgerError::rejected(RejectCode::AlreadyLocked))
                }
                _ => return Err(LedgerError::rejected(RejectCode::InvalidStatus)),
            }
            if now_secs < round.end_ts {
                return Err(LedgerError::rejected(RejectCode::RoundNotExpired));
            }
            if round.participant_count < config.min_participants {
                return Err(LedgerError::rejected(RejectCode::InsufficientParticipants));
            }
            if round.total_stake < config.min_total_stake {
                return Err(LedgerError::rejected(RejectCode::InsufficientStake));
            }
            round.status = RoundStatus::VrfRequested;
            store_round(accounts, &round);
        }
        Instruction::RequestRandomness { round_id } => {
            let mut round = load_round(accounts, *round_id)?;
            match round.status {
                RoundStatus::Locked => {
                    round.status = RoundStatus::VrfRequested;
                    store_round(accounts, &round);
                }
                RoundStatus::VrfRequested => {
                    return Err(LedgerError::rejected(RejectCode::RandomnessAlreadyRequested))
                }
                _ => return Err(LedgerError::rejected(RejectCode::InvalidStatus)),
            }
        }
        Instruction::CancelRound { round_id } => {
            let mut round = load_round(accounts, *round_id)?;
            match round.status {
                RoundStatus::Cancelled => {
                    return Err(LedgerError::rejected(RejectCode::AlreadyCancelled))
                }
                RoundStatus::Open if now_secs < round.end_ts => {
                    return Err(LedgerError::rejected(RejectCode::RoundNotExpired))
                }
                RoundStatus::Open if config.is_filled(&round) => {
                    return Err(LedgerError::rejected(RejectCode::InvalidStatus))
                }
                RoundStatus::Open => {}
                _ => return Err(LedgerError::rejected(RejectCode::InvalidStatus)),
            }
            round.status = RoundStatus::Cancelled;
            store_round(accounts, &round);
            for participant in participants_of(accounts, *round_id) {
                let refunded = ParticipantSnapshot {
                    refundable: participant.stake,
                    ..participant
                };
                accounts.participants.insert(
                    (refunded.round_id, refunded.depositor),
                    decoder::encode_participant(&refunded),
                );
            }
        }
        Instruction::CloseParticipant {
            round_id,
            depositor,
        } => {
            let round = load_round(accounts, *round_id)?;
            if !round.status.is_terminal() {
                return Err(LedgerError::rejected(RejectCode::InvalidStatus));
            }
            let key = (*round_id, *depositor);
            let participant = accounts
                .participants
                .get(&key)
                .and_then(|data| decoder::decode_participant(data).ok())
                .ok_or_else(|| LedgerError::rejected(RejectCode::AccountAlreadyClosed))?;
            if !participant.is_closable() {
                return Err(LedgerError::rejected(RejectCode::RefundPending));
            }
            accounts.participants.remove(&key);
        }
        Instruction::CloseRound { round_id } => {
            let round = load_round(accounts, *round_id)?;
            if !round.status.is_terminal() {
                return Err(LedgerError::rejected(RejectCode::InvalidStatus));
            }
            if !participants_of(accounts, *round_id).is_empty() {
                return Err(LedgerError::rejected(RejectCode::ParticipantsRemain));
            }
            accounts.rounds.remove(round_id);
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerGateway for MockLedger {
    fn name(&self) -> &'static str {
        "mock-ledger"
    }

    async fn get_config(&self) -> Result<ConfigSnapshot, LedgerError> {
        let state = self.state.lock().unwrap();
        Self::check_reads(&state)?;
        decoder::decode_config(&state.accounts.config)
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn read_rounds(&self, ids: &[RoundId]) -> Result<Vec<RoundSlot>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        Self::check_reads(&state)?;
        state.batch_reads += 1;
        let slots: Vec<RoundSlot> = ids
            .iter()
            .map(|id| {
                state
                    .accounts
                    .rounds
                    .get(id)
                    .map(|data| decoder::decode_round(data))
            })
            .collect();

        for id in ids {
            let Some(status) = state.status_after_read.remove(id) else {
                continue;
            };
            let current = state
                .accounts
                .rounds
                .get(id)
                .and_then(|data| decoder::decode_round(data).ok());
            if let Some(mut round) = current {
                round.status = status;
                store_round(&mut state.accounts, &round);
            }
        }
        Ok(slots)
    }

    async fn list_participants(
        &self,
        round_id: RoundId,
        limit: usize,
    ) -> Result<Vec<ParticipantSnapshot>, LedgerError> {
        let state = self.state.lock().unwrap();
        Self::check_reads(&state)?;
        Ok(participants_of(&state.accounts, round_id)
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<String, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.extend(instructions.iter().cloned());

        if let Some(failure) = state.submit_failures.pop_front() {
            return Err(failure.into());
        }

        let now_secs = state
            .now_secs
            .unwrap_or_else(|| crate::crank::tasks::now_millis() as i64 / 1_000);
        let mut staged = state.accounts.clone();
        for ix in instructions {
            apply(&mut staged, ix, now_secs)?;
        }
        state.accounts = staged;
        state.signature_seq += 1;
        Ok(format!("mock-sig-{}", state.signature_seq))
    }
}
