use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Fixed-size types used across the system.
pub type RoundId = u64;
pub type Pubkey = [u8; 32];

/// Status of a round as recorded on the ledger.
///
/// Legal transitions:
/// `Open -> Locked -> VrfRequested -> Settled -> Claimed | Cancelled`
/// and `Open -> Cancelled` when an under-filled round is skipped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Open,
    Locked,
    VrfRequested,
    Settled,
    Claimed,
    Cancelled,
}

impl RoundStatus {
    /// Claimed and Cancelled accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Claimed | RoundStatus::Cancelled)
    }

    /// Statuses that belong in the background set: terminal ones plus Settled,
    /// which still waits on a user claim.
    pub fn is_trackable(self) -> bool {
        self.is_terminal() || self == RoundStatus::Settled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Open => "open",
            RoundStatus::Locked => "locked",
            RoundStatus::VrfRequested => "vrf_requested",
            RoundStatus::Settled => "settled",
            RoundStatus::Claimed => "claimed",
            RoundStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort cached view of a round account. The ledger is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub id: RoundId,
    pub status: RoundStatus,
    /// UTC unix timestamp (seconds) the round opened.
    pub start_ts: i64,
    /// UTC unix timestamp (seconds) deposits close.
    pub end_ts: i64,
    pub participant_count: u32,
    pub total_stake: u64,
    pub total_tickets: u64,
    /// Absent until the round settles.
    pub winner: Option<Pubkey>,
    /// Whether the oracle reimbursement has been paid out of the pot.
    pub vrf_reimbursed: bool,
}

impl RoundSnapshot {
    /// Deposits are accepted while Open and before `end_ts`.
    pub fn is_joinable(&self, now_secs: i64) -> bool {
        self.status == RoundStatus::Open && now_secs < self.end_ts
    }
}

/// One depositor's position in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub round_id: RoundId,
    pub depositor: Pubkey,
    /// Cumulative stake deposited.
    pub stake: u64,
    /// Cumulative weighted ticket count.
    pub tickets: u64,
    pub deposit_count: u32,
    /// Balance still owed back to the depositor (non-zero after a cancel until refunded).
    pub refundable: u64,
}

impl ParticipantSnapshot {
    /// A participant account may only be closed once the ledger shows nothing left to refund.
    pub fn is_closable(&self) -> bool {
        self.refundable == 0
    }
}

/// Protocol-wide configuration account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub min_participants: u32,
    pub min_total_stake: u64,
    pub round_duration_secs: i64,
    pub fee_bps: u16,
    pub paused: bool,
    /// Id the next `StartRound` must use.
    pub next_round_id: RoundId,
}

impl ConfigSnapshot {
    pub fn is_filled(&self, round: &RoundSnapshot) -> bool {
        round.participant_count >= self.min_participants
            && round.total_stake >= self.min_total_stake
    }
}

/// Instructions the crank submits. Building and signing the transaction around them
/// is the gateway's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    StartRound {
        round_id: RoundId,
    },
    /// Lock deposits and request randomness in one atomic step.
    LockAndRequestRandomness {
        round_id: RoundId,
    },
    RequestRandomness {
        round_id: RoundId,
    },
    CancelRound {
        round_id: RoundId,
    },
    CloseParticipant {
        round_id: RoundId,
        #[serde(with = "hex_key")]
        depositor: Pubkey,
    },
    CloseRound {
        round_id: RoundId,
    },
}

impl Instruction {
    pub fn round_id(&self) -> RoundId {
        match self {
            Instruction::StartRound { round_id }
            | Instruction::LockAndRequestRandomness { round_id }
            | Instruction::RequestRandomness { round_id }
            | Instruction::CancelRound { round_id }
            | Instruction::CloseParticipant { round_id, .. }
            | Instruction::CloseRound { round_id } => *round_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Instruction::StartRound { .. } => "start_round",
            Instruction::LockAndRequestRandomness { .. } => "lock_and_request_randomness",
            Instruction::RequestRandomness { .. } => "request_randomness",
            Instruction::CancelRound { .. } => "cancel_round",
            Instruction::CloseParticipant { .. } => "close_participant",
            Instruction::CloseRound { .. } => "close_round",
        }
    }
}

/// Record persisted to the archive once a round is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub start_ts: i64,
    pub end_ts: i64,
    pub participant_count: u32,
    pub total_stake: u64,
    pub total_tickets: u64,
    /// Hex-encoded winner key, if any.
    pub winner: Option<String>,
    pub vrf_reimbursed: bool,
    /// UTC unix timestamp (seconds) the crank archived the round.
    pub archived_at: u64,
}

impl RoundRecord {
    pub fn from_snapshot(round: &RoundSnapshot, archived_at: u64) -> Self {
        Self {
            round_id: round.id,
            status: round.status,
            start_ts: round.start_ts,
            end_ts: round.end_ts,
            participant_count: round.participant_count,
            total_stake: round.total_stake,
            total_tickets: round.total_tickets,
            winner: round.winner.map(hex::encode),
            vrf_reimbursed: round.vrf_reimbursed,
            archived_at,
        }
    }
}

/// Events handed to the notification publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundSettled {
        round_id: RoundId,
        winner: Option<String>,
        total_stake: u64,
        participant_count: u32,
    },
}

impl RoundEvent {
    pub fn settled(round: &RoundSnapshot) -> Self {
        RoundEvent::RoundSettled {
            round_id: round.id,
            winner: round.winner.map(hex::encode),
            total_stake: round.total_stake,
            participant_count: round.participant_count,
        }
    }

    pub fn round_id(&self) -> RoundId {
        match self {
            RoundEvent::RoundSettled { round_id, .. } => *round_id,
        }
    }
}

mod hex_key {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("depositor key must be 32 bytes"))
    }
}
