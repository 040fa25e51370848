//! Round state decoder.
//!
//! Accounts are an 8-byte discriminator (`sha256("account:<Name>")[..8]`) followed by the
//! borsh encoding of the matching layout struct below. An all-zero winner means "no winner
//! yet". Trailing bytes are ignored so that accounts allocated with padding still decode.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use crate::error::DecodeError;
use crate::types::{ConfigSnapshot, ParticipantSnapshot, Pubkey, RoundSnapshot, RoundStatus};

pub const DISCRIMINATOR_LEN: usize = 8;

const NO_WINNER: Pubkey = [0u8; 32];

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct RoundAccount {
    pub id: u64,
    pub status: RoundStatus,
    pub start_ts: i64,
    pub end_ts: i64,
    pub participant_count: u32,
    pub total_stake: u64,
    pub total_tickets: u64,
    pub winner: Pubkey,
    pub vrf_reimbursed: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct ParticipantAccount {
    pub round_id: u64,
    pub depositor: Pubkey,
    pub stake: u64,
    pub tickets: u64,
    pub deposit_count: u32,
    pub refundable: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct ConfigAccount {
    pub min_participants: u32,
    pub min_total_stake: u64,
    pub round_duration_secs: i64,
    pub fee_bps: u16,
    pub paused: bool,
    pub next_round_id: u64,
}

/// A borsh layout stored behind an account discriminator.
pub trait Account: BorshSerialize + BorshDeserialize {
    const NAME: &'static str;
}

impl Account for RoundAccount {
    const NAME: &'static str = "Round";
}

impl Account for ParticipantAccount {
    const NAME: &'static str = "Participant";
}

impl Account for ConfigAccount {
    const NAME: &'static str = "Config";
}

pub fn discriminator(account_name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("account:{}", account_name).as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

/// Check the discriminator and deserialize the layout that follows it.
pub fn load<T: Account>(data: &[u8]) -> Result<T, DecodeError> {
    if data.len() < DISCRIMINATOR_LEN {
        return Err(DecodeError::TooShort {
            need: DISCRIMINATOR_LEN,
            have: data.len(),
        });
    }
    let (tag, mut body) = data.split_at(DISCRIMINATOR_LEN);
    if tag != discriminator(T::NAME) {
        return Err(DecodeError::Discriminator(hex::encode(tag)));
    }
    T::deserialize(&mut body).map_err(|e| DecodeError::Layout(format!("{}: {}", T::NAME, e)))
}

/// Discriminator followed by the borsh encoding of `account`.
pub fn store<T: Account>(account: &T) -> Vec<u8> {
    let mut out = discriminator(T::NAME).to_vec();
    // Writing into a Vec cannot fail.
    let _ = account.serialize(&mut out);
    out
}

impl From<RoundAccount> for RoundSnapshot {
    fn from(account: RoundAccount) -> Self {
        RoundSnapshot {
            id: account.id,
            status: account.status,
            start_ts: account.start_ts,
            end_ts: account.end_ts,
            participant_count: account.participant_count,
            total_stake: account.total_stake,
            total_tickets: account.total_tickets,
            winner: (account.winner != NO_WINNER).then_some(account.winner),
            vrf_reimbursed: account.vrf_reimbursed,
        }
    }
}

impl From<&RoundSnapshot> for RoundAccount {
    fn from(round: &RoundSnapshot) -> Self {
        RoundAccount {
            id: round.id,
            status: round.status,
            start_ts: round.start_ts,
            end_ts: round.end_ts,
            participant_count: round.participant_count,
            total_stake: round.total_stake,
            total_tickets: round.total_tickets,
            winner: round.winner.unwrap_or(NO_WINNER),
            vrf_reimbursed: round.vrf_reimbursed,
        }
    }
}

impl From<ParticipantAccount> for ParticipantSnapshot {
    fn from(account: ParticipantAccount) -> Self {
        ParticipantSnapshot {
            round_id: account.round_id,
            depositor: account.depositor,
            stake: account.stake,
            tickets: account.tickets,
            deposit_count: account.deposit_count,
            refundable: account.refundable,
        }
    }
}

impl From<&ParticipantSnapshot> for ParticipantAccount {
    fn from(participant: &ParticipantSnapshot) -> Self {
        ParticipantAccount {
            round_id: participant.round_id,
            depositor: participant.depositor,
            stake: participant.stake,
            tickets: participant.tickets,
            deposit_count: participant.deposit_count,
            refundable: participant.refundable,
        }
    }
}

impl From<ConfigAccount> for ConfigSnapshot {
    fn from(account: ConfigAccount) -> Self {
        ConfigSnapshot {
            min_participants: account.min_participants,
            min_total_stake: account.min_total_stake,
            round_duration_secs: account.round_duration_secs,
            fee_bps: account.fee_bps,
            paused: account.paused,
            next_round_id: account.next_round_id,
        }
    }
}

impl From<&ConfigSnapshot> for ConfigAccount {
    fn from(config: &ConfigSnapshot) -> Self {
        ConfigAccount {
            min_participants: config.min_participants,
            min_total_stake: config.min_total_stake,
            round_duration_secs: config.round_duration_secs,
            fee_bps: config.fee_bps,
            paused: config.paused,
            next_round_id: config.next_round_id,
        }
    }
}

pub fn decode_round(data: &[u8]) -> Result<RoundSnapshot, DecodeError> {
    load::<RoundAccount>(data).map(Into::into)
}

pub fn decode_participant(data: &[u8]) -> Result<ParticipantSnapshot, DecodeError> {
    load::<ParticipantAccount>(data).map(Into::into)
}

pub fn decode_config(data: &[u8]) -> Result<ConfigSnapshot, DecodeError> {
    load::<ConfigAccount>(data).map(Into::into)
}

pub fn encode_round(round: &RoundSnapshot) -> Vec<u8> {
    store(&RoundAccount::from(round))
}

pub fn encode_participant(participant: &ParticipantSnapshot) -> Vec<u8> {
    store(&ParticipantAccount::from(participant))
}

pub fn encode_config(config: &ConfigSnapshot) -> Vec<u8> {
    store(&ConfigAccount::from(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_round() -> RoundSnapshot {
        RoundSnapshot {
            id: 42,
            status: RoundStatus::Settled,
            start_ts: 1_700_000_000,
            end_ts: 1_700_000_600,
            participant_count: 3,
            total_stake: 9_000_000,
            total_tickets: 9_000,
            winner: Some([7u8; 32]),
            vrf_reimbursed: true,
        }
    }

    #[test]
    fn test_decode_round_fields() {
        let round = sample_round();
        let bytes = encode_round(&round);
        // discriminator + id + status + 2 timestamps + count + stake + tickets + winner + flag
        assert_eq!(bytes.len(), 8 + 8 + 1 + 16 + 4 + 8 + 8 + 32 + 1);
        assert_eq!(bytes[16], 3, "status is a one-byte variant index");
        assert_eq!(decode_round(&bytes).unwrap(), round);
    }

    #[test]
    fn test_zero_winner_decodes_as_none() {
        let round = RoundSnapshot {
            winner: None,
            status: RoundStatus::Open,
            ..sample_round()
        };
        let decoded = decode_round(&encode_round(&round)).unwrap();
        assert_eq!(decoded.winner, None);
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let mut bytes = encode_round(&sample_round());
        bytes.extend_from_slice(&[0u8; 64]);
        assert_eq!(decode_round(&bytes).unwrap().id, 42);
    }

    #[test]
    fn test_rejects_missing_discriminator() {
        let err = decode_round(&[0xde, 0xad]).unwrap_err();
        assert_eq!(err, DecodeError::TooShort { need: 8, have: 2 });
    }

    #[test]
    fn test_rejects_truncated_body() {
        let bytes = encode_round(&sample_round());
        assert!(matches!(
            decode_round(&bytes[..20]),
            Err(DecodeError::Layout(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_account_type() {
        let participant = ParticipantSnapshot {
            round_id: 1,
            depositor: [1u8; 32],
            stake: 10,
            tickets: 10,
            deposit_count: 1,
            refundable: 0,
        };
        let bytes = encode_participant(&participant);
        assert!(matches!(
            decode_round(&bytes),
            Err(DecodeError::Discriminator(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_status() {
        let mut bytes = encode_round(&sample_round());
        bytes[DISCRIMINATOR_LEN + 8] = 9;
        assert!(matches!(decode_round(&bytes), Err(DecodeError::Layout(_))));
    }

    #[test]
    fn test_decode_config() {
        let config = ConfigSnapshot {
            min_participants: 2,
            min_total_stake: 1_000,
            round_duration_secs: 300,
            fee_bps: 250,
            paused: false,
            next_round_id: 17,
        };
        assert_eq!(decode_config(&encode_config(&config)).unwrap(), config);
    }
}
