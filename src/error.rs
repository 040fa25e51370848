use thiserror::Error;

use crate::types::RoundId;

/// Program-level rejection reasons the crank distinguishes.
///
/// The numeric values are the ledger program's custom error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectCode {
    InsufficientParticipants,
    InsufficientStake,
    AlreadyLocked,
    RoundNotExpired,
    RoundAlreadyExists,
    RandomnessAlreadyRequested,
    AlreadyCancelled,
    AccountAlreadyClosed,
    RefundPending,
    ParticipantsRemain,
    InvalidStatus,
    ProtocolPaused,
    Other(u32),
}

const CODE_TABLE: [(u32, RejectCode); 12] = [
    (6000, RejectCode::InsufficientParticipants),
    (6001, RejectCode::InsufficientStake),
    (6002, RejectCode::AlreadyLocked),
    (6003, RejectCode::RoundNotExpired),
    (6004, RejectCode::RoundAlreadyExists),
    (6005, RejectCode::RandomnessAlreadyRequested),
    (6006, RejectCode::AlreadyCancelled),
    (6007, RejectCode::AccountAlreadyClosed),
    (6008, RejectCode::RefundPending),
    (6009, RejectCode::ParticipantsRemain),
    (6010, RejectCode::InvalidStatus),
    (6011, RejectCode::ProtocolPaused),
];

impl RejectCode {
    pub fn from_code(code: u32) -> Self {
        CODE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, r)| *r)
            .unwrap_or(RejectCode::Other(code))
    }

    pub fn code(self) -> u32 {
        match self {
            RejectCode::Other(code) => code,
            known => CODE_TABLE
                .iter()
                .find(|(_, r)| *r == known)
                .map(|(c, _)| *c)
                .unwrap_or_default(),
        }
    }

    /// Someone (possibly this process before a restart) already performed the action.
    pub fn is_already_done(self) -> bool {
        matches!(
            self,
            RejectCode::AlreadyLocked
                | RejectCode::RoundAlreadyExists
                | RejectCode::RandomnessAlreadyRequested
                | RejectCode::AlreadyCancelled
                | RejectCode::AccountAlreadyClosed
        )
    }

    /// The round cannot be settled because it did not fill.
    pub fn is_under_fill(self) -> bool {
        matches!(
            self,
            RejectCode::InsufficientParticipants | RejectCode::InsufficientStake
        )
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectCode::Other(code) => write!(f, "custom program error {}", code),
            known => write!(f, "{:?} ({})", known, known.code()),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger rejected instruction: {code}: {message}")]
    Rejected { code: RejectCode, message: String },

    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("round {round_id} account is undecodable: {source}")]
    Decode {
        round_id: RoundId,
        source: DecodeError,
    },
}

impl LedgerError {
    pub fn rejected(code: RejectCode) -> Self {
        LedgerError::Rejected {
            code,
            message: code.to_string(),
        }
    }

    pub fn reject_code(&self) -> Option<RejectCode> {
        match self {
            LedgerError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_already_done(&self) -> bool {
        self.reject_code().is_some_and(RejectCode::is_already_done)
    }

    pub fn is_under_fill(&self) -> bool {
        self.reject_code().is_some_and(RejectCode::is_under_fill)
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("account data too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },

    #[error("unexpected account discriminator {0}")]
    Discriminator(String),

    #[error("malformed account layout: {0}")]
    Layout(String),

    #[error("account holds round {found}, expected {expected}")]
    IdMismatch { expected: u64, found: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table_round_trips_known_codes() {
        for (code, reject) in CODE_TABLE {
            assert_eq!(RejectCode::from_code(code), reject);
            assert_eq!(reject.code(), code);
        }
        assert_eq!(RejectCode::from_code(42), RejectCode::Other(42));
        assert_eq!(RejectCode::Other(42).code(), 42);
    }

    #[test]
    fn test_classification() {
        assert!(LedgerError::rejected(RejectCode::InsufficientStake).is_under_fill());
        assert!(LedgerError::rejected(RejectCode::AlreadyLocked).is_already_done());
        assert!(!LedgerError::rejected(RejectCode::RefundPending).is_already_done());
        assert!(!LedgerError::Transport("timeout".into()).is_already_done());
    }
}
