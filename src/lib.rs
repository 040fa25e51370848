// Library exports for testing and external use

pub mod archive;
pub mod backoff;
pub mod config;
pub mod crank;
pub mod decoder;
pub mod error;
pub mod health;
pub mod ledger;
pub mod notifier;
pub mod scanner;
pub mod stuck;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use config::{CrankConfig, LedgerType};
pub use crank::{BackgroundPassSummary, RecoveryReport, RoundCrank, TickAction, TickReport};
pub use error::{DecodeError, LedgerError, RejectCode};
pub use traits::{ArchiveClient, LedgerGateway, Notifier, RoundSlot};
pub use types::{
    ConfigSnapshot, Instruction, ParticipantSnapshot, Pubkey, RoundEvent, RoundId, RoundRecord,
    RoundSnapshot, RoundStatus,
};

// Re-export variant enums for convenience
pub use archive::{ArchiveVariant, MockArchive};
pub use ledger::{LedgerVariant, MockLedger};
pub use notifier::{MockNotifier, NotificationPublisher, NotifierVariant};
