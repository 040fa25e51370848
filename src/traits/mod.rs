pub mod archive;
pub mod ledger;
pub mod notifier;

pub use archive::ArchiveClient;
pub use ledger::{LedgerGateway, RoundSlot};
pub use notifier::Notifier;
