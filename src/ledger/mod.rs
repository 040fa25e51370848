pub mod mock;
pub mod rpc;
pub mod variant;

pub use mock::{InjectedFailure, MockLedger};
pub use rpc::RpcLedger;
pub use variant::LedgerVariant;
