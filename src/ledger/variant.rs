use async_trait::async_trait;

use super::mock::MockLedger;
use super::rpc::RpcLedger;
use crate::error::LedgerError;
use crate::traits::{LedgerGateway, RoundSlot};
use crate::types::{ConfigSnapshot, Instruction, ParticipantSnapshot, RoundId, RoundSnapshot};

/// Enum representing all possible ledger gateway implementations.
pub enum LedgerVariant {
    Rpc(RpcLedger),
    Mock(MockLedger),
}

#[async_trait]
impl LedgerGateway for LedgerVariant {
    fn name(&self) -> &'static str {
        match self {
            LedgerVariant::Rpc(inner) => inner.name(),
            LedgerVariant::Mock(inner) => inner.name(),
        }
    }

    async fn get_config(&self) -> Result<ConfigSnapshot, LedgerError> {
        match self {
            LedgerVariant::Rpc(inner) => inner.get_config().await,
            LedgerVariant::Mock(inner) => inner.get_config().await,
        }
    }

    async fn get_round(&self, id: RoundId) -> Result<Option<RoundSnapshot>, LedgerError> {
        match self {
            LedgerVariant::Rpc(inner) => inner.get_round(id).await,
            LedgerVariant::Mock(inner) => inner.get_round(id).await,
        }
    }

    async fn read_rounds(&self, ids: &[RoundId]) -> Result<Vec<RoundSlot>, LedgerError> {
        match self {
            LedgerVariant::Rpc(inner) => inner.read_rounds(ids).await,
            LedgerVariant::Mock(inner) => inner.read_rounds(ids).await,
        }
    }

    async fn get_rounds(
        &self,
        ids: &[RoundId],
    ) -> Result<Vec<Option<RoundSnapshot>>, LedgerError> {
        match self {
            LedgerVariant::Rpc(inner) => inner.get_rounds(ids).await,
            LedgerVariant::Mock(inner) => inner.get_rounds(ids).await,
        }
    }

    async fn list_participants(
        &self,
        round_id: RoundId,
        limit: usize,
    ) -> Result<Vec<ParticipantSnapshot>, LedgerError> {
        match self {
            LedgerVariant::Rpc(inner) => inner.list_participants(round_id, limit).await,
            LedgerVariant::Mock(inner) => inner.list_participants(round_id, limit).await,
        }
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<String, LedgerError> {
        match self {
            LedgerVariant::Rpc(inner) => inner.submit(instructions).await,
            LedgerVariant::Mock(inner) => inner.submit(instructions).await,
        }
    }
}
