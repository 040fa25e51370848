use async_trait::async_trait;
use tracing::warn;

use crate::error::{DecodeError, LedgerError};
use crate::types::{ConfigSnapshot, Instruction, ParticipantSnapshot, RoundId, RoundSnapshot};

/// One slot of a batched round read: `None` when no account exists at the address,
/// `Some(Err(_))` when one exists but is not a valid round.
pub type RoundSlot = Option<Result<RoundSnapshot, DecodeError>>;

/// Narrow view of the ledger the crank needs: batched account reads and atomic
/// instruction submission.
///
/// Implementations report absent and undecodable accounts separately through
/// [`LedgerGateway::read_rounds`], and map program rejections to [`LedgerError::Rejected`]
/// with a typed code so callers never inspect error strings.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Human-readable gateway name for logging.
    fn name(&self) -> &'static str;

    /// Fetch the protocol config account.
    async fn get_config(&self) -> Result<ConfigSnapshot, LedgerError>;

    /// Fetch several round accounts in one call. The result is index-aligned with `ids`.
    async fn read_rounds(&self, ids: &[RoundId]) -> Result<Vec<RoundSlot>, LedgerError>;

    /// Fetch a single round.
    ///
    /// `Ok(None)` only when the account does not exist. An account that exists but does
    /// not decode is [`LedgerError::Decode`].
    async fn get_round(&self, id: RoundId) -> Result<Option<RoundSnapshot>, LedgerError> {
        match self.read_rounds(&[id]).await?.pop().flatten() {
            None => Ok(None),
            Some(Ok(round)) => Ok(Some(round)),
            Some(Err(source)) => Err(LedgerError::Decode {
                round_id: id,
                source,
            }),
        }
    }

    /// Batched read where undecodable accounts count as absent (logged).
    async fn get_rounds(&self, ids: &[RoundId]) -> Result<Vec<Option<RoundSnapshot>>, LedgerError> {
        let slots = self.read_rounds(ids).await?;
        Ok(ids
            .iter()
            .zip(slots)
            .map(|(id, slot)| match slot? {
                Ok(round) => Some(round),
                Err(e) => {
                    warn!(round_id = id, "Skipping undecodable round account: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Enumerate at most `limit` participant accounts of a round.
    async fn list_participants(
        &self,
        round_id: RoundId,
        limit: usize,
    ) -> Result<Vec<ParticipantSnapshot>, LedgerError>;

    /// Submit instructions as one atomic transaction. Returns the transaction signature.
    async fn submit(&self, instructions: &[Instruction]) -> Result<String, LedgerError>;
}
