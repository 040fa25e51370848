use anyhow::Result;
use async_trait::async_trait;

use crate::types::{RoundId, RoundRecord};

/// Write-once store for finalized rounds (HTTP service, file system, etc.).
///
/// Implementations are responsible for:
/// - Treating a duplicate `put` of the same round as accepted
/// - Reporting the highest archived round id, used only as a scan hint
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Human-readable archive name for logging.
    fn name(&self) -> &'static str;

    /// Persist a round record. Duplicates and conflicts are accepted.
    async fn put(&self, round_id: RoundId, record: &RoundRecord) -> Result<()>;

    /// Highest archived round id, if the archive knows one.
    async fn max_known_id(&self) -> Result<Option<RoundId>>;

    /// Initialize the archive (e.g., create directories).
    async fn open(&mut self) -> Result<()> {
        // Default: no-op
        Ok(())
    }
}
