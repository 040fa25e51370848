use anyhow::Result;
use async_trait::async_trait;

use crate::traits::ArchiveClient;
use crate::types::{RoundId, RoundRecord};

/// Noop archive that doesn't persist anything.
/// Useful when archiving is handled elsewhere; the scanner then starts from round 1.
pub struct NoopArchive;

#[async_trait]
impl ArchiveClient for NoopArchive {
    fn name(&self) -> &'static str {
        "noop-archive"
    }

    async fn put(&self, _round_id: RoundId, _record: &RoundRecord) -> Result<()> {
        Ok(())
    }

    async fn max_known_id(&self) -> Result<Option<RoundId>> {
        Ok(None)
    }
}
