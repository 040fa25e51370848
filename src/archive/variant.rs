use anyhow::Result;
use async_trait::async_trait;

use super::{file::FileArchive, http::HttpArchive, mock::MockArchive, noop::NoopArchive};
use crate::traits::ArchiveClient;
use crate::types::{RoundId, RoundRecord};

/// Enum representing all possible archive implementations.
pub enum ArchiveVariant {
    Noop(NoopArchive),
    Mock(MockArchive),
    File(FileArchive),
    Http(HttpArchive),
}

#[async_trait]
impl ArchiveClient for ArchiveVariant {
    fn name(&self) -> &'static str {
        match self {
            ArchiveVariant::Noop(inner) => inner.name(),
            ArchiveVariant::Mock(inner) => inner.name(),
            ArchiveVariant::File(inner) => inner.name(),
            ArchiveVariant::Http(inner) => inner.name(),
        }
    }

    async fn put(&self, round_id: RoundId, record: &RoundRecord) -> Result<()> {
        match self {
            ArchiveVariant::Noop(inner) => inner.put(round_id, record).await,
            ArchiveVariant::Mock(inner) => inner.put(round_id, record).await,
            ArchiveVariant::File(inner) => inner.put(round_id, record).await,
            ArchiveVariant::Http(inner) => inner.put(round_id, record).await,
        }
    }

    async fn max_known_id(&self) -> Result<Option<RoundId>> {
        match self {
            ArchiveVariant::Noop(inner) => inner.max_known_id().await,
            ArchiveVariant::Mock(inner) => inner.max_known_id().await,
            ArchiveVariant::File(inner) => inner.max_known_id().await,
            ArchiveVariant::Http(inner) => inner.max_known_id().await,
        }
    }

    async fn open(&mut self) -> Result<()> {
        match self {
            ArchiveVariant::Noop(inner) => inner.open().await,
            ArchiveVariant::Mock(inner) => inner.open().await,
            ArchiveVariant::File(inner) => inner.open().await,
            ArchiveVariant::Http(inner) => inner.open().await,
        }
    }
}
