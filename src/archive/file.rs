use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::traits::ArchiveClient;
use crate::types::{RoundId, RoundRecord};

const FILE_PREFIX: &str = "round-";
const FILE_SUFFIX: &str = ".json";

/// File system-based archive.
/// Writes one pretty-printed JSON file per round; an existing file is never overwritten.
pub struct FileArchive {
    directory: PathBuf,
}

impl FileArchive {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn path_for(&self, round_id: RoundId) -> PathBuf {
        self.directory
            .join(format!("{}{:012}{}", FILE_PREFIX, round_id, FILE_SUFFIX))
    }

    fn parse_round_id(file_name: &str) -> Option<RoundId> {
        file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }
}

#[async_trait]
impl ArchiveClient for FileArchive {
    fn name(&self) -> &'static str {
        "file-archive"
    }

    async fn put(&self, round_id: RoundId, record: &RoundRecord) -> Result<()> {
        let path = self.path_for(round_id);
        let json = serde_json::to_vec_pretty(record)?;

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!("File archive: round {} already archived at {:?}", round_id, path);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("failed to create {:?}", path)),
        };

        file.write_all(&json).await?;
        file.sync_all().await?;
        tracing::info!("File archive: wrote round {} to {:?}", round_id, path);
        Ok(())
    }

    async fn max_known_id(&self) -> Result<Option<RoundId>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut max = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(Self::parse_round_id) {
                max = max.max(Some(id));
            }
        }
        Ok(max)
    }

    async fn open(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("failed to create archive directory {:?}", self.directory))?;
        tracing::info!("File archive: initialized at {:?}", self.directory);
        Ok(())
    }
}
