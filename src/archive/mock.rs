use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::traits::ArchiveClient;
use crate::types::{RoundId, RoundRecord};

/// Mock archive for testing.
/// Stores records in memory and counts every `put`, duplicates included.
#[derive(Clone, Default)]
pub struct MockArchive {
    pub records: Arc<Mutex<BTreeMap<RoundId, RoundRecord>>>,
    puts: Arc<Mutex<u64>>,
    failing: Arc<Mutex<bool>>,
    max_id_hint: Arc<Mutex<Option<Option<RoundId>>>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls received, including duplicates and failures.
    pub fn put_count(&self) -> u64 {
        *self.puts.lock().unwrap()
    }

    /// Get archive count.
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, round_id: RoundId) -> Option<RoundRecord> {
        self.records.lock().unwrap().get(&round_id).cloned()
    }

    /// Make every call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Override the `max_known_id` answer independently of stored records.
    pub fn set_max_id_hint(&self, hint: Option<RoundId>) {
        *self.max_id_hint.lock().unwrap() = Some(hint);
    }
}

#[async_trait]
impl ArchiveClient for MockArchive {
    fn name(&self) -> &'static str {
        "mock-archive"
    }

    async fn put(&self, round_id: RoundId, record: &RoundRecord) -> Result<()> {
        *self.puts.lock().unwrap() += 1;
        if *self.failing.lock().unwrap() {
            anyhow::bail!("mock archive unavailable");
        }
        self.records
            .lock()
            .unwrap()
            .entry(round_id)
            .or_insert_with(|| record.clone());
        tracing::debug!("MockArchive: archived round {}", round_id);
        Ok(())
    }

    async fn max_known_id(&self) -> Result<Option<RoundId>> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("mock archive unavailable");
        }
        if let Some(hint) = *self.max_id_hint.lock().unwrap() {
            return Ok(hint);
        }
        Ok(self.records.lock().unwrap().keys().next_back().copied())
    }
}
