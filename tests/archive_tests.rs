use ::roundcrank::archive::FileArchive;
use ::roundcrank::traits::ArchiveClient;
use ::roundcrank::types::{RoundRecord, RoundSnapshot, RoundStatus};
use anyhow::Result;

// ===== Test Helper Functions =====

fn record(id: u64, status: RoundStatus) -> RoundRecord {
    let round = RoundSnapshot {
        id,
        status,
        start_ts: 1_700_000_000,
        end_ts: 1_700_000_300,
        participant_count: 3,
        total_stake: 3_000,
        total_tickets: 3_000,
        winner: Some([4u8; 32]),
        vrf_reimbursed: true,
    };
    RoundRecord::from_snapshot(&round, 1_700_000_400)
}

// ===== File archive =====

#[tokio::test]
async fn test_file_archive_put_is_write_once() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut archive = FileArchive::new(temp_dir.path().join("rounds"));
    archive.open().await?;

    archive.put(7, &record(7, RoundStatus::Claimed)).await?;
    // A duplicate with different content is accepted and leaves the first write intact.
    archive.put(7, &record(7, RoundStatus::Cancelled)).await?;

    let path = temp_dir.path().join("rounds").join("round-000000000007.json");
    let stored: RoundRecord = serde_json::from_slice(&std::fs::read(path)?)?;
    assert_eq!(stored, record(7, RoundStatus::Claimed));
    assert_eq!(stored.winner, Some(hex::encode([4u8; 32])));
    Ok(())
}

#[tokio::test]
async fn test_file_archive_max_known_id() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut archive = FileArchive::new(temp_dir.path().to_path_buf());
    archive.open().await?;
    assert_eq!(archive.max_known_id().await?, None);

    for id in [3, 12, 5] {
        archive.put(id, &record(id, RoundStatus::Claimed)).await?;
    }
    std::fs::write(temp_dir.path().join("README.txt"), "not a round")?;

    assert_eq!(archive.max_known_id().await?, Some(12));
    Ok(())
}

#[tokio::test]
async fn test_file_archive_missing_directory_has_no_hint() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let archive = FileArchive::new(temp_dir.path().join("never-created"));
    assert_eq!(archive.max_known_id().await?, None);
    Ok(())
}
