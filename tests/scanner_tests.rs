use ::roundcrank::ledger::MockLedger;
use ::roundcrank::scanner::{scan_frontier, scan_start, ScanConfig, ScanTarget};
use ::roundcrank::types::{ConfigSnapshot, RoundId, RoundSnapshot, RoundStatus};
use anyhow::Result;

// ===== Test Helper Functions =====

const NOW: i64 = 1_700_000_000;

fn ledger_with(rounds: &[(RoundId, RoundStatus, i64)]) -> MockLedger {
    let ledger = MockLedger::new(ConfigSnapshot {
        min_participants: 1,
        min_total_stake: 1,
        round_duration_secs: 60,
        fee_bps: 0,
        paused: false,
        next_round_id: 1,
    });
    for (id, status, end_ts) in rounds {
        ledger.put_round(&RoundSnapshot {
            id: *id,
            status: *status,
            start_ts: end_ts - 60,
            end_ts: *end_ts,
            participant_count: 0,
            total_stake: 0,
            total_tickets: 0,
            winner: None,
            vrf_reimbursed: false,
        });
    }
    ledger
}

fn config(batch_size: usize) -> ScanConfig {
    ScanConfig {
        batch_size,
        max_missing_streak: 20,
    }
}

// ===== Gap tolerance =====

#[tokio::test]
async fn test_gap_of_exactly_streak_limit_is_crossed() -> Result<()> {
    // Ids 2..=21 missing: 20 in a row.
    let ledger = ledger_with(&[(1, RoundStatus::Claimed, NOW), (22, RoundStatus::Open, NOW + 60)]);

    let result = scan_frontier(&ledger, 1, ScanTarget::Active, &config(50), NOW).await?;
    assert_eq!(result.frontier.map(|r| r.id), Some(22));
    assert_eq!(result.highest_seen, Some(22));
    Ok(())
}

#[tokio::test]
async fn test_gap_longer_than_streak_limit_ends_scan() -> Result<()> {
    // Ids 2..=22 missing: 21 in a row.
    let ledger = ledger_with(&[(1, RoundStatus::Claimed, NOW), (23, RoundStatus::Open, NOW + 60)]);

    let result = scan_frontier(&ledger, 1, ScanTarget::Active, &config(50), NOW).await?;
    assert_eq!(result.frontier.map(|r| r.id), Some(1));
    assert_eq!(result.scanned, 22);
    Ok(())
}

#[tokio::test]
async fn test_scan_reads_in_batches() -> Result<()> {
    let ledger = ledger_with(&[(1, RoundStatus::Claimed, NOW), (22, RoundStatus::Open, NOW + 60)]);

    // Stops at id 43, the 21st missing id after 22.
    let result = scan_frontier(&ledger, 1, ScanTarget::Active, &config(10), NOW).await?;
    assert_eq!(result.frontier.map(|r| r.id), Some(22));
    assert_eq!(result.scanned, 43);
    assert_eq!(ledger.batch_reads(), 5);
    Ok(())
}

#[tokio::test]
async fn test_empty_ledger_has_no_frontier() -> Result<()> {
    let ledger = ledger_with(&[]);

    let result = scan_frontier(&ledger, 1, ScanTarget::Active, &config(50), NOW).await?;
    assert_eq!(result.frontier, None);
    assert_eq!(result.highest_seen, None);
    assert_eq!(result.scanned, 21);
    Ok(())
}

// ===== Targets =====

#[tokio::test]
async fn test_joinable_target_skips_closed_windows() -> Result<()> {
    let ledger = ledger_with(&[
        (1, RoundStatus::Open, NOW - 10),
        (2, RoundStatus::Open, NOW + 60),
        (3, RoundStatus::Locked, NOW - 5),
    ]);

    let joinable = scan_frontier(&ledger, 1, ScanTarget::Joinable, &config(50), NOW).await?;
    assert_eq!(joinable.frontier.map(|r| r.id), Some(2));
    assert_eq!(joinable.highest_seen, Some(3));

    let active = scan_frontier(&ledger, 1, ScanTarget::Active, &config(50), NOW).await?;
    assert_eq!(active.frontier.map(|r| r.id), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_undecodable_account_counts_as_missing() -> Result<()> {
    let ledger = ledger_with(&[(1, RoundStatus::Open, NOW + 60)]);
    ledger.put_raw_round(2, vec![0xde, 0xad, 0xbe, 0xef]);

    let result = scan_frontier(&ledger, 1, ScanTarget::Active, &config(50), NOW).await?;
    assert_eq!(result.frontier.map(|r| r.id), Some(1));
    assert_eq!(result.highest_seen, Some(1));
    Ok(())
}

#[test]
fn test_scan_start_uses_hint() {
    assert_eq!(scan_start(None), 1);
    assert_eq!(scan_start(Some(0)), 1);
    assert_eq!(scan_start(Some(40)), 40);
}
