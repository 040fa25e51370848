use std::time::Duration;

use ::roundcrank::archive::{ArchiveVariant, MockArchive};
use ::roundcrank::config::{CrankConfig, LedgerType};
use ::roundcrank::ledger::{LedgerVariant, MockLedger};
use ::roundcrank::notifier::{MockNotifier, NotificationPublisher, NotifierVariant};
use ::roundcrank::types::{
    ConfigSnapshot, Instruction, ParticipantSnapshot, RoundEvent, RoundId, RoundSnapshot,
    RoundStatus,
};
use ::roundcrank::{RoundCrank, TickAction};
use anyhow::Result;

// ===== Test Helper Functions =====

const NOW_MS: u64 = 1_700_000_000_000;
const NOW: i64 = 1_700_000_000;

fn protocol(next_round_id: RoundId) -> ConfigSnapshot {
    ConfigSnapshot {
        min_participants: 2,
        min_total_stake: 1_000,
        round_duration_secs: 300,
        fee_bps: 300,
        paused: false,
        next_round_id,
    }
}

fn round(id: RoundId, status: RoundStatus, end_ts: i64, participants: u32, stake: u64) -> RoundSnapshot {
    RoundSnapshot {
        id,
        status,
        start_ts: end_ts - 300,
        end_ts,
        participant_count: participants,
        total_stake: stake,
        total_tickets: stake,
        winner: None,
        vrf_reimbursed: false,
    }
}

fn participant(round_id: RoundId, seed: u8, stake: u64, refundable: u64) -> ParticipantSnapshot {
    ParticipantSnapshot {
        round_id,
        depositor: [seed; 32],
        stake,
        tickets: stake,
        deposit_count: 1,
        refundable,
    }
}

fn crank_over(ledger: &MockLedger, archive: &MockArchive, notifier: &MockNotifier) -> RoundCrank {
    let (publisher, _handle) = NotificationPublisher::spawn(NotifierVariant::Mock(notifier.clone()));
    let config = CrankConfig {
        ledger: LedgerType::Mock,
        health_interval_secs: 0,
        ..CrankConfig::default()
    };
    RoundCrank::new(
        LedgerVariant::Mock(ledger.clone()),
        ArchiveVariant::Mock(archive.clone()),
        publisher,
        config,
    )
}

fn mock_ledger(next_round_id: RoundId) -> MockLedger {
    let ledger = MockLedger::new(protocol(next_round_id));
    ledger.set_now(NOW);
    ledger
}

// ===== Scenarios =====

#[tokio::test]
async fn test_empty_expired_round_is_skipped_in_one_tick() -> Result<()> {
    let ledger = mock_ledger(2);
    let archive = MockArchive::new();
    let notifier = MockNotifier::new();
    ledger.put_round(&round(1, RoundStatus::Open, NOW - 30, 0, 0));
    let mut crank = crank_over(&ledger, &archive, &notifier);

    let report = crank.tick_at(NOW_MS).await;

    assert_eq!(report.action, TickAction::SkippedUnderfilled { round_id: 1 });
    assert_eq!(crank.current_round(), 2);
    assert!(crank.is_tracked(1));
    assert!(!ledger
        .submitted()
        .iter()
        .any(|ix| matches!(ix, Instruction::LockAndRequestRandomness { .. })));
    Ok(())
}

#[tokio::test]
async fn test_settled_round_advances_without_waiting_for_claim() -> Result<()> {
    let ledger = mock_ledger(3);
    let archive = MockArchive::new();
    let notifier = MockNotifier::new();
    ledger.put_round(&round(1, RoundStatus::VrfRequested, NOW - 30, 4, 4_000));
    ledger.put_round(&round(2, RoundStatus::Open, NOW + 300, 0, 0));
    let mut crank = crank_over(&ledger, &archive, &notifier);

    let report = crank.tick_at(NOW_MS).await;
    assert_eq!(report.action, TickAction::AwaitingRandomness { round_id: 1 });

    // Oracle callback lands.
    ledger.settle(1, [9u8; 32]);
    let report = crank.tick_at(NOW_MS + 5_000).await;

    assert_eq!(
        report.action,
        TickAction::Advanced {
            from: 1,
            to: 2,
            status: RoundStatus::Settled,
        }
    );
    assert_eq!(crank.current_round(), 2);
    let tracked = crank.background_round(1).expect("round 1 tracked");
    assert_eq!(tracked.status, RoundStatus::Settled);
    assert!(!tracked.archived);
    assert_eq!(archive.count(), 0);

    for _ in 0..50 {
        if !notifier.events().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        RoundEvent::RoundSettled { round_id: 1, winner: Some(winner), .. } if *winner == hex::encode([9u8; 32])
    ));
    Ok(())
}

#[tokio::test]
async fn test_partial_participant_progress_uses_fast_retry() -> Result<()> {
    let ledger = mock_ledger(3);
    let archive = MockArchive::new();
    let notifier = MockNotifier::new();
    ledger.put_round(&round(1, RoundStatus::Cancelled, NOW - 600, 3, 3_000));
    ledger.put_round(&round(2, RoundStatus::Open, NOW + 300, 0, 0));
    ledger.put_participant(&participant(1, 1, 1_000, 0));
    ledger.put_participant(&participant(1, 2, 1_000, 1_000));
    ledger.put_participant(&participant(1, 3, 1_000, 1_000));
    let mut crank = crank_over(&ledger, &archive, &notifier);

    crank.tick_at(NOW_MS).await;
    assert!(crank.is_tracked(1));

    let report = crank.tick_at(NOW_MS).await;
    assert_eq!(report.background.retrying, 1);

    let tracked = crank.background_round(1).expect("round 1 tracked");
    assert_eq!(tracked.last_stats.existing, 3);
    assert_eq!(tracked.last_stats.closed, 1);
    assert_eq!(tracked.last_stats.blocked, 2);
    assert_eq!(tracked.backoff.retry_count, 1);
    assert_eq!(tracked.backoff.current_delay_ms, 2_000);
    assert_eq!(tracked.backoff.next_eligible_at_ms, NOW_MS + 2_000);
    assert_eq!(ledger.participants(1).len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_restart_rediscovers_unswept_round_once() -> Result<()> {
    let ledger = mock_ledger(3);
    let archive = MockArchive::new();
    let notifier = MockNotifier::new();
    ledger.put_round(&round(1, RoundStatus::Open, NOW - 600, 1, 500));
    ledger.put_round(&round(2, RoundStatus::Open, NOW + 300, 0, 0));
    ledger.put_participant(&participant(1, 1, 500, 0));

    {
        let mut crank = crank_over(&ledger, &archive, &notifier);
        crank.recover(NOW_MS).await?;
        assert_eq!(crank.current_round(), 2);
        assert!(crank.is_tracked(1));
        // The first pass cancels it; the process stops before sweeping it.
        crank.tick_at(NOW_MS).await;
        assert_eq!(
            ledger.round(1).map(|r| r.status),
            Some(RoundStatus::Cancelled)
        );
    }
    // Cancellation made the participant refundable; the depositor has not withdrawn yet.
    assert_eq!(ledger.participants(1)[0].refundable, 500);

    let mut restarted = crank_over(&ledger, &archive, &notifier);
    assert!(restarted.background_ids().is_empty());

    let report = restarted.recover(NOW_MS + 60_000).await?;
    assert_eq!(report.recovered, vec![1]);
    assert_eq!(restarted.background_ids(), vec![1]);

    let again = restarted.recover(NOW_MS + 60_000).await?;
    assert!(again.recovered.is_empty());
    assert_eq!(restarted.background_ids(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_repeated_cleanup_does_not_repeat_work() -> Result<()> {
    let ledger = mock_ledger(3);
    let archive = MockArchive::new();
    let notifier = MockNotifier::new();
    ledger.put_round(&round(1, RoundStatus::Claimed, NOW - 600, 2, 2_000));
    ledger.put_round(&round(2, RoundStatus::Open, NOW + 300, 0, 0));
    let mut crank = crank_over(&ledger, &archive, &notifier);
    crank.tick_at(NOW_MS).await;

    let first = crank.process_background_rounds(NOW_MS).await;
    assert_eq!(first.closed, vec![1]);
    let submitted = ledger.submitted();
    assert_eq!(submitted, vec![Instruction::CloseRound { round_id: 1 }]);

    let second = crank.process_background_rounds(NOW_MS + 10_000).await;
    assert_eq!(second.processed, 0);
    assert_eq!(ledger.submitted(), submitted);
    assert_eq!(archive.put_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_full_round_lifecycle() -> Result<()> {
    let ledger = mock_ledger(1);
    let archive = MockArchive::new();
    let notifier = MockNotifier::new();
    let mut crank = crank_over(&ledger, &archive, &notifier);

    let report = crank.recover(NOW_MS).await?;
    assert_eq!(report.pointer, 1);

    assert_eq!(crank.tick_at(NOW_MS).await.action, TickAction::Created { round_id: 1 });

    // Two depositors join.
    let mut joined = ledger.round(1).expect("round 1 exists");
    joined.participant_count = 2;
    joined.total_stake = 2_000;
    ledger.put_round(&joined);
    ledger.put_participant(&participant(1, 1, 1_000, 0));
    ledger.put_participant(&participant(1, 2, 1_000, 0));

    let after_end = NOW + 310;
    ledger.set_now(after_end);
    let t = after_end as u64 * 1_000;
    assert_eq!(
        crank.tick_at(t).await.action,
        TickAction::LockRequested { round_id: 1 }
    );

    ledger.settle(1, [1u8; 32]);
    ledger.set_status(1, RoundStatus::Claimed);

    // Advances past round 1 and creates round 2 on the following tick.
    assert!(matches!(
        crank.tick_at(t + 5_000).await.action,
        TickAction::Advanced { from: 1, .. }
    ));
    let report = crank.tick_at(t + 10_000).await;
    assert_eq!(report.background.closed, vec![1]);
    assert_eq!(report.action, TickAction::Created { round_id: 2 });

    assert_eq!(ledger.round(1), None);
    assert!(ledger.participants(1).is_empty());
    let record = archive.get(1).expect("round 1 archived");
    assert_eq!(record.status, RoundStatus::Claimed);
    assert_eq!(record.winner, Some(hex::encode([1u8; 32])));
    Ok(())
}
