//! Core RoundCrank struct and initialization - no business logic.

use std::collections::BTreeMap;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::info;

use crate::archive::{ArchiveVariant, FileArchive, HttpArchive, NoopArchive};
use crate::backoff::BackoffState;
use crate::config::{CrankConfig, LedgerType};
use crate::health::HealthSnapshot;
use crate::ledger::{LedgerVariant, MockLedger, RpcLedger};
use crate::notifier::{NoopNotifier, NotificationPublisher, NotifierVariant, WebhookNotifier};
use crate::stuck::StuckDetector;
use crate::traits::{ArchiveClient, LedgerGateway};
use crate::types::{ConfigSnapshot, RoundId, RoundSnapshot, RoundStatus};

/// Participant counts from the last cleanup pass over a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub existing: u32,
    pub closable: u32,
    pub closed: u32,
    /// Still funded, waiting on a depositor refund.
    pub blocked: u32,
}

/// A round awaiting archive, participant cleanup and account close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundRound {
    pub round_id: RoundId,
    /// Last observed status.
    pub status: RoundStatus,
    /// When `status` was first observed (ms).
    pub since_ms: u64,
    pub archived: bool,
    pub backoff: BackoffState,
    pub last_stats: CleanupStats,
}

/// Single-process scheduler. All state is volatile and re-derived from the ledger on start.
pub struct RoundCrank {
    /// Ledger gateway.
    pub ledger: LedgerVariant,

    /// Archive for finalized rounds.
    pub archive: ArchiveVariant,

    /// Fire-and-forget notification pipeline.
    pub notifications: NotificationPublisher,

    /// Tunables.
    pub config: CrankConfig,

    /// Round currently under active progression.
    pub(crate) pointer: RoundId,

    /// Rounds being swept in the background, keyed by id.
    pub(crate) background: BTreeMap<RoundId, BackgroundRound>,

    /// Highest round id this process submitted a `StartRound` for.
    pub(crate) last_created: Option<RoundId>,

    /// Last round this process locked (lock + randomness request).
    pub(crate) last_locked: Option<RoundId>,

    /// Last round this process requested randomness for after an external lock.
    pub(crate) last_randomness_requested: Option<RoundId>,

    /// Cached protocol config.
    pub(crate) protocol: Option<ConfigSnapshot>,

    pub(crate) stuck: StuckDetector,

    pub(crate) last_health_ms: Option<u64>,
}

impl RoundCrank {
    /// Create a new RoundCrank. The pointer starts at 1 until `recover` runs.
    pub fn new(
        ledger: LedgerVariant,
        archive: ArchiveVariant,
        notifications: NotificationPublisher,
        config: CrankConfig,
    ) -> Self {
        let stuck = StuckDetector::new(
            config.stuck_thresholds(),
            config.stuck_warn_repeat_secs.saturating_mul(1_000),
        );

        Self {
            ledger,
            archive,
            notifications,
            config,
            pointer: 1,
            background: BTreeMap::new(),
            last_created: None,
            last_locked: None,
            last_randomness_requested: None,
            protocol: None,
            stuck,
            last_health_ms: None,
        }
    }

    /// Build every backend from configuration.
    ///
    /// Returns the crank and the handle of the notification task, which ends once the
    /// crank is dropped.
    pub async fn initialize(config: CrankConfig) -> Result<(Self, JoinHandle<()>)> {
        let ledger = match config.ledger {
            LedgerType::Rpc => {
                let token = config.load_operator_token()?;
                LedgerVariant::Rpc(RpcLedger::new(
                    config.ledger_url.clone(),
                    token,
                    config.rpc_timeout(),
                )?)
            }
            LedgerType::Mock => LedgerVariant::Mock(MockLedger::new(ConfigSnapshot {
                min_participants: 2,
                min_total_stake: 1,
                round_duration_secs: 60,
                fee_bps: 0,
                paused: false,
                next_round_id: 1,
            })),
        };
        info!("Ledger gateway: {} ({})", ledger.name(), config.ledger_url);

        let mut archive = match (&config.archive_url, &config.archive_dir) {
            (Some(url), _) => {
                let mut http = HttpArchive::new(url.clone(), config.rpc_timeout())?;
                if let Some(token) = &config.archive_token {
                    http = http.with_auth(token.clone());
                }
                ArchiveVariant::Http(http)
            }
            (None, Some(dir)) => ArchiveVariant::File(FileArchive::new(dir.clone())),
            (None, None) => ArchiveVariant::Noop(NoopArchive),
        };
        archive.open().await?;
        info!("Archive: {}", archive.name());

        let notifier = match &config.notify_webhook_url {
            Some(url) => {
                let mut webhook = WebhookNotifier::new(url.clone(), config.rpc_timeout())?;
                if let Some(token) = &config.notify_webhook_token {
                    webhook = webhook.with_auth(token.clone());
                }
                NotifierVariant::Webhook(webhook)
            }
            None => NotifierVariant::Noop(NoopNotifier),
        };
        let (notifications, handle) = NotificationPublisher::spawn(notifier);

        Ok((Self::new(ledger, archive, notifications, config), handle))
    }

    pub fn current_round(&self) -> RoundId {
        self.pointer
    }

    pub fn background_ids(&self) -> Vec<RoundId> {
        self.background.keys().copied().collect()
    }

    pub fn background_round(&self, round_id: RoundId) -> Option<&BackgroundRound> {
        self.background.get(&round_id)
    }

    pub fn is_tracked(&self, round_id: RoundId) -> bool {
        self.background.contains_key(&round_id)
    }

    pub fn health(&self, now_ms: u64) -> HealthSnapshot {
        HealthSnapshot::collect(self.pointer, self.background.values(), now_ms)
    }

    /// Add a round to the background set, or refresh its status if already tracked.
    ///
    /// Returns true only when the round was newly added.
    pub(crate) fn track_background(&mut self, round: &RoundSnapshot, now_ms: u64) -> bool {
        if let Some(existing) = self.background.get_mut(&round.id) {
            if existing.status != round.status {
                existing.status = round.status;
                existing.since_ms = now_ms;
            }
            return false;
        }

        info!(
            round_id = round.id,
            status = %round.status,
            "Tracking round for background cleanup"
        );
        self.background.insert(
            round.id,
            BackgroundRound {
                round_id: round.id,
                status: round.status,
                since_ms: now_ms,
                archived: false,
                backoff: BackoffState::default(),
                last_stats: CleanupStats::default(),
            },
        );
        true
    }

    /// Drop every piece of local state held for a round.
    pub(crate) fn untrack(&mut self, round_id: RoundId) {
        self.background.remove(&round_id);
        self.stuck.forget(round_id);
    }
}
