use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::scanner::ScanConfig;
use crate::stuck::StuckThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum LedgerType {
    /// JSON-RPC ledger relay.
    Rpc,
    /// In-memory ledger (dry runs and tests).
    Mock,
}

/// Crank configuration, all supplied at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "roundcrank", about = "Keeps ledger rounds progressing and sweeps finished ones")]
pub struct CrankConfig {
    /// Ledger backend.
    #[arg(long, env = "CRANK_LEDGER", value_enum, default_value = "rpc")]
    pub ledger: LedgerType,

    /// Ledger relay JSON-RPC endpoint.
    #[arg(long, env = "CRANK_LEDGER_URL", default_value = "http://127.0.0.1:8899")]
    pub ledger_url: String,

    /// File holding the operator credential used to authorize submissions.
    #[arg(long, env = "CRANK_OPERATOR_TOKEN_FILE")]
    pub operator_token_file: Option<PathBuf>,

    /// Per-request timeout for ledger, archive and webhook calls.
    #[arg(long, env = "CRANK_RPC_TIMEOUT_MS", default_value_t = 15_000)]
    pub rpc_timeout_ms: u64,

    /// Delay between the end of one tick and the start of the next.
    #[arg(long, env = "CRANK_POLL_INTERVAL_MS", default_value_t = 5_000)]
    pub poll_interval_ms: u64,

    /// Seconds past a round's end before the crank treats its timer as expired.
    #[arg(long, env = "CRANK_LOCK_BUFFER_SECS", default_value_t = 2)]
    pub lock_buffer_secs: i64,

    #[arg(long, env = "CRANK_BACKOFF_MIN_MS", default_value_t = 5_000)]
    pub backoff_min_ms: u64,

    #[arg(long, env = "CRANK_BACKOFF_MAX_MS", default_value_t = 300_000)]
    pub backoff_max_ms: u64,

    /// Retry delay after a cleanup pass that closed at least one participant.
    #[arg(long, env = "CRANK_BACKOFF_FAST_MS", default_value_t = 2_000)]
    pub backoff_fast_ms: u64,

    /// Max participant accounts enumerated per cleanup pass.
    #[arg(long, env = "CRANK_PARTICIPANT_SCAN_LIMIT", default_value_t = 100)]
    pub participant_scan_limit: usize,

    /// Max participant accounts closed per cleanup pass.
    #[arg(long, env = "CRANK_PARTICIPANT_CLOSE_BATCH", default_value_t = 10)]
    pub participant_close_batch: usize,

    /// Stuck thresholds per status, in seconds. 0 disables.
    #[arg(long, env = "CRANK_STUCK_OPEN_SECS", default_value_t = 0)]
    pub stuck_open_secs: u64,

    #[arg(long, env = "CRANK_STUCK_LOCKED_SECS", default_value_t = 120)]
    pub stuck_locked_secs: u64,

    #[arg(long, env = "CRANK_STUCK_VRF_SECS", default_value_t = 300)]
    pub stuck_vrf_requested_secs: u64,

    #[arg(long, env = "CRANK_STUCK_SETTLED_SECS", default_value_t = 0)]
    pub stuck_settled_secs: u64,

    /// Minimum seconds between repeated warnings for the same stuck round and status.
    #[arg(long, env = "CRANK_STUCK_REPEAT_SECS", default_value_t = 60)]
    pub stuck_warn_repeat_secs: u64,

    /// Seconds between health snapshots. 0 disables.
    #[arg(long, env = "CRANK_HEALTH_INTERVAL_SECS", default_value_t = 60)]
    pub health_interval_secs: u64,

    /// Round ids fetched per batched read while scanning.
    #[arg(long, env = "CRANK_SCAN_BATCH", default_value_t = 50)]
    pub scan_batch_size: usize,

    /// Consecutive missing round accounts tolerated while scanning.
    #[arg(long, env = "CRANK_SCAN_MISSING_STREAK", default_value_t = 20)]
    pub scan_missing_streak: usize,

    /// Round ids below the frontier checked at startup for an un-swept backlog.
    #[arg(long, env = "CRANK_RECOVERY_WINDOW", default_value_t = 256)]
    pub recovery_window: u64,

    /// Archive service base URL.
    #[arg(long, env = "CRANK_ARCHIVE_URL")]
    pub archive_url: Option<String>,

    /// Bearer token sent to the archive service.
    #[arg(long, env = "CRANK_ARCHIVE_TOKEN", hide_env_values = true)]
    pub archive_token: Option<String>,

    /// Archive directory (used when no archive URL is set).
    #[arg(long, env = "CRANK_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Webhook receiving round notifications.
    #[arg(long, env = "CRANK_NOTIFY_WEBHOOK_URL")]
    pub notify_webhook_url: Option<String>,

    /// Bearer token sent to the notification webhook.
    #[arg(long, env = "CRANK_NOTIFY_WEBHOOK_TOKEN", hide_env_values = true)]
    pub notify_webhook_token: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "CRANK_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Default for CrankConfig {
    fn default() -> Self {
        CrankConfig {
            ledger: LedgerType::Rpc,
            ledger_url: "http://127.0.0.1:8899".to_string(),
            operator_token_file: None,
            rpc_timeout_ms: 15_000,
            poll_interval_ms: 5_000,
            lock_buffer_secs: 2,
            backoff_min_ms: 5_000,
            backoff_max_ms: 300_000,
            backoff_fast_ms: 2_000,
            participant_scan_limit: 100,
            participant_close_batch: 10,
            stuck_open_secs: 0,
            stuck_locked_secs: 120,
            stuck_vrf_requested_secs: 300,
            stuck_settled_secs: 0,
            stuck_warn_repeat_secs: 60,
            health_interval_secs: 60,
            scan_batch_size: 50,
            scan_missing_streak: 20,
            recovery_window: 256,
            archive_url: None,
            archive_token: None,
            archive_dir: None,
            notify_webhook_url: None,
            notify_webhook_token: None,
            log_json: false,
        }
    }
}

impl CrankConfig {
    /// Reject configurations the crank cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be > 0");
        }
        if self.backoff_min_ms == 0 {
            bail!("backoff_min_ms must be > 0");
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            bail!(
                "backoff_min_ms ({}) must not exceed backoff_max_ms ({})",
                self.backoff_min_ms,
                self.backoff_max_ms
            );
        }
        if self.participant_scan_limit == 0 || self.participant_close_batch == 0 {
            bail!("participant_scan_limit and participant_close_batch must be > 0");
        }
        if self.scan_batch_size == 0 {
            bail!("scan_batch_size must be > 0");
        }
        if self.lock_buffer_secs < 0 {
            bail!("lock_buffer_secs must be >= 0");
        }
        if self.ledger == LedgerType::Rpc && self.operator_token_file.is_none() {
            bail!("operator_token_file is required for the rpc ledger");
        }
        Ok(())
    }

    /// Read the operator credential. Missing or empty credentials are fatal.
    pub fn load_operator_token(&self) -> Result<String> {
        let path = self
            .operator_token_file
            .as_ref()
            .context("operator_token_file is not set")?;
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read operator credential {:?}", path))?;
        let token = token.trim().to_string();
        if token.is_empty() {
            bail!("operator credential {:?} is empty", path);
        }
        Ok(token)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            min_ms: self.backoff_min_ms,
            max_ms: self.backoff_max_ms,
            fast_ms: self.backoff_fast_ms,
        }
    }

    pub fn stuck_thresholds(&self) -> StuckThresholds {
        StuckThresholds {
            open_ms: self.stuck_open_secs.saturating_mul(1_000),
            locked_ms: self.stuck_locked_secs.saturating_mul(1_000),
            vrf_requested_ms: self.stuck_vrf_requested_secs.saturating_mul(1_000),
            settled_ms: self.stuck_settled_secs.saturating_mul(1_000),
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            batch_size: self.scan_batch_size,
            max_missing_streak: self.scan_missing_streak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let parsed = CrankConfig::parse_from(["roundcrank"]);
        let defaults = CrankConfig::default();
        assert_eq!(
            serde_json::to_value(&parsed).unwrap(),
            serde_json::to_value(&defaults).unwrap()
        );
    }

    #[test]
    fn test_rpc_requires_operator_credential() {
        let config = CrankConfig::default();
        assert!(config.validate().is_err());

        let config = CrankConfig {
            ledger: LedgerType::Mock,
            ..CrankConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_backoff_bounds() {
        let config = CrankConfig {
            ledger: LedgerType::Mock,
            backoff_min_ms: 10_000,
            backoff_max_ms: 1_000,
            ..CrankConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_stuck_thresholds_saturate() {
        let config = CrankConfig {
            ledger: LedgerType::Mock,
            stuck_locked_secs: u64::MAX,
            stuck_open_secs: 7,
            ..CrankConfig::default()
        };
        let thresholds = config.stuck_thresholds();
        assert_eq!(thresholds.locked_ms, u64::MAX);
        assert_eq!(thresholds.open_ms, 7_000);
    }

    #[test]
    fn test_operator_token_is_trimmed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("token");
        std::fs::write(&path, "secret-token\n")?;
        let config = CrankConfig {
            operator_token_file: Some(path),
            ..CrankConfig::default()
        };
        config.validate()?;
        assert_eq!(config.load_operator_token()?, "secret-token");
        Ok(())
    }
}
