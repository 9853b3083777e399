/// Token sweeper
///
/// Periodically deletes onboarding tokens that can no longer be used:
/// invitations that expired without being accepted, and email verification
/// tokens that expired or were consumed.
///
/// # Example
///
/// ```no_run
/// use tcm_worker::sweeper::{SweeperConfig, TokenSweeper};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let sweeper = TokenSweeper::new(pool, SweeperConfig::default());
///
/// let token = sweeper.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     token.cancel();
/// });
///
/// sweeper.run().await?;
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use std::str::FromStr;
use tcm_shared::models::{email_verification::EmailVerification, invitation::Invitation};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sweeper configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,

    /// Maximum rows deleted per table per sweep
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            interval_secs: 300,
            batch_size: 500,
        }
    }
}

impl SweeperConfig {
    /// Reads `SWEEP_INTERVAL_SECS` and `SWEEP_BATCH_SIZE`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SweeperConfig::default();

        let config = SweeperConfig {
            interval_secs: parse_or(&lookup, "SWEEP_INTERVAL_SECS", defaults.interval_secs)?,
            batch_size: parse_or(&lookup, "SWEEP_BATCH_SIZE", defaults.batch_size)?,
        };

        if config.interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than zero");
        }
        if config.batch_size <= 0 {
            anyhow::bail!("SWEEP_BATCH_SIZE must be greater than zero");
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, value, e)),
        None => Ok(default),
    }
}

/// Rows deleted by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub invitations: u64,
    pub verifications: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.invitations + self.verifications
    }
}

/// Deletes unusable onboarding tokens on an interval
pub struct TokenSweeper {
    db: PgPool,
    config: SweeperConfig,
    shutdown_token: CancellationToken,
}

impl TokenSweeper {
    pub fn new(db: PgPool, config: SweeperConfig) -> Self {
        TokenSweeper {
            db,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Returns a token that stops `run` when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Sweeps immediately, then every `interval_secs` until shutdown
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            "Token sweeper starting"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Token sweeper shut down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Token sweep failed");
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs one sweep over both token tables
    pub async fn sweep_once(&self) -> Result<SweepReport, sqlx::Error> {
        let report = SweepReport {
            invitations: Invitation::purge_expired(&self.db, self.config.batch_size).await?,
            verifications: EmailVerification::purge_stale(&self.db, self.config.batch_size).await?,
        };

        if report.total() > 0 {
            tracing::info!(
                invitations = report.invitations,
                verifications = report.verifications,
                "Purged stale tokens"
            );
        } else {
            tracing::debug!("No stale tokens");
        }

        Ok(report)
    }
}
