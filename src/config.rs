//! Runtime settings for the store client, the accrual run and the scheduler.

use crate::error::{AccrualError, Result};
use std::time::Duration;

/// Default record store location (a local Strapi instance).
pub const DEFAULT_STORE_URL: &str = "http://localhost:1337/api";
/// Daily at midnight.
pub const DEFAULT_SCHEDULE: &str = "0 0 * * *";

/// Time zone the cron schedule is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Anchor {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Base URL; expenses live under `<base_url>/expenses`.
    pub base_url: String,
    /// Upper bound for any single store call.
    pub call_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STORE_URL.to_string(),
            call_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Attempts per record update, first try included.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled for each further attempt.
    pub retry_backoff: Duration,
    pub max_concurrent_updates: usize,
    /// Records not attempted by then are failed with `deadline_exceeded`.
    pub run_deadline: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            max_concurrent_updates: 8,
            run_deadline: Duration::from_secs(5 * 60),
        }
    }
}

impl RunSettings {
    /// Delay before the given (1-based) attempt.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(2)))
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// 5- or 6-field cron expression.
    pub cron: String,
    pub anchor: Anchor,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cron: DEFAULT_SCHEDULE.to_string(),
            anchor: Anchor::Local,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccrualSettings {
    pub store: StoreSettings,
    pub run: RunSettings,
    pub schedule: ScheduleSettings,
}

impl AccrualSettings {
    pub fn validate(&self) -> Result<()> {
        if self.store.base_url.trim().is_empty() {
            return Err(AccrualError::Config("store URL must not be empty".to_string()));
        }
        if self.store.call_timeout.is_zero() {
            return Err(AccrualError::Config("call timeout must be positive".to_string()));
        }
        if self.run.max_attempts == 0 {
            return Err(AccrualError::Config(
                "at least one update attempt is required".to_string(),
            ));
        }
        if self.run.max_concurrent_updates == 0 {
            return Err(AccrualError::Config(
                "concurrent update limit must be positive".to_string(),
            ));
        }
        if self.run.run_deadline.is_zero() {
            return Err(AccrualError::Config("run deadline must be positive".to_string()));
        }
        Ok(())
    }
}
