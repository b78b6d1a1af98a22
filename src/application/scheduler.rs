//! Periodic triggering of accrual runs.

use super::orchestrator::AccrualOrchestrator;
use crate::config::{Anchor, ScheduleSettings};
use crate::domain::report::RunReport;
use crate::error::{AccrualError, Result};
use chrono::{DateTime, Local, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

/// Gate ensuring at most one accrual run executes at a time.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of a run. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock unless a run already holds it.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunGuard { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Cron schedule evaluated in the configured anchor time zone.
#[derive(Debug, Clone)]
pub struct CronCadence {
    expression: String,
    schedule: Schedule,
    anchor: Anchor,
}

impl CronCadence {
    /// Parses a 5-field (`min hour dom mon dow`) or 6-field (with leading
    /// seconds) cron expression.
    pub fn parse(settings: &ScheduleSettings) -> Result<Self> {
        let trimmed = settings.cron.trim();
        let expression = if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };
        let schedule = Schedule::from_str(&expression).map_err(|e| {
            AccrualError::Config(format!("invalid cron expression '{}': {e}", settings.cron))
        })?;

        Ok(Self {
            expression,
            schedule,
            anchor: settings.anchor,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.anchor {
            Anchor::Utc => self.schedule.after(&after).next(),
            Anchor::Local => self
                .schedule
                .after(&after.with_timezone(&Local))
                .next()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// What happened to a scheduled tick.
#[derive(Debug)]
pub enum TickOutcome {
    Ran(RunReport),
    /// A run was still in progress; the tick was dropped.
    Dropped,
}

/// Fires accrual runs on a cron cadence and on demand.
///
/// Scheduled ticks and manual triggers share one [`RunLock`], so runs never
/// overlap. A tick that finds a run in progress is dropped rather than
/// queued, since queuing would accrue twice for the same day.
#[derive(Clone)]
pub struct AccrualScheduler {
    orchestrator: Arc<AccrualOrchestrator>,
    cadence: CronCadence,
    run_lock: RunLock,
}

impl AccrualScheduler {
    pub fn new(orchestrator: Arc<AccrualOrchestrator>, cadence: CronCadence) -> Self {
        Self {
            orchestrator,
            cadence,
            run_lock: RunLock::new(),
        }
    }

    pub fn cadence(&self) -> &CronCadence {
        &self.cadence
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.is_held()
    }

    /// Runs immediately, unless another run is in progress.
    pub async fn run_now(&self) -> Result<RunReport> {
        let _guard = self
            .run_lock
            .try_acquire()
            .ok_or(AccrualError::RunInProgress)?;
        info!(trigger = "manual", "starting accrual run");
        Ok(self.execute().await)
    }

    /// Handles one scheduled tick.
    pub async fn tick(&self) -> TickOutcome {
        match self.run_lock.try_acquire() {
            Some(_guard) => {
                info!(trigger = "scheduled", "starting accrual run");
                TickOutcome::Ran(self.execute().await)
            }
            None => {
                warn!("previous accrual run still in progress, dropping scheduled tick");
                TickOutcome::Dropped
            }
        }
    }

    /// Fires ticks on the cadence until `shutdown` resolves.
    ///
    /// A run in progress when shutdown arrives is finished first.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut last_fired: Option<DateTime<Utc>> = None;
        info!(cron = %self.cadence.expression(), "accrual scheduler started");

        loop {
            let now = Utc::now();
            let from = last_fired.map_or(now, |fired| fired.max(now));
            let Some(next) = self.cadence.next_after(from) else {
                warn!("cron schedule has no upcoming fire time, scheduler stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "next accrual run scheduled");

            tokio::select! {
                _ = &mut shutdown => {
                    info!("accrual scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            last_fired = Some(next);
            self.tick().await;
        }
    }

    async fn execute(&self) -> RunReport {
        let report = self.orchestrator.run_once().await;
        if let Err(e) = report.ensure_completed() {
            error!(run_id = %report.run_id, error = %e, "accrual run failed");
        }
        report
    }
}
