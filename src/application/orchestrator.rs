use crate::config::RunSettings;
use crate::domain::accrual::{self, Accrual};
use crate::domain::expense::{ExpenseRecord, ExpenseUpdate};
use crate::domain::ports::RecordClientRef;
use crate::domain::report::{FailureCause, RecordOutcome, RunReport, SkipReason};
use crate::error::AccrualError;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Executes accrual runs against a record store.
///
/// A run works on the snapshot returned by a single `list()` call. Updates
/// are fanned out with bounded parallelism and every one of them is awaited
/// before the run reports back.
pub struct AccrualOrchestrator {
    client: RecordClientRef,
    settings: RunSettings,
}

impl AccrualOrchestrator {
    pub fn new(client: RecordClientRef, settings: RunSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Performs one accrual run over every recurring expense.
    ///
    /// Per-record problems end up in the report. Only a failed listing aborts
    /// the run, in which case nothing is updated.
    pub async fn run_once(&self) -> RunReport {
        let report = RunReport::start();
        let span = info_span!("accrual_run", run_id = %report.run_id);
        self.execute(report).instrument(span).await
    }

    async fn execute(&self, mut report: RunReport) -> RunReport {
        info!("accrual run started");

        let records = match self.client.list().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "listing expenses failed, aborting run");
                report.abort(&e);
                return report;
            }
        };

        let deadline = Instant::now() + self.settings.run_deadline;
        let (one_time, recurring): (Vec<_>, Vec<_>) =
            records.into_iter().partition(ExpenseRecord::is_one_time);
        report.one_time_ignored = one_time.len();
        debug!(
            recurring = recurring.len(),
            one_time = one_time.len(),
            "expense snapshot loaded"
        );

        let mut outcomes: Vec<(usize, RecordOutcome)> =
            stream::iter(recurring.into_iter().enumerate())
                .map(|(position, record)| async move {
                    (position, self.process(record, deadline).await)
                })
                .buffer_unordered(self.settings.max_concurrent_updates)
                .collect()
                .await;
        // Report in listing order, not completion order.
        outcomes.sort_by_key(|(position, _)| *position);
        for (_, outcome) in outcomes {
            report.record(outcome);
        }
        report.complete();

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "accrual run finished"
        );
        report
    }

    async fn process(&self, record: ExpenseRecord, deadline: Instant) -> RecordOutcome {
        match accrual::plan(&record) {
            Ok(accrual) => self.apply(accrual, deadline).await,
            Err(e) => {
                warn!(expense_id = %record.id, error = %e, "invalid expense record");
                RecordOutcome::Failed {
                    id: record.id,
                    cause: e.into(),
                }
            }
        }
    }

    /// Writes the new amount, retrying transient failures.
    ///
    /// Every attempt sends the same absolute amount, so a retry after an
    /// ambiguous failure cannot accrue twice.
    async fn apply(&self, accrual: Accrual, deadline: Instant) -> RecordOutcome {
        let update = ExpenseUpdate::amount(accrual.new_amount);
        let mut attempt = 1;

        loop {
            if Instant::now() >= deadline {
                warn!(expense_id = %accrual.id, attempt, "run deadline exceeded");
                return RecordOutcome::Failed {
                    id: accrual.id,
                    cause: FailureCause::DeadlineExceeded,
                };
            }

            match self.client.update(&accrual.id, &update).await {
                Ok(_) => {
                    debug!(expense_id = %accrual.id, delta = %accrual.delta, "expense accrued");
                    return RecordOutcome::Accrued {
                        id: accrual.id,
                        delta: accrual.delta,
                        new_amount: accrual.new_amount,
                    };
                }
                Err(AccrualError::NotFound(_)) => {
                    info!(expense_id = %accrual.id, "expense deleted during run");
                    return RecordOutcome::Skipped {
                        id: accrual.id,
                        reason: SkipReason::Deleted,
                    };
                }
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    attempt += 1;
                    let backoff = self.settings.backoff_before(attempt);
                    warn!(
                        expense_id = %accrual.id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "expense update failed, retrying"
                    );
                    tokio::time::sleep_until((Instant::now() + backoff).min(deadline)).await;
                }
                Err(e) => {
                    warn!(expense_id = %accrual.id, attempt, error = %e, "expense update failed");
                    return RecordOutcome::Failed {
                        id: accrual.id,
                        cause: e.into(),
                    };
                }
            }
        }
    }
}
