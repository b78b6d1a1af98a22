use crate::domain::report::{RecordOutcome, RunReport};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRow {
    id: String,
    outcome: &'static str,
    delta: Option<String>,
    detail: String,
}

impl From<&RecordOutcome> for OutcomeRow {
    fn from(outcome: &RecordOutcome) -> Self {
        match outcome {
            RecordOutcome::Accrued {
                id,
                delta,
                new_amount,
            } => Self {
                id: id.to_string(),
                outcome: "accrued",
                delta: Some(delta.normalize().to_string()),
                detail: format!("amount={}", new_amount.normalize()),
            },
            RecordOutcome::Skipped { id, reason } => Self {
                id: id.to_string(),
                outcome: "skipped",
                delta: None,
                detail: reason.to_string(),
            },
            RecordOutcome::Failed { id, cause } => Self {
                id: id.to_string(),
                outcome: "failed",
                delta: None,
                detail: cause.to_string(),
            },
        }
    }
}

/// Writes run reports as CSV, one row per record outcome.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_report(&mut self, report: &RunReport) -> Result<()> {
        for outcome in &report.outcomes {
            self.writer.serialize(OutcomeRow::from(outcome))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
