//! Accrual policy: how much a recurring expense grows per daily tick.
//!
//! The divisors are calendar approximations (a month is 30 days, a quarter
//! 91, a year 365). They assume exactly one tick per day; a missed tick is
//! not caught up, so amounts drift from exact period arithmetic over time.

use super::expense::{ExpenseId, ExpenseRecord, Frequency};
use crate::error::{AccrualError, Result};
use rust_decimal::Decimal;

impl Frequency {
    /// Number of daily ticks the base amount is spread over.
    ///
    /// `None` for one-time expenses, which never accrue.
    pub fn ticks_per_period(&self) -> Option<u32> {
        match self {
            Self::OneTime => None,
            Self::Daily => Some(1),
            Self::Weekly => Some(7),
            Self::Monthly => Some(30),
            Self::Quarterly => Some(91),
            Self::Yearly => Some(365),
        }
    }
}

/// Per-tick increment for an expense of the given frequency and base amount.
pub fn increment(frequency: Frequency, base: Decimal) -> Result<Decimal> {
    if base < Decimal::ZERO {
        return Err(AccrualError::InvalidRecord(format!(
            "base amount must not be negative, got {base}"
        )));
    }
    let ticks = frequency.ticks_per_period().ok_or_else(|| {
        AccrualError::InvalidRecord("one-time expenses do not accrue".to_string())
    })?;
    Ok(base / Decimal::from(ticks))
}

/// The amount change a single record should receive in this run.
#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    pub id: ExpenseId,
    pub delta: Decimal,
    pub new_amount: Decimal,
}

/// Validates a listed record and computes its accrual.
pub fn plan(record: &ExpenseRecord) -> Result<Accrual> {
    record.ensure_well_formed()?;
    let frequency = record.frequency()?;
    let base = record.base.ok_or_else(|| {
        AccrualError::InvalidRecord(format!("expense {} has no base amount", record.id))
    })?;
    let amount = record.current_amount();
    if amount < Decimal::ZERO {
        return Err(AccrualError::InvalidRecord(format!(
            "expense {} has negative amount {amount}",
            record.id
        )));
    }

    let delta = increment(frequency, base)?;
    let new_amount = amount.checked_add(delta).ok_or_else(|| {
        AccrualError::InvalidRecord(format!(
            "expense {} amount {amount} overflows when adding {delta}",
            record.id
        ))
    })?;
    Ok(Accrual {
        id: record.id.clone(),
        delta,
        new_amount,
    })
}
