#![allow(dead_code)]

use expense_accrual::application::orchestrator::AccrualOrchestrator;
use expense_accrual::application::scheduler::{AccrualScheduler, CronCadence};
use expense_accrual::config::{Anchor, RunSettings, ScheduleSettings};
use expense_accrual::domain::expense::{ExpenseId, ExpenseRecord, Frequency};
use expense_accrual::infrastructure::in_memory::InMemoryExpenseStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub fn id(n: u64) -> ExpenseId {
    ExpenseId::Numeric(n)
}

pub fn expense(n: u64, base: Decimal, amount: Decimal, frequency: Frequency) -> ExpenseRecord {
    ExpenseRecord::new(id(n), base, amount, frequency)
}

/// The three records used throughout: weekly rent, a yearly fee and a one-off.
pub fn sample_store() -> InMemoryExpenseStore {
    InMemoryExpenseStore::with_records([
        expense(1, dec!(700), dec!(1000), Frequency::Weekly),
        expense(2, dec!(365), dec!(500), Frequency::Yearly),
        expense(3, dec!(50), dec!(200), Frequency::OneTime),
    ])
}

/// `count` daily expenses with base 10 and nothing accrued yet.
pub fn daily_store(count: u64) -> InMemoryExpenseStore {
    InMemoryExpenseStore::with_records(
        (1..=count).map(|n| expense(n, dec!(10), Decimal::ZERO, Frequency::Daily)),
    )
}

pub fn fast_settings() -> RunSettings {
    RunSettings {
        retry_backoff: Duration::from_millis(1),
        ..RunSettings::default()
    }
}

pub fn orchestrator(store: &InMemoryExpenseStore, settings: RunSettings) -> AccrualOrchestrator {
    AccrualOrchestrator::new(Arc::new(store.clone()), settings)
}

pub fn scheduler(store: &InMemoryExpenseStore, cron: &str) -> AccrualScheduler {
    let cadence = CronCadence::parse(&ScheduleSettings {
        cron: cron.to_string(),
        anchor: Anchor::Utc,
    })
    .expect("valid cron expression");
    AccrualScheduler::new(Arc::new(orchestrator(store, fast_settings())), cadence)
}

pub async fn amount_of(store: &InMemoryExpenseStore, n: u64) -> Option<Decimal> {
    store.snapshot(&id(n)).await.and_then(|record| record.amount)
}
