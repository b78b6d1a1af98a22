use expense_accrual::config::RunSettings;
use expense_accrual::domain::expense::{ExpenseRecord, Frequency, RecordFrequency};
use expense_accrual::domain::report::{FailureCause, RecordOutcome, RunStatus, SkipReason};
use expense_accrual::infrastructure::in_memory::InMemoryExpenseStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

mod common;
use common::{amount_of, daily_store, expense, fast_settings, id, orchestrator, sample_store};

#[tokio::test]
async fn test_end_to_end_sample() {
    let store = sample_store();

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(amount_of(&store, 1).await, Some(dec!(1100)));
    assert_eq!(amount_of(&store, 2).await, Some(dec!(501)));
    assert_eq!(amount_of(&store, 3).await, Some(dec!(200)));
    assert!(report.outcome_for(&id(3)).is_none());
    assert!(report.finished_at.unwrap() >= report.started_at);
}

#[tokio::test]
async fn test_one_update_per_recurring_record() {
    let store = daily_store(25);

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(store.list_calls(), 1);
    assert_eq!(store.update_calls(), 25);
    assert_eq!(report.attempted, 25);
    assert_eq!(report.succeeded, 25);
    for n in 1..=25 {
        assert_eq!(amount_of(&store, n).await, Some(dec!(10)));
    }
}

#[tokio::test]
async fn test_outcomes_follow_listing_order() {
    let store = daily_store(12);
    store.set_update_latency(Duration::from_millis(5)).await;

    let report = orchestrator(&store, fast_settings()).run_once().await;

    let ids: Vec<_> = report.outcomes.iter().map(|o| o.id().clone()).collect();
    let expected: Vec<_> = (1..=12).map(id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_two_runs_accrue_twice() {
    let store = sample_store();
    let orchestrator = orchestrator(&store, fast_settings());

    orchestrator.run_once().await;
    orchestrator.run_once().await;

    assert_eq!(amount_of(&store, 1).await, Some(dec!(1200)));
    assert_eq!(amount_of(&store, 2).await, Some(dec!(502)));
    assert_eq!(amount_of(&store, 3).await, Some(dec!(200)));
}

#[tokio::test]
async fn test_list_failure_aborts_run() {
    let store = sample_store();
    store.fail_list(true).await;

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert!(matches!(report.status, RunStatus::Aborted(_)));
    assert_eq!(report.attempted, 0);
    assert!(report.outcomes.is_empty());
    assert_eq!(store.update_calls(), 0);
    assert_eq!(amount_of(&store, 1).await, Some(dec!(1000)));
}

#[tokio::test]
async fn test_invalid_records_fail_without_stopping_run() {
    let mut unknown = expense(2, dec!(10), dec!(0), Frequency::Daily);
    unknown.frequency = Some(RecordFrequency::Unrecognized("Fortnightly".to_string()));
    let mut no_base = expense(4, dec!(10), dec!(0), Frequency::Daily);
    no_base.base = None;
    let store = InMemoryExpenseStore::with_records([
        expense(1, dec!(7), dec!(0), Frequency::Weekly),
        unknown,
        expense(3, dec!(-5), dec!(0), Frequency::Daily),
        no_base,
        expense(5, dec!(30), dec!(3), Frequency::Monthly),
    ]);

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 3);
    assert_eq!(store.update_calls(), 2);
    for n in [2, 3, 4] {
        assert!(matches!(
            report.outcome_for(&id(n)),
            Some(RecordOutcome::Failed {
                cause: FailureCause::InvalidRecord(_),
                ..
            })
        ));
    }
    assert_eq!(amount_of(&store, 1).await, Some(dec!(1)));
    assert_eq!(amount_of(&store, 5).await, Some(dec!(4)));
}

#[tokio::test]
async fn test_deleted_record_is_skipped() {
    let store = sample_store();
    store.delete_before_update(id(1)).await;

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(
        report.outcome_for(&id(1)),
        Some(&RecordOutcome::Skipped {
            id: id(1),
            reason: SkipReason::Deleted,
        })
    );
    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(amount_of(&store, 2).await, Some(dec!(501)));
}

#[tokio::test]
async fn test_exhausted_retries_do_not_affect_other_records() {
    let store = daily_store(5);
    store.fail_updates(id(3), u32::MAX).await;

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    // three attempts for the failing record, one for each of the others
    assert_eq!(store.update_calls(), 7);
    assert_eq!(amount_of(&store, 3).await, Some(Decimal::ZERO));
    for n in [1, 2, 4, 5] {
        assert_eq!(amount_of(&store, n).await, Some(dec!(10)));
    }
}

#[tokio::test]
async fn test_retry_sends_same_target_amount() {
    let store = InMemoryExpenseStore::with_records([expense(1, dec!(70), dec!(5), Frequency::Weekly)]);
    store.fail_updates(id(1), 2).await;

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(amount_of(&store, 1).await, Some(dec!(15)));
}

#[tokio::test]
async fn test_update_parallelism_is_bounded() {
    let store = daily_store(20);
    store.set_update_latency(Duration::from_millis(20)).await;
    let settings = RunSettings {
        max_concurrent_updates: 4,
        ..fast_settings()
    };

    let report = orchestrator(&store, settings).run_once().await;

    assert_eq!(report.succeeded, 20);
    assert!(store.peak_concurrent_updates() <= 4);
    assert!(store.peak_concurrent_updates() > 1);
}

#[tokio::test]
async fn test_deadline_fails_remaining_records() {
    let store = daily_store(6);
    store.set_update_latency(Duration::from_millis(100)).await;
    let settings = RunSettings {
        max_concurrent_updates: 1,
        run_deadline: Duration::from_millis(150),
        ..fast_settings()
    };

    let report = orchestrator(&store, settings).run_once().await;

    assert_eq!(report.attempted, 6);
    assert!(report.succeeded >= 1);
    assert!(report.failed >= 1);
    assert_eq!(report.succeeded + report.failed, 6);
    assert!(matches!(
        report.outcome_for(&id(6)),
        Some(RecordOutcome::Failed {
            cause: FailureCause::DeadlineExceeded,
            ..
        })
    ));
    assert_eq!(amount_of(&store, 6).await, Some(Decimal::ZERO));
}

#[tokio::test]
async fn test_missing_amount_accrues_from_zero() {
    let mut record: ExpenseRecord = expense(1, dec!(14), dec!(0), Frequency::Weekly);
    record.amount = None;
    let store = InMemoryExpenseStore::with_records([record]);

    orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(amount_of(&store, 1).await, Some(dec!(2)));
}

#[tokio::test]
async fn test_overflowing_amount_fails_only_that_record() {
    let large = Decimal::from_scientific("5e28").unwrap();
    let store = InMemoryExpenseStore::with_records([
        expense(1, large, large, Frequency::Daily),
        expense(2, dec!(7), dec!(0), Frequency::Weekly),
    ]);

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert!(matches!(
        report.outcome_for(&id(1)),
        Some(RecordOutcome::Failed {
            cause: FailureCause::InvalidRecord(_),
            ..
        })
    ));
    assert_eq!(amount_of(&store, 1).await, Some(large));
    assert_eq!(amount_of(&store, 2).await, Some(dec!(1)));
}

#[tokio::test]
async fn test_large_base_accrues() {
    let large = Decimal::from_scientific("5e28").unwrap();
    let store = InMemoryExpenseStore::with_records([expense(1, large, dec!(0), Frequency::Daily)]);

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(amount_of(&store, 1).await, Some(large));
}

#[tokio::test]
async fn test_malformed_records_do_not_abort_listing() {
    let seed = br#"[
        {"id": 1, "base": "abc", "amount": 0, "frequency": "Daily"},
        {"id": 2, "base": 1e30, "amount": 0, "frequency": "Daily"},
        {"id": 3, "base": 10, "amount": 0, "frequency": 1},
        {"id": 4, "base": 10, "amount": 0, "frequency": "Daily"}
    ]"#;
    let store = InMemoryExpenseStore::from_json(seed).unwrap();

    let report = orchestrator(&store, fast_settings()).run_once().await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.attempted, 4);
    assert_eq!(report.failed, 3);
    assert_eq!(report.succeeded, 1);
    for n in 1..=3 {
        assert!(matches!(
            report.outcome_for(&id(n)),
            Some(RecordOutcome::Failed {
                cause: FailureCause::InvalidRecord(_),
                ..
            })
        ));
    }
    assert_eq!(store.update_calls(), 1);
    assert_eq!(amount_of(&store, 4).await, Some(dec!(10)));
}

#[tokio::test]
async fn test_backoff_on_one_record_leaves_others_unblocked() {
    let store = daily_store(4);
    store.fail_updates(id(1), 2).await;
    let settings = RunSettings {
        max_attempts: 3,
        retry_backoff: Duration::from_millis(150),
        max_concurrent_updates: 2,
        run_deadline: Duration::from_millis(350),
    };

    let report = orchestrator(&store, settings).run_once().await;

    for n in 2..=4 {
        assert!(matches!(
            report.outcome_for(&id(n)),
            Some(RecordOutcome::Accrued { .. })
        ));
        assert_eq!(amount_of(&store, n).await, Some(dec!(10)));
    }
    let ids: Vec<_> = report.outcomes.iter().map(|o| o.id().clone()).collect();
    assert_eq!(ids, (1..=4).map(id).collect::<Vec<_>>());
}
