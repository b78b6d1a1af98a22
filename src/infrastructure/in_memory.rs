use crate::domain::expense::{ExpenseId, ExpenseListing, ExpenseRecord, ExpenseUpdate, NewExpense};
use crate::domain::ports::{ExpenseStore, RecordClient};
use crate::error::{AccrualError, Result};
use async_trait::async_trait;
use serde_json::Map;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Failures to inject into subsequent calls.
#[derive(Debug, Default)]
struct Faults {
    fail_list: bool,
    /// Remaining number of failing update attempts per record.
    failing_updates: HashMap<ExpenseId, u32>,
    /// Records that vanish right before their update lands.
    delete_before_update: HashSet<ExpenseId>,
    update_latency: Duration,
}

#[derive(Debug, Default)]
struct CallStats {
    list_calls: AtomicUsize,
    update_calls: AtomicUsize,
    in_flight_updates: AtomicUsize,
    peak_in_flight_updates: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A thread-safe in-memory expense store.
///
/// Stands in for the remote store in offline runs (seeded from a JSON file)
/// and in tests, where the fault hooks simulate an unreliable backend.
#[derive(Default, Clone)]
pub struct InMemoryExpenseStore {
    expenses: Arc<RwLock<BTreeMap<ExpenseId, ExpenseRecord>>>,
    faults: Arc<Mutex<Faults>>,
    stats: Arc<CallStats>,
}

impl InMemoryExpenseStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ExpenseRecord>) -> Self {
        let expenses = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            expenses: Arc::new(RwLock::new(expenses)),
            ..Self::default()
        }
    }

    /// Loads records from a JSON listing (bare array or `{"data": [...]}`).
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let listing: ExpenseListing = serde_json::from_slice(bytes)
            .map_err(|e| AccrualError::Protocol(format!("invalid seed data: {e}")))?;
        Ok(Self::with_records(listing.into_records()))
    }

    pub async fn snapshot(&self, id: &ExpenseId) -> Option<ExpenseRecord> {
        self.expenses.read().await.get(id).cloned()
    }

    pub async fn records(&self) -> Vec<ExpenseRecord> {
        self.expenses.read().await.values().cloned().collect()
    }

    pub async fn fail_list(&self, fail: bool) {
        self.faults.lock().await.fail_list = fail;
    }

    /// Makes the next `times` updates of `id` fail with a transport error.
    pub async fn fail_updates(&self, id: ExpenseId, times: u32) {
        self.faults.lock().await.failing_updates.insert(id, times);
    }

    /// Removes `id` from the store the moment its update arrives.
    pub async fn delete_before_update(&self, id: ExpenseId) {
        self.faults.lock().await.delete_before_update.insert(id);
    }

    pub async fn set_update_latency(&self, latency: Duration) {
        self.faults.lock().await.update_latency = latency;
    }

    pub fn list_calls(&self) -> usize {
        self.stats.list_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.stats.update_calls.load(Ordering::SeqCst)
    }

    /// Highest number of updates observed in flight at the same time.
    pub fn peak_concurrent_updates(&self) -> usize {
        self.stats.peak_in_flight_updates.load(Ordering::SeqCst)
    }

    fn not_found(id: &ExpenseId) -> AccrualError {
        AccrualError::NotFound(id.to_string())
    }
}

#[async_trait]
impl RecordClient for InMemoryExpenseStore {
    async fn list(&self) -> Result<Vec<ExpenseRecord>> {
        self.stats.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().await.fail_list {
            return Err(AccrualError::Transport("store unavailable".to_string()));
        }
        Ok(self.records().await)
    }

    async fn get(&self, id: &ExpenseId) -> Result<ExpenseRecord> {
        self.snapshot(id).await.ok_or_else(|| Self::not_found(id))
    }

    async fn update(&self, id: &ExpenseId, fields: &ExpenseUpdate) -> Result<ExpenseRecord> {
        self.stats.update_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.stats.in_flight_updates.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.stats.in_flight_updates);
        self.stats
            .peak_in_flight_updates
            .fetch_max(in_flight, Ordering::SeqCst);

        let (latency, injected_failure, vanish) = {
            let mut faults = self.faults.lock().await;
            let injected_failure = match faults.failing_updates.get_mut(id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            let vanish = faults.delete_before_update.remove(id);
            (faults.update_latency, injected_failure, vanish)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if injected_failure {
            return Err(AccrualError::Transport(format!(
                "connection reset while updating {id}"
            )));
        }

        let mut expenses = self.expenses.write().await;
        if vanish {
            expenses.remove(id);
        }
        let record = expenses.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        fields.apply_to(record);
        Ok(record.clone())
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn create(&self, expense: NewExpense) -> Result<ExpenseRecord> {
        let mut expenses = self.expenses.write().await;
        let next = expenses
            .keys()
            .filter_map(|id| match id {
                ExpenseId::Numeric(n) => Some(*n),
                ExpenseId::Text(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut record = ExpenseRecord::new(
            ExpenseId::Numeric(next),
            expense.base,
            expense.amount,
            expense.frequency,
        );
        record.attributes = expense.attributes;
        expenses.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &ExpenseId) -> Result<()> {
        self.expenses
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }
}
