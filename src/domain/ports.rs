use super::expense::{ExpenseId, ExpenseRecord, ExpenseUpdate, NewExpense};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Read/update access to the expense records the accrual run works on.
///
/// Implementations issue each call exactly once and bound it with a timeout.
/// Retrying is up to the caller.
#[async_trait]
pub trait RecordClient: Send + Sync {
    async fn list(&self) -> Result<Vec<ExpenseRecord>>;
    async fn get(&self, id: &ExpenseId) -> Result<ExpenseRecord>;
    async fn update(&self, id: &ExpenseId, fields: &ExpenseUpdate) -> Result<ExpenseRecord>;
}

/// Full CRUD access, needed by the HTTP passthrough only.
#[async_trait]
pub trait ExpenseStore: RecordClient {
    async fn create(&self, expense: NewExpense) -> Result<ExpenseRecord>;
    async fn delete(&self, id: &ExpenseId) -> Result<()>;
}

pub type RecordClientRef = Arc<dyn RecordClient>;
pub type ExpenseStoreRef = Arc<dyn ExpenseStore>;
