//! Domain model: expense records, the accrual policy, run reports and the
//! ports through which the record store is reached.

pub mod accrual;
pub mod expense;
pub mod ports;
pub mod report;
