//! Record store adapters.

pub mod http_store;
pub mod in_memory;
