//! Outer surfaces: the HTTP API and the CSV run report.

pub mod csv;
pub mod http;
