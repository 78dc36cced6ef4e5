//! Write-side ingestion: bounded copy and the per-connection session.

pub mod copy;
pub mod session;
