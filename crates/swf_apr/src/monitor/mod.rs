//! Off-chain mirror of the on-chain APR controller: pool reads, drift checks, polling.

mod drift;
mod runner;

pub use drift::{check_drift, DriftReport};
pub use runner::{Monitor, MonitorConfig, MonitorError, PoolState, RunSummary};
