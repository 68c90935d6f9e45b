//! swf_apr — dynamic APR toolkit for the SWF staking vault.
//!
//! Projects the vault's APR from its deposit total, mirrors the on-chain
//! controller off-chain, and keeps a local deposit ledger and APR history.
//! Read-only; no keys; no transaction signing.

pub mod apr;
pub mod chain;
pub mod config;
pub mod monitor;
pub mod simulate;
pub mod store;

pub use apr::{interpolate, AprCurve, AprError, BpsCurve};
pub use chain::{BlockTag, Cache, RpcClient, RpcConfig, RpcError};
pub use config::{ConfigError, SwfConfig};
pub use monitor::{check_drift, DriftReport, Monitor, MonitorConfig, MonitorError, PoolState};
pub use simulate::{apr_ladder, project_stake, LadderRow, StakeProjection};
pub use store::{AprSnapshot, Deposit, Store, StoreError};
