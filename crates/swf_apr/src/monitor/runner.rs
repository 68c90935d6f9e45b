//! Pool state reads and the polling loop that records APR snapshots.

use crate::apr::{interpolate, AprCurve, AprError, BpsCurve};
use crate::chain::{parse_selector, to_whole_tokens, BlockTag, RpcClient, RpcError};
use crate::config::{ConfigError, SwfConfig};
use crate::monitor::drift::{check_drift, DriftReport};
use crate::store::{AprSnapshot, NewSnapshot, Store, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),
    #[error("apr: {0}")]
    Apr(#[from] AprError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("controller returned {0}, not a basis-point value")]
    ControllerValue(u128),
}

/// Everything a monitor needs, resolved from [`SwfConfig`].
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub vault: String,
    pub total_deposits_selector: String,
    pub token_decimals: u8,
    /// Controller address and `currentAPR`-style selector.
    pub controller: Option<(String, String)>,
    pub curve: AprCurve,
    pub bps_curve: BpsCurve,
    pub interval: Duration,
    pub drift_tolerance_bps: u32,
}

impl MonitorConfig {
    pub fn from_config(cfg: &SwfConfig) -> Result<Self, MonitorError> {
        cfg.validate()?;
        let selector = parse_selector(&cfg.total_deposits_selector).map_err(RpcError::from)?;
        Ok(Self {
            vault: cfg.vault()?.to_string(),
            total_deposits_selector: selector,
            token_decimals: cfg.token_decimals,
            controller: cfg
                .controller()
                .map(|(addr, sel)| (addr.to_string(), sel.to_string())),
            curve: cfg.curve,
            bps_curve: cfg.bps_curve()?,
            interval: Duration::from_secs(cfg.poll_interval_secs.max(1)),
            drift_tolerance_bps: cfg.drift_tolerance_bps,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    pub block_number: Option<u64>,
    pub total_deposits_raw: u128,
    pub total_deposits_tokens: u64,
    pub apr_bps: u32,
    /// Floating-point rate for display.
    pub apr_pct: f64,
    pub onchain_apr_bps: Option<u32>,
    pub drift: Option<DriftReport>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub samples: u64,
    pub failures: u64,
    pub drift_alerts: u64,
}

/// Polls the vault through a caller-owned client and records snapshots.
pub struct Monitor<'a> {
    rpc: &'a RpcClient,
    store: Option<&'a Store>,
    config: MonitorConfig,
}

impl<'a> Monitor<'a> {
    pub fn new(rpc: &'a RpcClient, store: Option<&'a Store>, config: MonitorConfig) -> Self {
        Self { rpc, store, config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Read deposits (and the controller rate, if configured) at `block`.
    pub async fn read_state(&self, block: BlockTag) -> Result<PoolState, MonitorError> {
        let cfg = &self.config;
        let raw = self
            .rpc
            .read_uint(&cfg.vault, &cfg.total_deposits_selector, block)
            .await?;
        // totals past u64::MAX whole tokens sit far above any high threshold
        let tokens = u64::try_from(to_whole_tokens(raw, cfg.token_decimals)).unwrap_or(u64::MAX);
        let apr_bps = cfg.bps_curve.apr_bps(tokens)?;
        let apr_pct = interpolate(tokens as f64, &cfg.curve)?;

        let onchain_apr_bps = match &cfg.controller {
            Some((addr, selector)) => {
                let v = self.rpc.read_uint(addr, selector, block).await?;
                Some(u32::try_from(v).map_err(|_| MonitorError::ControllerValue(v))?)
            }
            None => None,
        };
        let drift = onchain_apr_bps
            .map(|bps| check_drift(&cfg.bps_curve, tokens, bps, cfg.drift_tolerance_bps))
            .transpose()?;

        let block_number = match block {
            BlockTag::Number(n) => Some(n),
            BlockTag::Latest => None,
        };
        Ok(PoolState {
            block_number,
            total_deposits_raw: raw,
            total_deposits_tokens: tokens,
            apr_bps,
            apr_pct,
            onchain_apr_bps,
            drift,
        })
    }

    /// One tick: pin the current block, read state, record a snapshot.
    pub async fn sample(&self) -> Result<(PoolState, Option<AprSnapshot>), MonitorError> {
        let block = self.rpc.block_number().await?;
        let state = self.read_state(BlockTag::Number(block)).await?;
        let snapshot = match self.store {
            Some(store) => Some(store.insert_snapshot(&NewSnapshot {
                block_number: state.block_number,
                total_deposits_tokens: state.total_deposits_tokens,
                apr_bps: state.apr_bps,
                onchain_apr_bps: state.onchain_apr_bps,
            })?),
            None => None,
        };
        info!(
            block,
            total_tokens = state.total_deposits_tokens,
            apr_bps = state.apr_bps,
            onchain_apr_bps = ?state.onchain_apr_bps,
            "apr sample"
        );
        Ok((state, snapshot))
    }

    /// Sample every `interval`. Failed ticks are logged and skipped.
    /// Runs until `iterations` ticks have elapsed, or forever when `None`.
    pub async fn run(&self, iterations: Option<u64>) -> RunSummary {
        let mut summary = RunSummary::default();
        if iterations == Some(0) {
            return summary;
        }
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            summary.ticks += 1;
            match self.sample().await {
                Ok((state, _)) => {
                    summary.samples += 1;
                    if let Some(d) = state.drift.filter(|d| !d.within_tolerance) {
                        summary.drift_alerts += 1;
                        warn!(
                            expected_bps = d.expected_bps,
                            onchain_bps = d.onchain_bps,
                            delta_bps = d.delta_bps,
                            "controller apr drifted from curve"
                        );
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!(error = %e, tick = summary.ticks, "sample failed");
                }
            }
            if iterations == Some(summary.ticks) {
                return summary;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RpcConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    const VAULT: &str = "0x1111111111111111111111111111111111111111";
    const CONTROLLER: &str = "0x3333333333333333333333333333333333333333";

    fn word(v: u128) -> String {
        format!("0x{:064x}", v)
    }

    fn swf_config(url: String, with_controller: bool) -> SwfConfig {
        let mut cfg = SwfConfig {
            vault_address: Some(VAULT.to_string()),
            poll_interval_secs: 1,
            ..Default::default()
        };
        cfg.rpc = RpcConfig {
            url,
            rate_limit_ms: 0,
            max_retries: 0,
            retry_backoff_ms: 1,
            timeout_secs: 5,
            offline: false,
        };
        if with_controller {
            cfg.controller_address = Some(CONTROLLER.to_string());
            cfg.current_apr_selector = Some("0xaabbccdd".to_string());
        }
        cfg
    }

    async fn mock_chain(server: &MockServer, deposits_tokens: u128, onchain_bps: u128) {
        server
            .mock_async(|when, then| {
                when.method(POST).body_contains("eth_blockNumber");
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": "0x64"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).body_contains("0x01e1d114");
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0", "id": 1,
                    "result": word(deposits_tokens * 1_000_000_000_000_000_000)
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).body_contains("0xaabbccdd");
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": word(onchain_bps)}));
            })
            .await;
    }

    #[test]
    fn config_requires_vault() {
        let cfg = SwfConfig::default();
        assert!(matches!(
            MonitorConfig::from_config(&cfg),
            Err(MonitorError::Config(ConfigError::Missing("vault_address")))
        ));
    }

    #[tokio::test]
    async fn read_state_computes_apr() {
        let server = MockServer::start_async().await;
        mock_chain(&server, 55_000, 2_000).await;
        let cfg = swf_config(server.url("/"), true);
        let rpc = RpcClient::new(cfg.rpc.clone(), None).unwrap();
        let monitor = Monitor::new(&rpc, None, MonitorConfig::from_config(&cfg).unwrap());
        let state = monitor.read_state(BlockTag::Latest).await.unwrap();
        assert_eq!(state.total_deposits_tokens, 55_000);
        assert_eq!(state.apr_bps, 2_000);
        assert_eq!(state.apr_pct, 20.0);
        assert_eq!(state.onchain_apr_bps, Some(2_000));
        assert!(state.drift.unwrap().within_tolerance);
        assert_eq!(state.block_number, None);
    }

    #[tokio::test]
    async fn run_records_snapshots_and_counts_drift() {
        let server = MockServer::start_async().await;
        mock_chain(&server, 150_000, 3_000).await;
        let cfg = swf_config(server.url("/"), true);
        let rpc = RpcClient::new(cfg.rpc.clone(), None).unwrap();
        let store = Store::open_in_memory().unwrap();
        let monitor = Monitor::new(&rpc, Some(&store), MonitorConfig::from_config(&cfg).unwrap());
        let summary = monitor.run(Some(2)).await;
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.drift_alerts, 2);
        let snaps = store.list_snapshots(10).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].block_number, Some(100));
        assert_eq!(snaps[0].apr_bps, 1_000);
        assert_eq!(snaps[0].onchain_apr_bps, Some(3_000));
    }

    #[tokio::test]
    async fn failed_ticks_are_skipped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;
        let cfg = swf_config(server.url("/"), false);
        let rpc = RpcClient::new(cfg.rpc.clone(), None).unwrap();
        let monitor = Monitor::new(&rpc, None, MonitorConfig::from_config(&cfg).unwrap());
        let summary = monitor.run(Some(1)).await;
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.failures, 1);
    }
}
