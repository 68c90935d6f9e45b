//! SWF deployment settings loaded from JSON.
//!
//! Load from: env `SWF_CONFIG_PATH`, or `./config/swf.json`, or `./swf.json`.
//! Missing fields take defaults, so a file only needs the addresses that differ
//! per deployment.

use crate::apr::{AprCurve, AprError, BpsCurve};
use crate::chain::{
    normalize_address, parse_selector, NormalizeError, RpcConfig, TOTAL_ASSETS_SELECTOR,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_PATH_ENV: &str = "SWF_CONFIG_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("curve: {0}")]
    Curve(#[from] AprError),
    #[error("rpc url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{field}: {source}")]
    Field {
        field: &'static str,
        source: NormalizeError,
    },
    #[error("missing {0}")]
    Missing(&'static str),
}

fn field_error(field: &'static str) -> impl Fn(NormalizeError) -> ConfigError {
    move |source| ConfigError::Field { field, source }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwfConfig {
    /// Thresholds in whole tokens, rates in percent.
    pub curve: AprCurve,
    pub token_decimals: u8,
    pub rpc: RpcConfig,

    /// Vault whose total deposits drive the curve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_address: Option<String>,
    pub total_deposits_selector: String,

    /// Optional on-chain APR controller, read back in basis points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_apr_selector: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,

    pub poll_interval_secs: u64,
    pub drift_tolerance_bps: u32,
}

impl Default for SwfConfig {
    fn default() -> Self {
        Self {
            curve: AprCurve::default(),
            token_decimals: 18,
            rpc: RpcConfig::default(),
            vault_address: None,
            total_deposits_selector: TOTAL_ASSETS_SELECTOR.to_string(),
            controller_address: None,
            current_apr_selector: None,
            token_address: None,
            poll_interval_secs: 60,
            drift_tolerance_bps: 0,
        }
    }
}

impl SwfConfig {
    /// Load config from path. Returns default on error or missing file.
    pub fn load_from_path(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(cfg) => {
                debug!(path = %path.display(), "config loaded");
                cfg
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config invalid, using defaults");
                Self::default()
            }
        }
    }

    /// Load config: env SWF_CONFIG_PATH, then ./config/swf.json, then ./swf.json.
    pub fn load() -> Self {
        Self::load_in(Path::new("."))
    }

    /// `load` with the fallback files resolved against `dir`.
    pub fn load_in(dir: &Path) -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = Path::new(&path);
            if p.exists() {
                return Self::load_from_path(p);
            }
            warn!(%path, "{} points to a missing file", CONFIG_PATH_ENV);
        }
        for candidate in [dir.join("config").join("swf.json"), dir.join("swf.json")] {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.curve.validate()?;
        self.bps_curve()?;
        url::Url::parse(&self.rpc.url)?;
        parse_selector(&self.total_deposits_selector)
            .map_err(field_error("total_deposits_selector"))?;
        if let Some(sel) = &self.current_apr_selector {
            parse_selector(sel).map_err(field_error("current_apr_selector"))?;
        }
        for (name, addr) in [
            ("vault_address", &self.vault_address),
            ("controller_address", &self.controller_address),
            ("token_address", &self.token_address),
        ] {
            if let Some(a) = addr {
                normalize_address(a).map_err(field_error(name))?;
            }
        }
        Ok(())
    }

    pub fn bps_curve(&self) -> Result<BpsCurve, AprError> {
        BpsCurve::from_percent(&self.curve)
    }

    pub fn vault(&self) -> Result<&str, ConfigError> {
        self.vault_address
            .as_deref()
            .ok_or(ConfigError::Missing("vault_address"))
    }

    pub fn token(&self) -> Result<&str, ConfigError> {
        self.token_address
            .as_deref()
            .ok_or(ConfigError::Missing("token_address"))
    }

    /// Controller address and selector, when both are configured.
    pub fn controller(&self) -> Option<(&str, &str)> {
        self.controller_address
            .as_deref()
            .zip(self.current_apr_selector.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        let cfg = SwfConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.bps_curve().unwrap().max_apr_bps, 3_000);
        assert!(cfg.controller().is_none());
        assert!(matches!(cfg.vault(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"vault_address": "0x1111111111111111111111111111111111111111",
                 "rpc": {{"url": "http://127.0.0.1:8545"}},
                 "curve": {{"low_threshold": 5000, "high_threshold": 50000, "min_apr": 8, "max_apr": 24}}}}"#
        )
        .unwrap();
        let cfg = SwfConfig::load_from_path(f.path());
        assert_eq!(cfg.rpc.url, "http://127.0.0.1:8545");
        assert_eq!(cfg.rpc.max_retries, 3);
        assert_eq!(cfg.curve.high_threshold, 50_000.0);
        assert_eq!(cfg.token_decimals, 18);
        cfg.validate().unwrap();
    }

    #[test]
    fn invalid_file_yields_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert_eq!(SwfConfig::load_from_path(f.path()), SwfConfig::default());
        assert_eq!(
            SwfConfig::load_from_path(Path::new("/nonexistent/swf.json")),
            SwfConfig::default()
        );
    }

    #[test]
    fn validation_errors() {
        let cfg = SwfConfig {
            curve: AprCurve {
                low_threshold: 10.0,
                high_threshold: 10.0,
                min_apr: 1.0,
                max_apr: 2.0,
            },
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Curve(_))));

        let cfg = SwfConfig {
            controller_address: Some("0xnope".into()),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Field {
                field: "controller_address",
                ..
            })
        ));

        let mut cfg = SwfConfig::default();
        cfg.rpc.url = "not a url".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Url(_))));
    }

    fn write_config(path: &Path, max_retries: u32) {
        std::fs::write(path, format!(r#"{{"rpc": {{"max_retries": {}}}}}"#, max_retries)).unwrap();
    }

    // only test that touches SWF_CONFIG_PATH
    #[test]
    fn load_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var(CONFIG_PATH_ENV);
        assert_eq!(SwfConfig::load_in(dir.path()), SwfConfig::default());

        write_config(&dir.path().join("swf.json"), 11);
        assert_eq!(SwfConfig::load_in(dir.path()).rpc.max_retries, 11);

        std::fs::create_dir(dir.path().join("config")).unwrap();
        write_config(&dir.path().join("config").join("swf.json"), 12);
        assert_eq!(SwfConfig::load_in(dir.path()).rpc.max_retries, 12);

        let explicit = NamedTempFile::new().unwrap();
        write_config(explicit.path(), 13);
        std::env::set_var(CONFIG_PATH_ENV, explicit.path());
        assert_eq!(SwfConfig::load_in(dir.path()).rpc.max_retries, 13);

        std::env::set_var(CONFIG_PATH_ENV, dir.path().join("gone.json"));
        assert_eq!(SwfConfig::load_in(dir.path()).rpc.max_retries, 12);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(SwfConfig::load_in(empty.path()), SwfConfig::default());
        std::env::remove_var(CONFIG_PATH_ENV);
    }
}
