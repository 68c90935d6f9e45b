//! Toolkit configuration: APR curve, RPC endpoint, contract addresses.

mod settings;

pub use settings::{ConfigError, SwfConfig, CONFIG_PATH_ENV};
