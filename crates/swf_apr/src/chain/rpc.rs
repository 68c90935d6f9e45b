//! JSON-RPC client for read-only contract calls, with rate limiting and retries.

use crate::chain::cache::{Cache, CacheError};
use crate::chain::normalize::{
    encode_address_arg, normalize_address, parse_quantity, parse_selector, NormalizeError,
    BALANCE_OF_SELECTOR,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.bnbchain.org";
const RATE_LIMIT_MS: u64 = 200;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;
const TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
    /// Serve only from cache; never touch the network.
    #[serde(skip)]
    pub offline: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_string(),
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            timeout_secs: TIMEOUT_SECS,
            offline: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("normalize: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("http error: status {0} body {1}")]
    Http(u16, String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("offline mode: no cached response for request")]
    OfflineMiss,
}

/// Block at which state is read. Only numbered blocks are cacheable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl BlockTag {
    pub fn as_param(&self) -> String {
        match self {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Number(n) => format!("0x{:x}", n),
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, BlockTag::Number(_))
    }
}

impl From<Option<u64>> for BlockTag {
    fn from(block: Option<u64>) -> Self {
        block.map_or(BlockTag::Latest, BlockTag::Number)
    }
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Read-only JSON-RPC client. Each caller owns its own instance.
pub struct RpcClient {
    config: RpcConfig,
    client: Option<reqwest::Client>,
    cache: Option<Cache>,
    last_request: Mutex<Option<Instant>>,
    request_count: AtomicU64,
    attempt_count: AtomicU64,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: RpcConfig, cache: Option<Cache>) -> Result<Self, RpcError> {
        let client = if config.offline {
            None
        } else {
            Some(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()?,
            )
        };
        Ok(Self {
            config,
            client,
            cache,
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
            attempt_count: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let need = Duration::from_millis(self.config.rate_limit_ms);
            let elapsed = prev.elapsed();
            if elapsed < need {
                tokio::time::sleep(need - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        cache_key: Option<&str>,
    ) -> Result<Value, RpcError> {
        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            if let Some(cached) = cache.get(key, method)? {
                debug!(%key, method, "cache hit");
                return serde_json::from_str(&cached)
                    .map_err(|e| RpcError::Decode(format!("cached {}: {}", method, e)));
            }
        }
        if self.config.offline {
            return Err(RpcError::OfflineMiss);
        }
        let client = self.client.as_ref().ok_or(RpcError::OfflineMiss)?;
        self.rate_limit().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let wait = self.backoff(attempt - 1);
                warn!(method, attempt, wait_ms = wait.as_millis() as u64, "retry after error");
                tokio::time::sleep(wait).await;
            }
            self.attempt_count.fetch_add(1, Ordering::Relaxed);
            let res = match client.post(&self.config.url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(RpcError::Request(e));
                    continue;
                }
            };
            let status = res.status();
            let text = match res.text().await {
                Ok(t) => t,
                Err(e) => {
                    last_err = Some(RpcError::Request(e));
                    continue;
                }
            };
            if !status.is_success() {
                last_err = Some(RpcError::Http(status.as_u16(), text));
                continue;
            }
            self.request_count.fetch_add(1, Ordering::Relaxed);
            let parsed: JsonRpcResponse = serde_json::from_str(&text)
                .map_err(|e| RpcError::Decode(format!("{}: {}", method, e)))?;
            if let Some(err) = parsed.error {
                return Err(RpcError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            let result = parsed
                .result
                .ok_or_else(|| RpcError::Decode(format!("{}: missing result", method)))?;
            if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
                if let Err(e) = cache.set(key, method, &result.to_string()) {
                    warn!(error = %e, "cache write failed");
                }
            }
            return Ok(result);
        }
        Err(last_err.unwrap_or_else(|| RpcError::Http(0, "no attempt made".to_string())))
    }

    fn result_str(method: &str, value: &Value) -> Result<String, RpcError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Decode(format!("{}: result is not a string", method)))
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.request("eth_blockNumber", json!([]), None).await?;
        let raw = parse_quantity(&Self::result_str("eth_blockNumber", &result)?)?;
        u64::try_from(raw).map_err(|_| RpcError::Decode(format!("block number {} out of range", raw)))
    }

    /// `eth_call` against `to` with calldata `data`. Returns the raw hex result.
    pub async fn call(&self, to: &str, data: &str, block: BlockTag) -> Result<String, RpcError> {
        let to = normalize_address(to)?;
        let tx = json!({ "to": to, "data": data });
        // pinned state is only immutable per chain, so the endpoint is part of the key
        let cache_key = block.is_pinned().then(|| {
            Cache::key_for(&json!({
                "endpoint": self.config.url,
                "method": "eth_call",
                "tx": tx,
                "block": block.as_param(),
            }))
        });
        let result = self
            .request("eth_call", json!([tx, block.as_param()]), cache_key.as_deref())
            .await?;
        Self::result_str("eth_call", &result)
    }

    /// Decode a 32-byte return word. `0x` means the target has no code.
    fn return_word(to: &str, raw: &str) -> Result<u128, RpcError> {
        let body = raw.trim().trim_start_matches("0x");
        if body.is_empty() {
            return Err(RpcError::Decode(format!(
                "eth_call to {} returned no data (no contract at address?)",
                to
            )));
        }
        Ok(parse_quantity(raw)?)
    }

    /// Call a zero-argument view function returning `uint256`.
    pub async fn read_uint(
        &self,
        to: &str,
        selector: &str,
        block: BlockTag,
    ) -> Result<u128, RpcError> {
        let selector = parse_selector(selector)?;
        let raw = self.call(to, &selector, block).await?;
        let value = Self::return_word(to, &raw)?;
        info!(%to, %selector, block = %block.as_param(), value = %value, "read_uint");
        Ok(value)
    }

    /// ERC-20 `balanceOf(holder)` in raw token units.
    pub async fn balance_of(
        &self,
        token: &str,
        holder: &str,
        block: BlockTag,
    ) -> Result<u128, RpcError> {
        let data = format!("{}{}", BALANCE_OF_SELECTOR, encode_address_arg(holder)?);
        let raw = self.call(token, &data, block).await?;
        Self::return_word(token, &raw)
    }

    /// Requests that reached the endpoint and returned HTTP success.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// HTTP sends tried, retries included.
    pub fn attempt_count(&self) -> u64 {
        self.attempt_count.load(Ordering::Relaxed)
    }
}
