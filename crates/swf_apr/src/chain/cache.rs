//! SQLite cache with content-hash keys for block-pinned RPC responses.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Results of pinned JSON-RPC requests, keyed by the SHA-256 of the request
/// and scoped by RPC method.
pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open the cache file, creating it and its directory on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rpc_cache (
                key TEXT PRIMARY KEY,
                method TEXT NOT NULL,
                value TEXT NOT NULL,
                created_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rpc_cache_method ON rpc_cache(method);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Hex SHA-256 of a serialized request.
    pub fn key_for(request: &serde_json::Value) -> String {
        hex::encode(Sha256::digest(request.to_string().as_bytes()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))
    }

    /// Stored result for `key`, only if it was recorded under `method`.
    pub fn get(&self, key: &str, method: &str) -> Result<Option<String>, CacheError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM rpc_cache WHERE key = ?1 AND method = ?2",
                [key, method],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, method: &str, value: &str) -> Result<(), CacheError> {
        let created = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO rpc_cache (key, method, value, created_utc) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, method, value, created],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64, CacheError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM rpc_cache", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn request_key_tracks_block() {
        let at_16 = json!({"method": "eth_call", "block": "0x10"});
        let at_17 = json!({"method": "eth_call", "block": "0x11"});
        assert_eq!(Cache::key_for(&at_16), Cache::key_for(&at_16.clone()));
        assert_ne!(Cache::key_for(&at_16), Cache::key_for(&at_17));
        assert_eq!(Cache::key_for(&at_16).len(), 64);
    }

    #[test]
    fn lookup_is_scoped_by_method() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        assert!(cache.is_empty().unwrap());
        let key = Cache::key_for(&json!({"block": "0x5"}));
        cache.set(&key, "eth_call", "\"0x01\"").unwrap();
        assert_eq!(cache.get(&key, "eth_call").unwrap().as_deref(), Some("\"0x01\""));
        assert!(cache.get(&key, "eth_getBalance").unwrap().is_none());
        assert!(cache.get("missing", "eth_call").unwrap().is_none());
    }

    #[test]
    fn rewrite_replaces_method_and_value() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let key = Cache::key_for(&json!({"block": "0x5"}));
        cache.set(&key, "eth_call", "\"0x01\"").unwrap();
        cache.set(&key, "eth_getStorageAt", "\"0x02\"").unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.get(&key, "eth_call").unwrap().is_none());
        assert_eq!(
            cache.get(&key, "eth_getStorageAt").unwrap().as_deref(),
            Some("\"0x02\"")
        );
    }

    #[test]
    fn entries_survive_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        let key = Cache::key_for(&json!({"block": "0x7"}));
        Cache::open(tmp.path())
            .unwrap()
            .set(&key, "eth_call", "\"0x2a\"")
            .unwrap();
        let reopened = Cache::open(tmp.path()).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert_eq!(reopened.get(&key, "eth_call").unwrap().as_deref(), Some("\"0x2a\""));
    }
}
