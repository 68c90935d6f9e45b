//! CRUD over the `deposits` and `apr_snapshots` tables.

use crate::chain::{normalize_address, NormalizeError};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("address: {0}")]
    Address(#[from] NormalizeError),
    #[error("{0} does not fit in an sqlite integer")]
    OutOfRange(u64),
    #[error("deposit {0} not found")]
    NotFound(i64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: i64,
    pub address: String,
    pub amount_tokens: u64,
    pub tx_hash: Option<String>,
    pub created_utc: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AprSnapshot {
    pub id: i64,
    pub block_number: Option<u64>,
    pub total_deposits_tokens: u64,
    pub apr_bps: u32,
    pub onchain_apr_bps: Option<u32>,
    pub created_utc: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewSnapshot {
    pub block_number: Option<u64>,
    pub total_deposits_tokens: u64,
    pub apr_bps: u32,
    pub onchain_apr_bps: Option<u32>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS deposits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    amount_tokens INTEGER NOT NULL,
    tx_hash TEXT,
    created_utc INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deposits_address ON deposits(address);
CREATE TABLE IF NOT EXISTS apr_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_number INTEGER,
    total_deposits_tokens INTEGER NOT NULL,
    apr_bps INTEGER NOT NULL,
    onchain_apr_bps INTEGER,
    created_utc INTEGER NOT NULL
);
"#;

fn to_sql_int(v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::OutOfRange(v))
}

fn deposit_from_row(r: &Row<'_>) -> rusqlite::Result<Deposit> {
    Ok(Deposit {
        id: r.get(0)?,
        address: r.get(1)?,
        amount_tokens: r.get::<_, i64>(2)?.max(0) as u64,
        tx_hash: r.get(3)?,
        created_utc: r.get(4)?,
    })
}

fn snapshot_from_row(r: &Row<'_>) -> rusqlite::Result<AprSnapshot> {
    Ok(AprSnapshot {
        id: r.get(0)?,
        block_number: r.get::<_, Option<i64>>(1)?.map(|b| b.max(0) as u64),
        total_deposits_tokens: r.get::<_, i64>(2)?.max(0) as u64,
        apr_bps: r.get(3)?,
        onchain_apr_bps: r.get(4)?,
        created_utc: r.get(5)?,
    })
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))
    }

    pub fn insert_deposit(
        &self,
        address: &str,
        amount_tokens: u64,
        tx_hash: Option<&str>,
    ) -> Result<Deposit, StoreError> {
        let address = normalize_address(address)?;
        let amount = to_sql_int(amount_tokens)?;
        let created_utc = OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO deposits (address, amount_tokens, tx_hash, created_utc) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![address, amount, tx_hash, created_utc],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, %address, amount_tokens, "deposit recorded");
        Ok(Deposit {
            id,
            address,
            amount_tokens,
            tx_hash: tx_hash.map(str::to_string),
            created_utc,
        })
    }

    pub fn get_deposit(&self, id: i64) -> Result<Option<Deposit>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, address, amount_tokens, tx_hash, created_utc FROM deposits WHERE id = ?1",
                [id],
                deposit_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All deposits, or only those of `address`, oldest first.
    pub fn list_deposits(&self, address: Option<&str>) -> Result<Vec<Deposit>, StoreError> {
        let address = address.map(normalize_address).transpose()?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, address, amount_tokens, tx_hash, created_utc FROM deposits
             WHERE (?1 IS NULL OR address = ?1) ORDER BY id",
        )?;
        let rows = stmt
            .query_map([address], deposit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_deposit_amount(&self, id: i64, amount_tokens: u64) -> Result<(), StoreError> {
        let amount = to_sql_int(amount_tokens)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE deposits SET amount_tokens = ?1 WHERE id = ?2",
            rusqlite::params![amount, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn delete_deposit(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM deposits WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn total_deposits(&self, address: Option<&str>) -> Result<u64, StoreError> {
        let address = address.map(normalize_address).transpose()?;
        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount_tokens), 0) FROM deposits WHERE (?1 IS NULL OR address = ?1)",
            [address],
            |r| r.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    pub fn insert_snapshot(&self, snap: &NewSnapshot) -> Result<AprSnapshot, StoreError> {
        let block = snap.block_number.map(to_sql_int).transpose()?;
        let total = to_sql_int(snap.total_deposits_tokens)?;
        let created_utc = OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO apr_snapshots (block_number, total_deposits_tokens, apr_bps, onchain_apr_bps, created_utc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![block, total, snap.apr_bps, snap.onchain_apr_bps, created_utc],
        )?;
        Ok(AprSnapshot {
            id: conn.last_insert_rowid(),
            block_number: snap.block_number,
            total_deposits_tokens: snap.total_deposits_tokens,
            apr_bps: snap.apr_bps,
            onchain_apr_bps: snap.onchain_apr_bps,
            created_utc,
        })
    }

    pub fn latest_snapshot(&self) -> Result<Option<AprSnapshot>, StoreError> {
        Ok(self.list_snapshots(1)?.into_iter().next())
    }

    /// Most recent snapshots first.
    pub fn list_snapshots(&self, limit: u32) -> Result<Vec<AprSnapshot>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, block_number, total_deposits_tokens, apr_bps, onchain_apr_bps, created_utc
             FROM apr_snapshots ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const ALICE: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn deposit_crud() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_deposit(ALICE, 1_000, Some("0xfeed")).unwrap();
        let b = store.insert_deposit(BOB, 2_500, None).unwrap();
        assert_eq!(a.address, ALICE.to_lowercase());

        let got = store.get_deposit(a.id).unwrap().unwrap();
        assert_eq!(got, a);
        assert_eq!(store.list_deposits(None).unwrap().len(), 2);
        assert_eq!(store.list_deposits(Some(ALICE)).unwrap(), vec![a.clone()]);
        assert_eq!(store.total_deposits(None).unwrap(), 3_500);

        store.update_deposit_amount(b.id, 500).unwrap();
        assert_eq!(store.total_deposits(Some(BOB)).unwrap(), 500);

        store.delete_deposit(a.id).unwrap();
        assert!(store.get_deposit(a.id).unwrap().is_none());
        assert!(matches!(
            store.delete_deposit(a.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.update_deposit_amount(999, 1),
            Err(StoreError::NotFound(999))
        ));
    }

    #[test]
    fn rejects_bad_address_and_huge_amount() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.insert_deposit("alice", 1, None),
            Err(StoreError::Address(_))
        ));
        assert!(matches!(
            store.insert_deposit(ALICE, u64::MAX, None),
            Err(StoreError::OutOfRange(_))
        ));
        assert_eq!(store.total_deposits(None).unwrap(), 0);
    }

    #[test]
    fn snapshots_newest_first_and_persisted() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let store = Store::open(tmp.path()).unwrap();
            assert!(store.latest_snapshot().unwrap().is_none());
            for (i, total) in [20_000u64, 40_000, 60_000].iter().enumerate() {
                store
                    .insert_snapshot(&NewSnapshot {
                        block_number: Some(100 + i as u64),
                        total_deposits_tokens: *total,
                        apr_bps: 3_000 - i as u32 * 100,
                        onchain_apr_bps: None,
                    })
                    .unwrap();
            }
        }
        let store = Store::open(tmp.path()).unwrap();
        let latest = store.latest_snapshot().unwrap().unwrap();
        assert_eq!(latest.total_deposits_tokens, 60_000);
        assert_eq!(latest.block_number, Some(102));
        let two = store.list_snapshots(2).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].total_deposits_tokens, 40_000);
    }
}
