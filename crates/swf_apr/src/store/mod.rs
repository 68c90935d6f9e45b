//! SQLite persistence: deposit ledger and APR snapshots.

mod db;

pub use db::{AprSnapshot, Deposit, NewSnapshot, Store, StoreError};
