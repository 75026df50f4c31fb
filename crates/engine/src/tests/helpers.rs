use std::path::Path;

use anyhow::{Context, Result};
use redb::ReadableTableMetadata;
use serde::{Deserialize, Serialize};

use crate::bucket;
use crate::config::Config;
use crate::{Options, Record, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct User {
    #[ds(primary)]
    pub username: String,
    #[ds(unique)]
    pub email: String,
    #[ds(index)]
    pub group: String,
    #[ds(index)]
    pub enabled: bool,
    pub password: String,
}

pub fn user(username: &str, group: &str) -> User {
    User {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        group: group.to_string(),
        enabled: true,
        password: "hunter2".to_string(),
    }
}

pub fn open_users(path: &Path) -> Result<Table<User>> {
    Ok(Table::<User>::register(path, Options::default())?)
}

pub fn open_unsorted(path: &Path) -> Result<Table<User>> {
    Ok(Table::<User>::register(
        path,
        Options {
            disable_sorting: true,
        },
    )?)
}

pub fn usernames(users: &[User]) -> Vec<&str> {
    users.iter().map(|u| u.username.as_str()).collect()
}

/// Reads the config through the table's own handle.
pub fn config_of<T: Record>(table: &Table<T>) -> Result<Config> {
    let guard = table.db.read();
    let db = guard.as_ref().context("table closed")?;
    let txn = db.begin_read()?;
    let config = txn.open_table(bucket::CONFIG_TABLE)?;
    Config::read(&config)?.context("config missing")
}

/// Number of entries in bucket `name`.
pub fn bucket_len<T: Record>(table: &Table<T>, name: &str) -> Result<u64> {
    let guard = table.db.read();
    let db = guard.as_ref().context("table closed")?;
    let txn = db.begin_read()?;
    let bucket = txn.open_table(bucket::named(name))?;
    Ok(bucket.len()?)
}

/// Whether bucket `name` exists at all.
pub fn has_bucket<T: Record>(table: &Table<T>, name: &str) -> Result<bool> {
    use redb::TableHandle;

    let guard = table.db.read();
    let db = guard.as_ref().context("table closed")?;
    let txn = db.begin_read()?;
    let found = txn.list_tables()?.any(|t| t.name() == name);
    Ok(found)
}

/// Removes `key` from bucket `name`, bypassing the engine.
pub fn remove_raw<T: Record>(table: &Table<T>, name: &str, key: &[u8]) -> Result<()> {
    let guard = table.db.read();
    let db = guard.as_ref().context("table closed")?;
    let txn = db.begin_write()?;
    {
        let mut bucket = txn.open_table(bucket::named(name))?;
        bucket.remove(key)?;
    }
    txn.commit()?;
    Ok(())
}
