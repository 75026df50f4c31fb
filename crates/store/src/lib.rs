//! # Store - named single-bucket byte store
//!
//! A plain string-keyed byte store living in one file. Each store owns a
//! single bucket inside a [`redb`] database at `<data_dir>/<name><extension>`.
//! Unlike engine tables there is no schema, no index and no ordering other
//! than key order.
//!
//! Every call runs in its own KV transaction. [`Store::begin_write`] groups
//! several writes into one transaction that commits when the callback
//! returns `Ok` and rolls back when it returns `Err`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use store::Store;
//!
//! let store = Store::new("data", "sessions", None).unwrap();
//! store.write("abc", b"payload").unwrap();
//! assert_eq!(store.get("abc").unwrap().as_deref(), Some(&b"payload"[..]));
//!
//! store
//!     .begin_write(|tx| {
//!         tx.delete("abc")?;
//!         tx.write("def", b"other")
//!     })
//!     .unwrap();
//! store.close();
//! ```

use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default file extension of a store.
pub const DEFAULT_EXTENSION: &str = ".db";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The KV store reported an error.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),
}

macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Storage(e.into())
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Options for [`Store::new`]. Empty values fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// File extension including the dot. Defaults to `.db`.
    pub extension: String,
    /// Bucket name. Defaults to the store name.
    pub bucket_name: String,
}

/// A single-bucket byte store.
pub struct Store {
    name: String,
    path: PathBuf,
    bucket: String,
    db: RwLock<Option<Database>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl Store {
    /// Creates or opens the store `name` in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Storage` if the file cannot be opened, including
    /// when another process holds it.
    pub fn new<P: AsRef<Path>>(
        data_dir: P,
        name: &str,
        options: Option<StoreOptions>,
    ) -> Result<Self> {
        let options = options.unwrap_or_default();
        let extension = if options.extension.is_empty() {
            DEFAULT_EXTENSION.to_string()
        } else {
            options.extension
        };
        let bucket = if options.bucket_name.is_empty() {
            name.to_string()
        } else {
            options.bucket_name
        };
        let path = data_dir.as_ref().join(format!("{name}{extension}"));

        let db = Database::create(&path).map_err(|e| {
            error!(store = name, path = %path.display(), error = %e, "error opening store");
            e
        })?;
        let txn = db.begin_write()?;
        txn.open_table(TableDefinition::<&'static str, &'static [u8]>::new(&bucket))?;
        txn.commit()?;
        debug!(store = name, "opened");

        Ok(Self {
            name: name.to_string(),
            path,
            bucket,
            db: RwLock::new(Some(db)),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.bucket)
    }

    fn with_db<R>(&self, f: impl FnOnce(&Database) -> Result<R>) -> Result<R> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        f(db)
    }

    /// Returns the value stored under `key`, or `None`.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let bucket = txn.open_table(self.definition())?;
            debug!(store = %self.name, key, "get");
            let value = bucket.get(key)?.map(|v| v.value().to_vec());
            Ok(value)
        })
    }

    /// Adds or replaces the value for `key`.
    pub fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.begin_write(|tx| tx.write(key, value))
    }

    /// Removes `key`. Does nothing if it is absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.begin_write(|tx| tx.delete(key))
    }

    /// Number of entries in the store.
    pub fn count(&self) -> Result<u64> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let bucket = txn.open_table(self.definition())?;
            Ok(bucket.len()?)
        })
    }

    /// Calls `f` with each key, its 0-based position and its value, in key
    /// order. Stops at the first error `f` returns.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&str, usize, &[u8]) -> Result<(), E>,
    {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = db.begin_read().map_err(StoreError::from)?;
        let bucket = txn.open_table(self.definition()).map_err(StoreError::from)?;
        debug!(store = %self.name, "for each");

        for (idx, entry) in bucket.iter().map_err(StoreError::from)?.enumerate() {
            let (key, value) = entry.map_err(StoreError::from)?;
            f(key.value(), idx, value.value())?;
        }
        Ok(())
    }

    /// Removes every entry.
    pub fn truncate(&self) -> Result<()> {
        self.with_db(|db| {
            let txn = db.begin_write()?;
            txn.delete_table(self.definition())?;
            txn.open_table(self.definition())?;
            txn.commit()?;
            debug!(store = %self.name, "truncated");
            Ok(())
        })
    }

    /// Copies a consistent snapshot of the store into a new store file at
    /// `path`, replacing any file already there. Writers are not blocked.
    pub fn backup_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let source = txn.open_table(self.definition())?;

            if path.exists() {
                fs::remove_file(path)?;
            }
            let target = Database::create(path)?;
            let out = target.begin_write()?;
            {
                let mut copy = out.open_table(self.definition())?;
                for entry in source.iter()? {
                    let (key, value) = entry?;
                    copy.insert(key.value(), value.value())?;
                }
            }
            out.commit()?;
            debug!(store = %self.name, target = %path.display(), "backed up");
            Ok(())
        })
    }

    /// Writes a consistent snapshot of the store, as a complete store file,
    /// to `writer`. Returns the number of bytes written.
    pub fn copy_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let snapshot = tempfile::Builder::new()
            .prefix(&format!(".{}-copy", self.name))
            .tempfile_in(dir)?;
        self.backup_to(snapshot.path())?;

        let mut file = fs::File::open(snapshot.path())?;
        let written = io::copy(&mut file, writer)?;
        debug!(store = %self.name, bytes = written, "copied");
        Ok(written)
    }

    /// Runs `f` in one read-write transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls every change back when it returns
    /// `Err`. Other writers wait until the transaction ends.
    pub fn begin_write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError> + Display,
        F: FnOnce(&StoreTx<'_>) -> Result<R, E>,
    {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = db.begin_write().map_err(StoreError::from)?;

        let result = f(&StoreTx {
            txn: &txn,
            store: self,
        });
        match result {
            Ok(value) => {
                txn.commit().map_err(StoreError::from)?;
                debug!(store = %self.name, "commit");
                Ok(value)
            }
            Err(e) => {
                warn!(store = %self.name, error = %e, "transaction error, rolling back");
                if let Err(abort) = txn.abort() {
                    error!(store = %self.name, error = %abort, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Closes the store, waiting for running transactions. Safe to call more
    /// than once.
    pub fn close(&self) {
        if self.db.write().take().is_some() {
            debug!(store = %self.name, "closed");
        }
    }
}

/// A read-write transaction handed to [`Store::begin_write`] callbacks.
pub struct StoreTx<'a> {
    txn: &'a WriteTransaction,
    store: &'a Store,
}

impl StoreTx<'_> {
    /// Returns the value stored under `key`, including uncommitted writes
    /// made earlier in this transaction.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let bucket = self.txn.open_table(self.store.definition())?;
        let value = bucket.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Adds or replaces the value for `key`.
    pub fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut bucket = self.txn.open_table(self.store.definition())?;
        debug!(store = %self.store.name, key, "set");
        bucket.insert(key, value)?;
        Ok(())
    }

    /// Removes `key` if present.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut bucket = self.txn.open_table(self.store.definition())?;
        debug!(store = %self.store.name, key, "delete");
        bucket.remove(key)?;
        Ok(())
    }
}
