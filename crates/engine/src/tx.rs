/// Read and read-write transaction scopes.
///
/// A table handle carries a readers-writer lock. Any number of read scopes
/// may run at once; a read-write scope is exclusive and blocks readers and
/// other writers for the whole duration of its callback. This makes
/// multi-step sequences such as read-then-write indivisible from the
/// caller's point of view.
///
/// Every individual operation still runs in its own KV transaction: an
/// operation that fails leaves the table unchanged, but changes made by
/// earlier successful operations within the same callback are kept.
use std::ops::Deref;

use redb::{Database, WriteTransaction};
use serde::Serialize;
use tracing::warn;

use crate::read::GetOptions;
use crate::{Error, Record, Result, Table};

/// Read-only view of a table, valid for the duration of a
/// [`Table::start_read`] callback.
pub struct ReadTx<'a, T: Record> {
    pub(crate) table: &'a Table<T>,
    pub(crate) db: &'a Database,
}

/// Read-write view of a table, valid for the duration of a
/// [`Table::start_write`] callback. Dereferences to [`ReadTx`] for queries.
pub struct WriteTx<'a, T: Record> {
    read: ReadTx<'a, T>,
}

impl<'a, T: Record> Deref for WriteTx<'a, T> {
    type Target = ReadTx<'a, T>;

    fn deref(&self) -> &Self::Target {
        &self.read
    }
}

impl<T: Record> Table<T> {
    /// Runs `f` inside a read-only transaction scope.
    ///
    /// Blocks while a read-write scope is active.
    pub fn start_read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ReadTx<'_, T>) -> Result<R>,
    {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::Closed)?;
        f(&ReadTx { table: self, db })
    }

    /// Runs `f` inside an exclusive read-write transaction scope.
    ///
    /// Blocks while any other scope is active.
    pub fn start_write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&WriteTx<'_, T>) -> Result<R>,
    {
        let guard = self.db.write();
        let db = guard.as_ref().ok_or(Error::Closed)?;
        f(&WriteTx {
            read: ReadTx { table: self, db },
        })
    }
}

/// Runs `f` in one KV write transaction, committing on success and aborting
/// on error.
pub(crate) fn write_txn<R>(
    db: &Database,
    f: impl FnOnce(&WriteTransaction) -> Result<R>,
) -> Result<R> {
    let txn = db.begin_write()?;
    match f(&txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort) = txn.abort() {
                warn!(error = %abort, "failed to abort transaction");
            }
            Err(e)
        }
    }
}

impl<T: Record> ReadTx<'_, T> {
    /// Gets a record by primary key. `Ok(None)` if nothing matches.
    pub fn get<K: Serialize + ?Sized>(&self, primary_key: &K) -> Result<Option<T>> {
        self.table.get(self.db, primary_key)
    }

    /// Gets every record whose indexed `field` equals `value`.
    ///
    /// # Errors
    ///
    /// [`Error::FieldNotIndexed`] if `field` is not an index.
    pub fn get_index<V: Serialize + ?Sized>(
        &self,
        field: &str,
        value: &V,
        options: GetOptions,
    ) -> Result<Vec<T>> {
        self.table.get_index(self.db, field, value, options)
    }

    /// Gets the record whose unique `field` equals `value`.
    ///
    /// # Errors
    ///
    /// [`Error::FieldNotUnique`] if `field` is not unique.
    pub fn get_unique<V: Serialize + ?Sized>(&self, field: &str, value: &V) -> Result<Option<T>> {
        self.table.get_unique(self.db, field, value)
    }

    /// Gets every record in the table.
    pub fn get_all(&self, options: GetOptions) -> Result<Vec<T>> {
        self.table.get_all(self.db, options)
    }
}

impl<T: Record> WriteTx<'_, T> {
    /// Adds a new record.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicatePrimaryKey`] or [`Error::DuplicateUnique`] when a
    /// constraint would be broken. Nothing is written in that case.
    pub fn add(&self, record: &T) -> Result<()> {
        self.table.add(self.db, record)
    }

    /// Deletes `record` and cleans its index entries.
    pub fn delete(&self, record: &T) -> Result<()> {
        self.table.delete(self.db, record)
    }

    /// Deletes the record with this primary key. Does nothing if absent.
    pub fn delete_primary_key<K: Serialize + ?Sized>(&self, primary_key: &K) -> Result<()> {
        self.table.delete_primary_key(self.db, primary_key)
    }

    /// Deletes the record whose unique `field` equals `value`. Does nothing
    /// if absent.
    pub fn delete_unique<V: Serialize + ?Sized>(&self, field: &str, value: &V) -> Result<()> {
        self.table.delete_unique(self.db, field, value)
    }

    /// Deletes every record whose indexed `field` equals `value`.
    pub fn delete_all_index<V: Serialize + ?Sized>(&self, field: &str, value: &V) -> Result<()> {
        self.table.delete_all_index(self.db, field, value)
    }

    /// Deletes every record and resets the insertion sequence.
    pub fn delete_all(&self) -> Result<()> {
        self.table.delete_all(self.db)
    }

    /// Replaces the record with the same primary key, keeping its sort
    /// position. Adds it if no such record exists.
    pub fn update(&self, record: &T) -> Result<()> {
        self.table.update(self.db, record)
    }
}
