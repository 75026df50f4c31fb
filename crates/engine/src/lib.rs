//! # Engine - typed tables over an embedded KV store
//!
//! Stores records of one Rust type per table file, with a primary key,
//! secondary indexes, unique constraints and insertion-order sorting. All
//! state lives in a [`redb`] database as a handful of byte-keyed buckets.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! Table::register ── schema.rs (roles) ── config.rs (validate / persist)
//!   |
//!   v
//! start_read / start_write            (tx.rs, table RwLock)
//!   |                  |
//!   v                  v
//! read.rs             write.rs
//! get / get_index     add / delete* / update / delete_all
//! get_unique/get_all        (one KV write transaction per call)
//!   |                  |
//!   └────────┬─────────┘
//!            v
//!   data | insert_order | config | index:<f> | unique:<f>
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | `lib.rs`     | `Table` struct, `register`, `close`, accessors          |
//! | [`record`]   | `Record` trait and field descriptors                   |
//! | [`schema`]   | Role extraction and compatibility rules                |
//! | [`config`]   | Persisted config/options                               |
//! | [`write`]    | Add, delete, update, delete-all                        |
//! | [`read`]     | Get, index/unique lookups, get-all                     |
//! | [`tx`]       | Read and read-write transaction scopes                 |
//! | [`migrate`]  | Rebuild a table under a new type                       |
//!
//! ## Example
//!
//! ```rust,no_run
//! use engine::{GetOptions, Options, Record, Table};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, Record)]
//! struct User {
//!     #[ds(primary)]
//!     username: String,
//!     #[ds(unique)]
//!     email: String,
//!     #[ds(index)]
//!     enabled: bool,
//! }
//!
//! # fn main() -> engine::Result<()> {
//! let table = Table::<User>::register("users.db", Options::default())?;
//! table.start_write(|tx| {
//!     tx.add(&User {
//!         username: "ian".into(),
//!         email: "ian@example.com".into(),
//!         enabled: true,
//!     })
//! })?;
//! let enabled = table.start_read(|tx| tx.get_index("enabled", &true, GetOptions::default()))?;
//! assert_eq!(enabled.len(), 1);
//! table.close();
//! # Ok(())
//! # }
//! ```

extern crate self as engine;

pub mod bucket;
pub mod codec;
pub mod config;
mod error;
mod migrate;
mod read;
mod record;
mod schema;
mod tx;
mod write;

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use redb::{Database, DatabaseError, TableError};
use tracing::{error, info};

pub use config::{read_config, read_options, Config, Options};
pub use engine_derive::Record;
pub use error::{Error, ErrorKind, Result};
pub use migrate::{migrate, MigrateParams, MigrationResults};
pub use read::GetOptions;
pub use record::{Field, FieldRole, Record};
pub use schema::{compare_fields, Schema};
pub use tx::{ReadTx, WriteTx};

/// A table of records of type `T` backed by a single file.
///
/// Created by [`Table::register`]. All reads and writes go through
/// [`Table::start_read`] and [`Table::start_write`]. The table owns the file
/// handle until [`Table::close`] is called or the table is dropped.
pub struct Table<T: Record> {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) schema: Schema,
    pub(crate) options: Options,
    /// Transaction lock and owner of the KV handle. `None` once closed.
    pub(crate) db: RwLock<Option<Database>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("primary_key", &self.schema.primary_key)
            .field("indexes", &self.schema.indexes)
            .field("uniques", &self.schema.uniques)
            .field("options", &self.options)
            .field("open", &self.db.read().is_some())
            .finish()
    }
}

impl<T: Record> Table<T> {
    /// Creates a table for `T` at `path`, or opens the existing one.
    ///
    /// # Steps
    ///
    /// 1. Extract the schema of `T`.
    /// 2. If `path` exists it must already be a table file (it must carry a
    ///    config bucket), otherwise [`Error::BadTableFile`].
    /// 3. Create the config and options on first open; on later opens check
    ///    that the schema is compatible and the options are unchanged.
    /// 4. Create any missing buckets.
    ///
    /// # Errors
    ///
    /// Validation errors from the schema, compatibility errors on reopen, and
    /// environment errors when the file cannot be opened (including when
    /// another process holds it).
    pub fn register<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        Self::open(path.as_ref(), options, false)
    }

    /// Registers `T` at `path`. With `force` an existing config and options
    /// are overwritten instead of validated.
    pub(crate) fn open(path: &Path, options: Options, force: bool) -> Result<Self> {
        let path = path.to_path_buf();
        let name = T::type_name().to_string();
        let schema = Schema::of::<T>()?;

        let db = Self::open_database(&path)?;

        let txn = db.begin_write()?;
        let prepared = config::initialize(&txn, &name, &schema, &options, force)
            .and_then(|()| Self::create_buckets(&txn, &schema, &options));
        if let Err(e) = prepared {
            error!(table = %name, error = %e, "error preparing table");
            txn.abort()?;
            return Err(e);
        }
        txn.commit()?;

        info!(table = %name, path = %path.display(), "table opened");

        Ok(Self {
            name,
            path,
            schema,
            options,
            db: RwLock::new(Some(db)),
            _record: PhantomData,
        })
    }

    /// Opens the file at `path`, refusing existing files that are not tables.
    fn open_database(path: &Path) -> Result<Database> {
        if !path.exists() {
            return Ok(Database::create(path)?);
        }

        let db = match Database::open(path) {
            Ok(db) => db,
            Err(e @ DatabaseError::DatabaseAlreadyOpen) => return Err(e.into()),
            Err(e) => {
                error!(path = %path.display(), error = %e, "existing file is not a table");
                return Err(Error::BadTableFile(path.to_path_buf()));
            }
        };

        let txn = db.begin_read()?;
        match txn.open_table(bucket::CONFIG_TABLE) {
            Ok(_) => {}
            Err(TableError::TableDoesNotExist(_)) => {
                error!(path = %path.display(), "existing file has no config bucket");
                return Err(Error::BadTableFile(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }
        drop(txn);

        Ok(db)
    }

    fn create_buckets(
        txn: &redb::WriteTransaction,
        schema: &Schema,
        options: &Options,
    ) -> Result<()> {
        txn.open_table(bucket::DATA_TABLE)?;
        if !options.disable_sorting {
            txn.open_table(bucket::INSERT_ORDER_TABLE)?;
        }
        for index in &schema.indexes {
            txn.open_table(bucket::named(&bucket::index_name(index)))?;
        }
        for unique in &schema.uniques {
            txn.open_table(bucket::named(&bucket::unique_name(unique)))?;
        }
        Ok(())
    }

    /// Closes the table, waiting for running transactions to finish.
    ///
    /// Safe to call more than once. Every transaction started afterwards
    /// fails with [`Error::Closed`].
    pub fn close(&self) {
        if self.db.write().take().is_some() {
            info!(table = %self.name, "table closed");
        }
    }

    /// Record type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.schema.primary_key
    }

    #[must_use]
    pub fn indexes(&self) -> &[String] {
        &self.schema.indexes
    }

    #[must_use]
    pub fn uniques(&self) -> &[String] {
        &self.schema.uniques
    }

    #[must_use]
    pub fn options(&self) -> Options {
        self.options
    }

    /// Returns `true` if `field` is registered as an index.
    #[must_use]
    pub fn is_indexed(&self, field: &str) -> bool {
        self.schema.indexes.iter().any(|f| f == field)
    }

    /// Returns `true` if `field` is registered as unique.
    #[must_use]
    pub fn is_unique(&self, field: &str) -> bool {
        self.schema.uniques.iter().any(|f| f == field)
    }

    pub(crate) fn sorting_enabled(&self) -> bool {
        !self.options.disable_sorting
    }

    /// Encodes the primary key of `record`.
    pub(crate) fn primary_key_bytes(&self, record: &T) -> Result<Vec<u8>> {
        self.field_bytes(record, &self.schema.primary_key)
    }

    pub(crate) fn field_bytes(&self, record: &T, field: &str) -> Result<Vec<u8>> {
        record
            .encode_field(field)?
            .ok_or_else(|| Error::UnknownField(field.to_string()))
    }
}

#[cfg(test)]
mod tests;
