/// Persistent table config and options.
///
/// The config bucket holds two entries. `config` records the schema the table
/// was created with plus the last assigned insertion sequence; `options`
/// records settings that can never change after creation. Both are written
/// on first register and only validated afterwards, except when a migration
/// opens a table in forced mode.
use std::path::Path;

use redb::{Database, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::bucket::{Bytes, CONFIG_KEY, CONFIG_TABLE, OPTIONS_KEY};
use crate::codec;
use crate::record::Field;
use crate::schema::{compare_fields, Schema};
use crate::{Error, Result};

/// Current schema format version.
pub const VERSION: u32 = 1;

/// Table options. Once a table is created these cannot be changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Disable all sorting features. Tables get smaller and writes faster,
    /// sorted reads silently fall back to unsorted.
    pub disable_sorting: bool,
}

/// Schema and counters persisted with a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Record type name.
    pub name: String,
    pub fields: Vec<Field>,
    pub primary_key: String,
    pub indexes: Vec<String>,
    pub uniques: Vec<String>,
    /// Sequence number assigned to the most recent insert.
    pub last_insert_index: u64,
    pub version: u32,
}

impl Config {
    fn new(name: &str, schema: &Schema) -> Self {
        Self {
            name: name.to_string(),
            fields: schema.fields.clone(),
            primary_key: schema.primary_key.clone(),
            indexes: schema.indexes.clone(),
            uniques: schema.uniques.clone(),
            last_insert_index: 0,
            version: VERSION,
        }
    }

    fn adopt(&mut self, name: &str, schema: &Schema) {
        let last_insert_index = self.last_insert_index;
        *self = Self::new(name, schema);
        self.last_insert_index = last_insert_index;
    }

    pub(crate) fn read<T: ReadableTable<Bytes, Bytes>>(table: &T) -> Result<Option<Self>> {
        match table.get(CONFIG_KEY)? {
            Some(data) => Ok(Some(codec::decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Loads the config within a write transaction.
    pub(crate) fn load(txn: &WriteTransaction) -> Result<Self> {
        let table = txn.open_table(CONFIG_TABLE)?;
        Self::read(&table)?.ok_or(Error::MissingConfig)
    }

    /// Persists the config within a write transaction.
    pub(crate) fn save(&self, txn: &WriteTransaction) -> Result<()> {
        let mut table = txn.open_table(CONFIG_TABLE)?;
        let data = codec::encode(self)?;
        table.insert(CONFIG_KEY, data.as_slice())?;
        Ok(())
    }
}

/// Creates or validates the config and options of a table.
///
/// `force` bypasses the version, schema and options checks and overwrites
/// what is stored instead. Only migration sets it.
pub(crate) fn initialize(
    txn: &WriteTransaction,
    type_name: &str,
    schema: &Schema,
    options: &Options,
    force: bool,
) -> Result<()> {
    let mut table = txn.open_table(CONFIG_TABLE)?;

    match Config::read(&table)? {
        None => {
            debug!(table = type_name, "creating table config");
            let config = Config::new(type_name, schema);
            table.insert(CONFIG_KEY, codec::encode(&config)?.as_slice())?;
        }
        Some(mut config) => {
            if config.version > VERSION && !force {
                error!(table = type_name, found = config.version, "unsupported table version");
                return Err(Error::UnsupportedVersion {
                    found: config.version,
                    supported: VERSION,
                });
            }
            if let Err(e) = compare_fields(&config.fields, &schema.fields, force) {
                if !force {
                    error!(table = type_name, error = %e, "incompatible schema");
                    return Err(e);
                }
                warn!(table = type_name, error = %e, "forcing incompatible schema");
            }
            if force && config.fields != schema.fields {
                config.adopt(type_name, schema);
                table.insert(CONFIG_KEY, codec::encode(&config)?.as_slice())?;
            }
            debug!(table = type_name, "config matches");
        }
    }

    let requested = codec::encode(options)?;
    let stored = table.get(OPTIONS_KEY)?.map(|data| data.value().to_vec());
    match stored {
        Some(stored) if stored == requested => {}
        Some(_) if force => {
            warn!(table = type_name, "overwriting table options");
            table.insert(OPTIONS_KEY, requested.as_slice())?;
        }
        Some(_) => {
            error!(table = type_name, "cannot change options of existing table");
            return Err(Error::OptionsChanged);
        }
        None => {
            table.insert(OPTIONS_KEY, requested.as_slice())?;
        }
    }

    Ok(())
}

fn open_existing(path: &Path) -> Result<Database> {
    if !path.exists() {
        return Err(Error::TablePathNotFound(path.to_path_buf()));
    }
    Ok(Database::open(path)?)
}

/// Reads the options of the table at `path` without registering a type.
pub fn read_options(path: impl AsRef<Path>) -> Result<Options> {
    let db = open_existing(path.as_ref())?;
    let txn = db.begin_read()?;
    let table = txn.open_table(CONFIG_TABLE)?;
    let data = table.get(OPTIONS_KEY)?;
    match data {
        Some(data) => Ok(codec::decode(data.value())?),
        None => Ok(Options::default()),
    }
}

/// Reads the config of the table at `path` without registering a type.
pub fn read_config(path: impl AsRef<Path>) -> Result<Config> {
    let db = open_existing(path.as_ref())?;
    let txn = db.begin_read()?;
    let table = txn.open_table(CONFIG_TABLE)?;
    Config::read(&table)?.ok_or(Error::MissingConfig)
}
