//! Bucket names and definitions.
//!
//! ```text
//! data              primary key   -> record
//! insert_order      primary key   -> u64 LE sequence   (sorted tables only)
//! config            "config"      -> Config
//!                   "options"     -> Options
//! index:<field>     field value   -> [primary key, ...]
//! unique:<field>    field value   -> primary key
//! ```

use redb::TableDefinition;

/// Every bucket maps bytes to bytes.
pub(crate) type Bytes = &'static [u8];

pub const DATA: &str = "data";
pub const INSERT_ORDER: &str = "insert_order";
pub const CONFIG: &str = "config";
pub const INDEX_PREFIX: &str = "index:";
pub const UNIQUE_PREFIX: &str = "unique:";

/// Key of the config entry within the config bucket.
pub const CONFIG_KEY: &[u8] = b"config";
/// Key of the options entry within the config bucket.
pub const OPTIONS_KEY: &[u8] = b"options";

pub(crate) const DATA_TABLE: TableDefinition<Bytes, Bytes> = TableDefinition::new(DATA);
pub(crate) const INSERT_ORDER_TABLE: TableDefinition<Bytes, Bytes> =
    TableDefinition::new(INSERT_ORDER);
pub(crate) const CONFIG_TABLE: TableDefinition<Bytes, Bytes> = TableDefinition::new(CONFIG);

pub fn index_name(field: &str) -> String {
    format!("{INDEX_PREFIX}{field}")
}

pub fn unique_name(field: &str) -> String {
    format!("{UNIQUE_PREFIX}{field}")
}

/// Definition for a bucket whose name is only known at runtime.
pub(crate) fn named(name: &str) -> TableDefinition<'_, Bytes, Bytes> {
    TableDefinition::new(name)
}
