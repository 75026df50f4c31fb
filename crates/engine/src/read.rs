/// Read path: `get()`, `get_index()`, `get_unique()` and `get_all()`.
///
/// Every query runs in a single KV read transaction and sees a consistent
/// snapshot. Index and unique buckets may reference primary keys whose
/// records are gone; such entries are skipped rather than reported, so a
/// stale index never turns into a read error.
///
/// Sorted reads order by insertion sequence. Note the direction convention:
/// `ascending = true` returns the most recently inserted records first.
use std::collections::BTreeMap;

use redb::{Database, ReadableTable};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::bucket::{self, Bytes, DATA_TABLE, INSERT_ORDER_TABLE};
use crate::{codec, Error, Record, Result, Table};

/// Options for multi-record reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Order results by insertion sequence. Ignored (with a warning) on
    /// tables created with sorting disabled.
    pub sorted: bool,
    /// With `sorted`, `true` means newest first and `false` oldest first.
    pub ascending: bool,
    /// Maximum number of records to return. `0` means no limit.
    pub max: usize,
}

impl GetOptions {
    /// Sorted by insertion sequence, newest first when `ascending` is `true`.
    #[must_use]
    pub fn sorted(ascending: bool) -> Self {
        Self {
            sorted: true,
            ascending,
            max: 0,
        }
    }

    #[must_use]
    pub fn max(self, max: usize) -> Self {
        Self { max, ..self }
    }

    fn has_room(&self, len: usize) -> bool {
        self.max == 0 || len < self.max
    }
}

/// Decodes the record stored under `primary_key`, if any.
pub(crate) fn lookup<T, D>(data: &D, primary_key: &[u8]) -> Result<Option<T>>
where
    T: Record,
    D: ReadableTable<Bytes, Bytes>,
{
    match data.get(primary_key)? {
        Some(value) => Ok(Some(codec::decode_record(value.value())?)),
        None => Ok(None),
    }
}

/// Primary keys listed under `value` in an index bucket that still have a
/// record in the data bucket, in list order.
pub(crate) fn live_keys<I, D>(index: &I, data: &D, value: &[u8]) -> Result<Vec<Vec<u8>>>
where
    I: ReadableTable<Bytes, Bytes>,
    D: ReadableTable<Bytes, Bytes>,
{
    let Some(list) = index.get(value)? else {
        return Ok(Vec::new());
    };
    let keys = codec::decode_key_list(list.value())?;

    let mut live = Vec::with_capacity(keys.len());
    for key in keys {
        if data.get(key.as_slice())?.is_some() {
            live.push(key);
        } else {
            debug!(key = ?key, "skipping index entry without data");
        }
    }
    Ok(live)
}

/// Insertion sequence of `primary_key`, if it has one.
pub(crate) fn sequence_of<O>(order: &O, primary_key: &[u8]) -> Result<Option<u64>>
where
    O: ReadableTable<Bytes, Bytes>,
{
    match order.get(primary_key)? {
        Some(seq) => Ok(Some(codec::decode_sequence(seq.value())?)),
        None => Ok(None),
    }
}

/// Orders `(sequence, item)` pairs. `ascending` puts the highest sequence
/// first.
fn order_by_sequence<X>(items: &mut [(u64, X)], ascending: bool) {
    if ascending {
        items.sort_by(|a, b| b.0.cmp(&a.0));
    } else {
        items.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

impl<T: Record> Table<T> {
    /// Whether a read asking for `options` should sort.
    fn sort_requested(&self, options: &GetOptions) -> bool {
        if options.sorted && !self.sorting_enabled() {
            warn!(table = %self.name, "sorted read on a table without sorting, returning unsorted");
            return false;
        }
        options.sorted
    }

    pub(crate) fn get<K: Serialize + ?Sized>(
        &self,
        db: &Database,
        primary_key: &K,
    ) -> Result<Option<T>> {
        let key = codec::encode(primary_key)?;
        let txn = db.begin_read()?;
        let data = txn.open_table(DATA_TABLE)?;
        lookup(&data, &key)
    }

    pub(crate) fn get_index<V: Serialize + ?Sized>(
        &self,
        db: &Database,
        field: &str,
        value: &V,
        options: GetOptions,
    ) -> Result<Vec<T>> {
        if !self.is_indexed(field) {
            error!(table = %self.name, field, "field is not indexed");
            return Err(Error::FieldNotIndexed(field.to_string()));
        }
        let value = codec::encode(value)?;
        let sorted = self.sort_requested(&options);

        let txn = db.begin_read()?;
        let data = txn.open_table(DATA_TABLE)?;
        let index_name = bucket::index_name(field);
        let index = txn.open_table(bucket::named(&index_name))?;

        let keys = live_keys(&index, &data, &value)?;
        if keys.is_empty() {
            debug!(table = %self.name, field, "index value returned no primary keys");
            return Ok(Vec::new());
        }

        let keys = if sorted {
            let order = txn.open_table(INSERT_ORDER_TABLE)?;
            let mut sequenced = Vec::with_capacity(keys.len());
            for key in keys {
                let seq = sequence_of(&order, &key)?.unwrap_or_default();
                sequenced.push((seq, key));
            }
            order_by_sequence(&mut sequenced, options.ascending);
            sequenced.into_iter().map(|(_, key)| key).collect()
        } else {
            keys
        };

        let mut records = Vec::new();
        for key in keys {
            if !options.has_room(records.len()) {
                break;
            }
            if let Some(record) = lookup(&data, &key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub(crate) fn get_unique<V: Serialize + ?Sized>(
        &self,
        db: &Database,
        field: &str,
        value: &V,
    ) -> Result<Option<T>> {
        if !self.is_unique(field) {
            error!(table = %self.name, field, "field is not unique");
            return Err(Error::FieldNotUnique(field.to_string()));
        }
        let value = codec::encode(value)?;

        let txn = db.begin_read()?;
        let unique_name = bucket::unique_name(field);
        let unique = txn.open_table(bucket::named(&unique_name))?;
        let Some(primary_key) = unique.get(value.as_slice())?.map(|pk| pk.value().to_vec()) else {
            debug!(table = %self.name, field, "unique value returned no primary key");
            return Ok(None);
        };

        let data = txn.open_table(DATA_TABLE)?;
        lookup(&data, &primary_key)
    }

    pub(crate) fn get_all(&self, db: &Database, options: GetOptions) -> Result<Vec<T>> {
        let sorted = self.sort_requested(&options);

        let txn = db.begin_read()?;
        let data = txn.open_table(DATA_TABLE)?;
        let mut records = Vec::new();

        if !sorted {
            // The scan always visits every entry; the cap only limits what
            // is collected.
            for entry in data.iter()? {
                let (_, value) = entry?;
                if options.has_room(records.len()) {
                    records.push(codec::decode_record(value.value())?);
                }
            }
            return Ok(records);
        }

        let order = txn.open_table(INSERT_ORDER_TABLE)?;
        let mut by_sequence = BTreeMap::new();
        for entry in order.iter()? {
            let (key, seq) = entry?;
            by_sequence.insert(codec::decode_sequence(seq.value())?, key.value().to_vec());
        }

        let mut sequenced: Vec<(u64, Vec<u8>)> = by_sequence.into_iter().collect();
        order_by_sequence(&mut sequenced, options.ascending);

        for (_, key) in sequenced {
            if !options.has_room(records.len()) {
                break;
            }
            if let Some(record) = lookup(&data, &key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
