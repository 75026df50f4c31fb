/// Write path: `add()`, the delete family, `update()` and `delete_all()`.
///
/// Each public mutation runs in exactly one KV write transaction, so a failed
/// call leaves no partial state behind. The `*_in` helpers take an open
/// transaction and never commit, which lets `update()` combine a delete and
/// an add into one atomic step.
use redb::{Database, ReadableTable, WriteTransaction};
use serde::Serialize;
use tracing::{debug, warn};

use crate::bucket::{self, Bytes, DATA_TABLE, INSERT_ORDER_TABLE};
use crate::config::Config;
use crate::read::{lookup, sequence_of};
use crate::tx::write_txn;
use crate::{codec, Error, Record, Result, Table};

type Bucket<'txn> = redb::Table<'txn, Bytes, Bytes>;

/// Removes `key` from the primary-key list stored under `value`.
///
/// Returns `false` if the list does not exist or does not contain `key`.
/// An emptied list is removed.
fn remove_from_list(index: &mut Bucket<'_>, value: &[u8], key: &[u8]) -> Result<bool> {
    let keys = match index.get(value)? {
        Some(list) => codec::decode_key_list(list.value())?,
        None => return Ok(false),
    };
    let before = keys.len();
    let remaining: Vec<Vec<u8>> = keys.into_iter().filter(|k| k != key).collect();
    if remaining.len() == before {
        return Ok(false);
    }
    store_list(index, value, &remaining)?;
    Ok(true)
}

/// Removes `key` from every list in the bucket.
fn purge_key(index: &mut Bucket<'_>, key: &[u8]) -> Result<()> {
    let mut updates = Vec::new();
    for entry in index.iter()? {
        let (value, list) = entry?;
        let keys = codec::decode_key_list(list.value())?;
        if keys.iter().any(|k| k == key) {
            let remaining: Vec<Vec<u8>> = keys.into_iter().filter(|k| k != key).collect();
            updates.push((value.value().to_vec(), remaining));
        }
    }
    for (value, remaining) in updates {
        store_list(index, &value, &remaining)?;
    }
    Ok(())
}

fn store_list(index: &mut Bucket<'_>, value: &[u8], keys: &[Vec<u8>]) -> Result<()> {
    if keys.is_empty() {
        index.remove(value)?;
    } else {
        index.insert(value, codec::encode_key_list(keys)?.as_slice())?;
    }
    Ok(())
}

impl<T: Record> Table<T> {
    pub(crate) fn add(&self, db: &Database, record: &T) -> Result<()> {
        write_txn(db, |txn| self.add_in(txn, record))
    }

    fn add_in(&self, txn: &WriteTransaction, record: &T) -> Result<()> {
        let key = self.primary_key_bytes(record)?;

        let mut data = txn.open_table(DATA_TABLE)?;
        if data.get(key.as_slice())?.is_some() {
            debug!(table = %self.name, "primary key already present");
            return Err(Error::DuplicatePrimaryKey);
        }

        for field in &self.schema.indexes {
            let value = self.field_bytes(record, field)?;
            let name = bucket::index_name(field);
            let mut index = txn.open_table(bucket::named(&name))?;
            let mut keys = match index.get(value.as_slice())? {
                Some(list) => codec::decode_key_list(list.value())?,
                None => Vec::new(),
            };
            keys.push(key.clone());
            index.insert(value.as_slice(), codec::encode_key_list(&keys)?.as_slice())?;
        }

        for field in &self.schema.uniques {
            let value = self.field_bytes(record, field)?;
            let name = bucket::unique_name(field);
            let mut unique = txn.open_table(bucket::named(&name))?;
            let holder = unique.get(value.as_slice())?.map(|pk| pk.value().to_vec());
            if let Some(holder) = holder {
                if data.get(holder.as_slice())?.is_some() {
                    debug!(table = %self.name, field = %field, "unique value already taken");
                    return Err(Error::DuplicateUnique(field.clone()));
                }
                warn!(table = %self.name, field = %field, "replacing orphaned unique entry");
            }
            unique.insert(value.as_slice(), key.as_slice())?;
        }

        if self.sorting_enabled() {
            let mut config = Config::load(txn)?;
            let seq = config
                .last_insert_index
                .checked_add(1)
                .ok_or(Error::SequenceOverflow)?;
            let mut order = txn.open_table(INSERT_ORDER_TABLE)?;
            order.insert(key.as_slice(), codec::encode_sequence(seq).as_slice())?;
            config.last_insert_index = seq;
            config.save(txn)?;
        }

        data.insert(key.as_slice(), codec::encode_record(record)?.as_slice())?;
        Ok(())
    }

    pub(crate) fn delete(&self, db: &Database, record: &T) -> Result<()> {
        write_txn(db, |txn| {
            let key = self.primary_key_bytes(record)?;
            self.delete_in(txn, &key, Some(record))
        })
    }

    /// Deletes the record stored under `key` and its index entries.
    ///
    /// Index values come from the stored record when there is one, falling
    /// back to `given`. With neither, nothing happens.
    fn delete_in(&self, txn: &WriteTransaction, key: &[u8], given: Option<&T>) -> Result<()> {
        let mut data = txn.open_table(DATA_TABLE)?;
        let stored: Option<T> = lookup(&data, key)?;
        let Some(record) = stored.as_ref().or(given) else {
            debug!(table = %self.name, "nothing to delete");
            return Ok(());
        };
        data.remove(key)?;

        for field in &self.schema.indexes {
            let value = self.field_bytes(record, field)?;
            let name = bucket::index_name(field);
            let mut index = txn.open_table(bucket::named(&name))?;
            if !remove_from_list(&mut index, &value, key)? {
                debug!(table = %self.name, field = %field, "index value moved, scanning bucket");
                purge_key(&mut index, key)?;
            }
        }

        for field in &self.schema.uniques {
            let value = self.field_bytes(record, field)?;
            let name = bucket::unique_name(field);
            let mut unique = txn.open_table(bucket::named(&name))?;
            let owned = unique
                .get(value.as_slice())?
                .is_some_and(|pk| pk.value() == key);
            if owned {
                unique.remove(value.as_slice())?;
            }
        }

        if self.sorting_enabled() {
            let mut order = txn.open_table(INSERT_ORDER_TABLE)?;
            order.remove(key)?;
        }

        Ok(())
    }

    pub(crate) fn delete_primary_key<K: Serialize + ?Sized>(
        &self,
        db: &Database,
        primary_key: &K,
    ) -> Result<()> {
        let key = codec::encode(primary_key)?;
        write_txn(db, |txn| self.delete_in(txn, &key, None))
    }

    pub(crate) fn delete_unique<V: Serialize + ?Sized>(
        &self,
        db: &Database,
        field: &str,
        value: &V,
    ) -> Result<()> {
        if !self.is_unique(field) {
            return Err(Error::FieldNotUnique(field.to_string()));
        }
        let value = codec::encode(value)?;
        let name = bucket::unique_name(field);

        write_txn(db, |txn| {
            let key = {
                let unique = txn.open_table(bucket::named(&name))?;
                let key = unique.get(value.as_slice())?.map(|pk| pk.value().to_vec());
                key
            };
            match key {
                Some(key) => self.delete_in(txn, &key, None),
                None => Ok(()),
            }
        })
    }

    pub(crate) fn delete_all_index<V: Serialize + ?Sized>(
        &self,
        db: &Database,
        field: &str,
        value: &V,
    ) -> Result<()> {
        if !self.is_indexed(field) {
            return Err(Error::FieldNotIndexed(field.to_string()));
        }
        let value = codec::encode(value)?;
        let name = bucket::index_name(field);

        write_txn(db, |txn| {
            let keys = {
                let index = txn.open_table(bucket::named(&name))?;
                let keys = match index.get(value.as_slice())? {
                    Some(list) => codec::decode_key_list(list.value())?,
                    None => Vec::new(),
                };
                keys
            };
            debug!(table = %self.name, field, count = keys.len(), "deleting by index");
            for key in &keys {
                self.delete_in(txn, key, None)?;
            }
            // Keys without a record are not reached by delete_in.
            let mut index = txn.open_table(bucket::named(&name))?;
            index.remove(value.as_slice())?;
            Ok(())
        })
    }

    pub(crate) fn delete_all(&self, db: &Database) -> Result<()> {
        write_txn(db, |txn| {
            txn.delete_table(DATA_TABLE)?;
            txn.open_table(DATA_TABLE)?;

            if self.sorting_enabled() {
                txn.delete_table(INSERT_ORDER_TABLE)?;
                txn.open_table(INSERT_ORDER_TABLE)?;
            }

            let buckets = self
                .schema
                .indexes
                .iter()
                .map(|f| bucket::index_name(f))
                .chain(self.schema.uniques.iter().map(|f| bucket::unique_name(f)));
            for name in buckets {
                let definition = bucket::named(&name);
                txn.delete_table(definition)?;
                txn.open_table(definition)?;
            }

            let mut config = Config::load(txn)?;
            config.last_insert_index = 0;
            config.save(txn)?;

            debug!(table = %self.name, "table emptied");
            Ok(())
        })
    }

    pub(crate) fn update(&self, db: &Database, record: &T) -> Result<()> {
        write_txn(db, |txn| {
            let key = self.primary_key_bytes(record)?;

            let exists = {
                let data = txn.open_table(DATA_TABLE)?;
                let exists = data.get(key.as_slice())?.is_some();
                exists
            };
            if !exists {
                debug!(table = %self.name, "record absent, adding");
                return self.add_in(txn, record);
            }

            let previous = if self.sorting_enabled() {
                let order = txn.open_table(INSERT_ORDER_TABLE)?;
                let seq = sequence_of(&order, &key)?;
                seq
            } else {
                None
            };

            self.delete_in(txn, &key, None)?;
            self.add_in(txn, record)?;

            // Put the record back at its previous position and give back the
            // sequence number add_in consumed.
            if let Some(seq) = previous {
                let mut order = txn.open_table(INSERT_ORDER_TABLE)?;
                order.insert(key.as_slice(), codec::encode_sequence(seq).as_slice())?;
                let mut config = Config::load(txn)?;
                config.last_insert_index = config.last_insert_index.saturating_sub(1);
                config.save(txn)?;
            }
            Ok(())
        })
    }
}
