//! Byte encoding for everything the engine stores.
//!
//! Keys, indexed values, primary-key lists and table config go through
//! postcard, which produces the same bytes for equal values. `String` and
//! `&str` encode identically, so lookups may use borrowed values.
//!
//! Whole records are stored as JSON objects keyed by field name. A record
//! written before a field was added or removed still decodes: unknown names
//! are ignored and a missing field takes its `#[serde(default)]` value.
//!
//! Insertion sequence numbers are stored as raw 8-byte little-endian
//! integers.

use byteorder::{ByteOrder, LittleEndian};
use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Result};

/// Width of an encoded insertion sequence number.
pub const SEQUENCE_LEN: usize = 8;

/// Encodes any serializable value.
pub fn encode<V: Serialize + ?Sized>(value: &V) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(value)?)
}

/// Decodes a value previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Encodes a record for the data bucket.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(Error::Record)
}

/// Decodes a record from the data bucket.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(Error::Record)
}

pub(crate) fn encode_key_list(keys: &[Vec<u8>]) -> Result<Vec<u8>> {
    encode(keys)
}

pub(crate) fn decode_key_list(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    decode(bytes)
}

pub(crate) fn encode_sequence(seq: u64) -> [u8; SEQUENCE_LEN] {
    let mut buf = [0u8; SEQUENCE_LEN];
    LittleEndian::write_u64(&mut buf, seq);
    buf
}

pub(crate) fn decode_sequence(bytes: &[u8]) -> Result<u64> {
    if bytes.len() != SEQUENCE_LEN {
        return Err(Error::CorruptSequence(bytes.len()));
    }
    Ok(LittleEndian::read_u64(bytes))
}
