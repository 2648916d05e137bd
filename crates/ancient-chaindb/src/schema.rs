//! Hot store key layout and typed accessors.
//!
//! ```text
//! "h" ++ num ++ "n"          canonical hash
//! "h" ++ num ++ hash         header
//! "h" ++ num ++ hash ++ "t"  total difficulty
//! "H" ++ hash                block number
//! "b" ++ num ++ hash         body
//! "r" ++ num ++ hash         receipts
//! "LastHeader" / "LastBlock" / "LastFast"   head hashes
//! ```
//!
//! `num` is the 8-byte big-endian block number.

use ancient_core::{AncientRecord, HASH_LENGTH};

use crate::error::Result;
use crate::kv::{KeyValueStore, WriteBatch};

pub const HEADER_PREFIX: &[u8] = b"h";
pub const HEADER_TD_SUFFIX: &[u8] = b"t";
pub const HEADER_HASH_SUFFIX: &[u8] = b"n";
pub const HEADER_NUMBER_PREFIX: &[u8] = b"H";
pub const BLOCK_BODY_PREFIX: &[u8] = b"b";
pub const BLOCK_RECEIPTS_PREFIX: &[u8] = b"r";

pub const HEAD_HEADER_KEY: &[u8] = b"LastHeader";
pub const HEAD_BLOCK_KEY: &[u8] = b"LastBlock";
pub const HEAD_FAST_BLOCK_KEY: &[u8] = b"LastFast";

pub fn encode_block_number(number: u64) -> [u8; 8] {
    number.to_be_bytes()
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

/// `"h" ++ num`, the prefix shared by every header-family key of a height.
pub fn header_key_prefix(number: u64) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &encode_block_number(number)])
}

pub fn header_key(number: u64, hash: &[u8]) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &encode_block_number(number), hash])
}

pub fn header_td_key(number: u64, hash: &[u8]) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &encode_block_number(number), hash, HEADER_TD_SUFFIX])
}

pub fn header_hash_key(number: u64) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &encode_block_number(number), HEADER_HASH_SUFFIX])
}

pub fn header_number_key(hash: &[u8]) -> Vec<u8> {
    concat(&[HEADER_NUMBER_PREFIX, hash])
}

pub fn block_body_key(number: u64, hash: &[u8]) -> Vec<u8> {
    concat(&[BLOCK_BODY_PREFIX, &encode_block_number(number), hash])
}

pub fn block_receipts_key(number: u64, hash: &[u8]) -> Vec<u8> {
    concat(&[BLOCK_RECEIPTS_PREFIX, &encode_block_number(number), hash])
}

pub fn read_canonical_hash(kv: &dyn KeyValueStore, number: u64) -> Result<Option<Vec<u8>>> {
    kv.get(&header_hash_key(number))
}

pub fn write_canonical_hash(kv: &dyn KeyValueStore, hash: &[u8], number: u64) -> Result<()> {
    kv.put(&header_hash_key(number), hash)
}

pub fn delete_canonical_hash(batch: &mut WriteBatch, number: u64) {
    batch.delete(header_hash_key(number));
}

/// Hashes of every header stored at `number`, canonical or not.
pub fn read_all_hashes(kv: &dyn KeyValueStore, number: u64) -> Result<Vec<Vec<u8>>> {
    let prefix = header_key_prefix(number);
    Ok(kv
        .keys_with_prefix(&prefix)?
        .into_iter()
        .filter(|key| key.len() == prefix.len() + HASH_LENGTH)
        .map(|key| key[prefix.len()..].to_vec())
        .collect())
}

pub fn read_header_number(kv: &dyn KeyValueStore, hash: &[u8]) -> Result<Option<u64>> {
    Ok(kv.get(&header_number_key(hash))?.and_then(|raw| {
        let bytes: [u8; 8] = raw.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }))
}

pub fn read_head_header_hash(kv: &dyn KeyValueStore) -> Result<Option<Vec<u8>>> {
    kv.get(HEAD_HEADER_KEY)
}

pub fn write_head_header_hash(kv: &dyn KeyValueStore, hash: &[u8]) -> Result<()> {
    kv.put(HEAD_HEADER_KEY, hash)
}

pub fn read_head_block_hash(kv: &dyn KeyValueStore) -> Result<Option<Vec<u8>>> {
    kv.get(HEAD_BLOCK_KEY)
}

pub fn write_head_block_hash(kv: &dyn KeyValueStore, hash: &[u8]) -> Result<()> {
    kv.put(HEAD_BLOCK_KEY, hash)
}

pub fn read_head_fast_block_hash(kv: &dyn KeyValueStore) -> Result<Option<Vec<u8>>> {
    kv.get(HEAD_FAST_BLOCK_KEY)
}

pub fn write_head_fast_block_hash(kv: &dyn KeyValueStore, hash: &[u8]) -> Result<()> {
    kv.put(HEAD_FAST_BLOCK_KEY, hash)
}

/// Number of the block a head pointer names, if both the pointer and the
/// number mapping exist.
pub fn read_head_number(
    kv: &dyn KeyValueStore,
    head: fn(&dyn KeyValueStore) -> Result<Option<Vec<u8>>>,
) -> Result<Option<u64>> {
    match head(kv)? {
        Some(hash) => read_header_number(kv, &hash),
        None => Ok(None),
    }
}

pub fn read_header(kv: &dyn KeyValueStore, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
    kv.get(&header_key(number, hash))
}

pub fn read_body(kv: &dyn KeyValueStore, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
    kv.get(&block_body_key(number, hash))
}

pub fn read_receipts(kv: &dyn KeyValueStore, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
    kv.get(&block_receipts_key(number, hash))
}

pub fn read_td(kv: &dyn KeyValueStore, hash: &[u8], number: u64) -> Result<Option<Vec<u8>>> {
    kv.get(&header_td_key(number, hash))
}

/// Blobs of one block as stored in the hot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub header: Vec<u8>,
    pub body: Vec<u8>,
    pub receipts: Vec<u8>,
    pub td: Vec<u8>,
}

/// Queue every entry of a block, including its number mapping. Does not
/// touch the canonical hash.
pub fn write_block(batch: &mut WriteBatch, number: u64, hash: &[u8], block: &StoredBlock) {
    batch.put(header_key(number, hash), block.header.clone());
    batch.put(header_td_key(number, hash), block.td.clone());
    batch.put(header_number_key(hash), encode_block_number(number).to_vec());
    batch.put(block_body_key(number, hash), block.body.clone());
    batch.put(block_receipts_key(number, hash), block.receipts.clone());
}

/// Queue deletion of a block's header, difficulty, body and receipts, keeping
/// the hash to number mapping.
pub fn delete_block_without_number(batch: &mut WriteBatch, hash: &[u8], number: u64) {
    batch.delete(header_key(number, hash));
    batch.delete(header_td_key(number, hash));
    batch.delete(block_body_key(number, hash));
    batch.delete(block_receipts_key(number, hash));
}

/// Queue deletion of every entry of a block.
pub fn delete_block(batch: &mut WriteBatch, hash: &[u8], number: u64) {
    delete_block_without_number(batch, hash, number);
    batch.delete(header_number_key(hash));
}

/// The canonical block at `number` as an ancient record, or `None` if any
/// part of it is missing.
pub fn read_ancient_record(kv: &dyn KeyValueStore, number: u64) -> Result<Option<AncientRecord>> {
    let Some(hash) = read_canonical_hash(kv, number)? else {
        return Ok(None);
    };
    let (Some(header), Some(body), Some(receipts), Some(td)) = (
        read_header(kv, &hash, number)?,
        read_body(kv, &hash, number)?,
        read_receipts(kv, &hash, number)?,
        read_td(kv, &hash, number)?,
    ) else {
        return Ok(None);
    };
    Ok(Some(AncientRecord {
        hash,
        header,
        body,
        receipts,
        td,
    }))
}
