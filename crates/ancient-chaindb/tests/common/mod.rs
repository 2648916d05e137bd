#![allow(dead_code)]

use ancient_chaindb::schema::{self, StoredBlock};
use ancient_chaindb::{KeyValueStore, MemoryKv, WriteBatch};
use ancient_core::AncientRecord;

pub fn block_hash(number: u64) -> Vec<u8> {
    let mut hash = vec![0xaa; 24];
    hash.extend_from_slice(&number.to_be_bytes());
    hash
}

pub fn side_hash(number: u64) -> Vec<u8> {
    let mut hash = vec![0x5e; 24];
    hash.extend_from_slice(&number.to_be_bytes());
    hash
}

pub fn stored_block(number: u64) -> StoredBlock {
    let tagged = |tag: u8| {
        let mut blob = vec![tag];
        blob.extend_from_slice(&number.to_be_bytes());
        blob
    };
    StoredBlock {
        header: tagged(0xbb),
        body: tagged(0xcc),
        receipts: tagged(0xdd),
        td: tagged(0xee),
    }
}

pub fn record(number: u64) -> AncientRecord {
    let block = stored_block(number);
    AncientRecord {
        hash: block_hash(number),
        header: block.header,
        body: block.body,
        receipts: block.receipts,
        td: block.td,
    }
}

/// Write canonical blocks `range` and point every head at the last one.
pub fn populate(kv: &MemoryKv, range: std::ops::Range<u64>) {
    let mut batch = WriteBatch::new();
    let mut last = None;
    for number in range {
        let hash = block_hash(number);
        schema::write_block(&mut batch, number, &hash, &stored_block(number));
        batch.put(schema::header_hash_key(number), hash.clone());
        last = Some(hash);
    }
    kv.write(batch).unwrap();
    if let Some(head) = last {
        set_heads(kv, &head);
    }
}

pub fn set_heads(kv: &MemoryKv, hash: &[u8]) {
    schema::write_head_header_hash(kv, hash).unwrap();
    schema::write_head_block_hash(kv, hash).unwrap();
    schema::write_head_fast_block_hash(kv, hash).unwrap();
}

pub fn add_side_block(kv: &MemoryKv, number: u64) {
    let mut batch = WriteBatch::new();
    let mut block = stored_block(number);
    block.header[0] = 0x99;
    schema::write_block(&mut batch, number, &side_hash(number), &block);
    kv.write(batch).unwrap();
}

pub fn has_block_data(kv: &MemoryKv, number: u64, hash: &[u8]) -> bool {
    schema::read_header(kv, hash, number).unwrap().is_some()
        || schema::read_body(kv, hash, number).unwrap().is_some()
        || schema::read_receipts(kv, hash, number).unwrap().is_some()
        || schema::read_td(kv, hash, number).unwrap().is_some()
}
