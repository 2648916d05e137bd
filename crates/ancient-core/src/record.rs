use serde::{Deserialize, Serialize};

use crate::error::{FreezerError, Result};
use crate::hex::HexBytes;
use crate::kind::Kind;

/// Length of a canonical block hash.
pub const HASH_LENGTH: usize = 32;

/// The five co-numbered blobs of one item, as supplied to an append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncientRecord {
    pub hash: Vec<u8>,
    pub header: Vec<u8>,
    pub body: Vec<u8>,
    pub receipts: Vec<u8>,
    pub td: Vec<u8>,
}

impl AncientRecord {
    pub fn field(&self, kind: Kind) -> &[u8] {
        match kind {
            Kind::Hash => &self.hash,
            Kind::Header => &self.header,
            Kind::Body => &self.body,
            Kind::Receipts => &self.receipts,
            Kind::Difficulty => &self.td,
        }
    }

    /// Split into the typed items stored by the two chunk families.
    ///
    /// Fails with `InvalidRecord` if the hash is not exactly [`HASH_LENGTH`]
    /// bytes.
    pub fn into_items(self) -> Result<(HashItem, BlockItem)> {
        let hash = HashItem::new(self.hash)?;
        let block = BlockItem {
            header: self.header.into(),
            body: self.body.into(),
            receipts: self.receipts.into(),
            td: self.td.into(),
        };
        Ok((hash, block))
    }
}

/// Block-family item: header, body, receipts and total difficulty of one
/// block number. Serialized as one JSON object inside a block chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockItem {
    pub header: HexBytes,
    pub body: HexBytes,
    pub receipts: HexBytes,
    pub td: HexBytes,
}

impl BlockItem {
    /// The blob for `kind`, or `None` for kinds outside the block family.
    pub fn field(&self, kind: Kind) -> Option<&[u8]> {
        match kind {
            Kind::Header => Some(&self.header),
            Kind::Body => Some(&self.body),
            Kind::Receipts => Some(&self.receipts),
            Kind::Difficulty => Some(&self.td),
            Kind::Hash => None,
        }
    }
}

/// Hash-family item: the canonical hash of one block number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HexBytes", into = "HexBytes")]
pub struct HashItem(Vec<u8>);

impl HashItem {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != HASH_LENGTH {
            return Err(FreezerError::InvalidRecord(format!(
                "hash must be {} bytes, got {}",
                HASH_LENGTH,
                bytes.len()
            )));
        }
        Ok(HashItem(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<HexBytes> for HashItem {
    type Error = FreezerError;

    fn try_from(value: HexBytes) -> Result<Self> {
        HashItem::new(value.into_inner())
    }
}

impl From<HashItem> for HexBytes {
    fn from(item: HashItem) -> Self {
        HexBytes(item.0)
    }
}
