//! Item kinds and kind-families.
//!
//! `Kind` is the only place where the wire names (`"hashes"`, `"headers"`,
//! `"bodies"`, `"receipts"`, `"diffs"`) are spelled out. Everything else
//! works with the enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FreezerError;

/// One of the five blobs stored for every item number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Hash,
    Header,
    Body,
    Receipts,
    Difficulty,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Hash,
        Kind::Header,
        Kind::Body,
        Kind::Receipts,
        Kind::Difficulty,
    ];

    /// Wire name used by the RPC namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Hash => "hashes",
            Kind::Header => "headers",
            Kind::Body => "bodies",
            Kind::Receipts => "receipts",
            Kind::Difficulty => "diffs",
        }
    }

    /// The chunk family this kind is stored in.
    pub fn family(&self) -> Family {
        match self {
            Kind::Hash => Family::Hashes,
            _ => Family::Blocks,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = FreezerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FreezerError::NotSupported(format!("unknown ancient kind {:?}", s)))
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Kinds are grouped into two chunk families with independent chunk sizes.
///
/// The four block-like kinds share one chunk per item range; hashes are small
/// and get their own, larger chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Blocks,
    Hashes,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Blocks, Family::Hashes];

    /// Object key prefix for chunks of this family.
    pub fn prefix(&self) -> &'static str {
        match self {
            Family::Blocks => "blocks",
            Family::Hashes => "hashes",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
