//! Chunk Codec
//!
//! A chunk is a JSON array of like-family items, optionally wrapped in one
//! gzip stream at maximum compression. The encoding is part of the object key
//! (`.json` / `.json.gz`), so a reader never has to sniff payloads.
//!
//! ## Object keys
//!
//! ```text
//! index-marker                 ASCII-decimal frozen count
//! blocks/000001024.json.gz     block chunk starting at item 1024
//! hashes/000000000.json.gz     hash chunk starting at item 0
//! ```
//!
//! The codec is item-agnostic: callers pick the item type when decoding.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use ancient_core::{Family, FreezerError, Result};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key of the object holding the durable frozen count.
pub const INDEX_MARKER_KEY: &str = "index-marker";

/// Chunk payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    Json,
    #[default]
    JsonGz,
}

impl Encoding {
    /// Object key suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Encoding::Json => ".json",
            Encoding::JsonGz => ".json.gz",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Encoding {
    type Err = FreezerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches('.') {
            "json" => Ok(Encoding::Json),
            "json.gz" => Ok(Encoding::JsonGz),
            other => Err(FreezerError::NotSupported(format!(
                "unknown chunk encoding {:?} (expected .json or .json.gz)",
                other
            ))),
        }
    }
}

impl Serialize for Encoding {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.suffix())
    }
}

impl<'de> Deserialize<'de> for Encoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Encodes and decodes chunk payloads and names their objects.
#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    encoding: Encoding,
}

impl ChunkCodec {
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Object key of the chunk of `family` starting at item `start`.
    pub fn chunk_key(&self, family: Family, start: u64) -> String {
        format!("{}/{:09}{}", family.prefix(), start, self.encoding.suffix())
    }

    /// Chunk start number encoded in `key`, if `key` names a chunk of `family`.
    pub fn parse_chunk_key(family: Family, key: &str) -> Option<u64> {
        let rest = key.strip_prefix(family.prefix())?.strip_prefix('/')?;
        let end = rest.find('.').unwrap_or(rest.len());
        let digits = &rest[..end];
        if digits.len() < 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn encode<T: Serialize>(&self, items: &[T]) -> Result<Bytes> {
        let json = serde_json::to_vec(items)?;
        match self.encoding {
            Encoding::Json => Ok(Bytes::from(json)),
            Encoding::JsonGz => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
                encoder
                    .write_all(&json)
                    .map_err(|e| FreezerError::Codec(format!("gzip encode: {}", e)))?;
                let compressed = encoder
                    .finish()
                    .map_err(|e| FreezerError::Codec(format!("gzip encode: {}", e)))?;
                Ok(Bytes::from(compressed))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<Vec<T>> {
        match self.encoding {
            Encoding::Json => Ok(serde_json::from_slice(payload)?),
            Encoding::JsonGz => {
                let mut json = Vec::new();
                GzDecoder::new(payload)
                    .read_to_end(&mut json)
                    .map_err(|e| FreezerError::Codec(format!("gzip decode: {}", e)))?;
                Ok(serde_json::from_slice(&json)?)
            }
        }
    }
}
