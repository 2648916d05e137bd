//! Freezer Configuration
//!
//! - **block_group_size**: items per block-family chunk (default: 1024)
//! - **hash_group_size**: items per hash chunk (default: 32768)
//! - **encoding**: chunk payload encoding, `.json` or `.json.gz` (default: `.json.gz`)
//! - **read_only**: reject appends and truncations (default: false)
//! - **write_cache_chunks**: write cache high-water mark, in chunks (default: 32, min 2)
//! - **read_cache_chunks**: read cache capacity, in chunks (default: 2, min 2)
//!
//! Chunk sizes and encoding are fixed for the lifetime of a namespace:
//! reopening existing data with different values makes it unreadable.

use ancient_core::{Family, FreezerError, Result};
use serde::{Deserialize, Serialize};

use crate::codec::Encoding;

/// Largest chunk size whose item numbers still fit the 9-digit key layout
/// for a useful range.
pub const MAX_GROUP_SIZE: u64 = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezerConfig {
    #[serde(default = "default_block_group_size")]
    pub block_group_size: u64,

    #[serde(default = "default_hash_group_size")]
    pub hash_group_size: u64,

    #[serde(default)]
    pub encoding: Encoding,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default = "default_write_cache_chunks")]
    pub write_cache_chunks: usize,

    #[serde(default = "default_read_cache_chunks")]
    pub read_cache_chunks: usize,
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            block_group_size: default_block_group_size(),
            hash_group_size: default_hash_group_size(),
            encoding: Encoding::default(),
            read_only: false,
            write_cache_chunks: default_write_cache_chunks(),
            read_cache_chunks: default_read_cache_chunks(),
        }
    }
}

impl FreezerConfig {
    pub fn group_size(&self, family: Family) -> u64 {
        match family {
            Family::Blocks => self.block_group_size,
            Family::Hashes => self.hash_group_size,
        }
    }

    pub fn write_cache_capacity(&self, family: Family) -> usize {
        self.write_cache_chunks.max(2) * self.group_size(family) as usize
    }

    pub fn read_cache_capacity(&self, family: Family) -> usize {
        self.read_cache_chunks.max(2) * self.group_size(family) as usize
    }

    pub fn validate(&self) -> Result<()> {
        for family in Family::ALL {
            let size = self.group_size(family);
            if size == 0 || size > MAX_GROUP_SIZE {
                return Err(FreezerError::Fatal(format!(
                    "{} group size must be in 1..={}, got {}",
                    family, MAX_GROUP_SIZE, size
                )));
            }
        }
        Ok(())
    }
}

fn default_block_group_size() -> u64 {
    32 * 32
}

fn default_hash_group_size() -> u64 {
    32 * 32 * 32
}

fn default_write_cache_chunks() -> usize {
    32
}

fn default_read_cache_chunks() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FreezerConfig::default();
        assert_eq!(config.block_group_size, 1024);
        assert_eq!(config.hash_group_size, 32768);
        assert_eq!(config.encoding, Encoding::JsonGz);
        assert!(!config.read_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_capacity_floor() {
        let config = FreezerConfig {
            block_group_size: 8,
            write_cache_chunks: 0,
            read_cache_chunks: 1,
            ..Default::default()
        };
        assert_eq!(config.write_cache_capacity(Family::Blocks), 16);
        assert_eq!(config.read_cache_capacity(Family::Blocks), 16);
    }

    #[test]
    fn test_zero_group_rejected() {
        let config = FreezerConfig {
            hash_group_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: FreezerConfig = serde_json::from_str(r#"{"encoding": ".json"}"#).unwrap();
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.block_group_size, 1024);
        assert_eq!(config.write_cache_chunks, 32);
    }
}
