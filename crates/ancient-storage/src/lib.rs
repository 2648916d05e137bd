//! Ancient Store Storage Layer
//!
//! This crate implements the freezer: the component that keeps immutable
//! historical chain data (hashes, headers, bodies, receipts, difficulties) in
//! object storage.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐
//! │ append / read /  │
//! │ sync / truncate  │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Freezer          │ ◄── frozen count, index marker, mutex
//! │ - write cache    │
//! │ - read cache     │
//! └────────┬─────────┘
//!          │ chunks (JSON, optionally gzip)
//!          ▼
//! ┌──────────────────┐
//! │ ObjectBackend    │ ◄── local fs / S3 / in-memory
//! └──────────────────┘
//! ```
//!
//! ## Main Components
//!
//! - [`Freezer`]: the chunked, object-backed store
//! - [`MemoryAncientStore`]: backend-less store for tests
//! - [`ChunkCodec`]: chunk payload encoding and object key layout
//! - [`WriteCache`] / [`ReadCache`]: per-family item caches
//! - [`ObjectBackend`]: the storage capability set, implemented by
//!   [`ObjectStoreBackend`]

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod freezer;
pub mod memory;

pub use backend::{BackendConfig, BackendKind, ObjectBackend, ObjectStoreBackend};
pub use cache::{ReadCache, WriteCache};
pub use codec::{ChunkCodec, Encoding, INDEX_MARKER_KEY};
pub use config::FreezerConfig;
pub use freezer::Freezer;
pub use memory::MemoryAncientStore;
