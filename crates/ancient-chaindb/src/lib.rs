//! Ancient Chain Database
//!
//! The hot side of the remote ancient store: a key-value store of recent
//! blocks, the pipeline that migrates final blocks into a freezer, and the
//! composer that serves both as one database.
//!
//! The freezer is any [`AncientStore`](ancient_core::AncientStore), usually a
//! `RemoteFreezer` talking to an `ancient-store` server.

pub mod composer;
pub mod error;
pub mod kv;
pub mod pipeline;
pub mod schema;

pub use composer::{reconcile, truncate_kv_to_freezer, ChainDb, ChainDbConfig, Reconciliation};
pub use error::{ChainDbError, Result};
pub use kv::{KeyValueStore, MemoryKv, WriteBatch};
pub use pipeline::{BatchOutcome, FreezingPipeline, PipelineConfig, PipelineHandle};
pub use schema::StoredBlock;
