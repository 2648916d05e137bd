//! Ancient Store Server
//!
//! Exposes an [`AncientStore`](ancient_core::AncientStore) under the
//! `freezer` JSON-RPC namespace over one of two transports:
//!
//! - **HTTP**: `POST /` carries JSON-RPC, `GET /metrics` and `GET /health`
//!   ride alongside.
//! - **IPC**: a Unix domain socket with length-prefixed frames.
//!
//! The transports are exclusive; [`config::Args::listen`] picks one.
//!
//! ```ignore
//! let freezer = Freezer::open(backend, FreezerConfig::default()).await?;
//! let api = Arc::new(FreezerApi::new(Arc::new(freezer)));
//! HttpServer::bind("127.0.0.1:9797", api).await?.run_until(shutdown).await?;
//! ```

pub mod api;
pub mod config;
pub mod http;
pub mod ipc;

pub use api::FreezerApi;
pub use config::{Args, BackendChoice, Listen};
pub use http::{router, HttpServer};
pub use ipc::IpcServer;
