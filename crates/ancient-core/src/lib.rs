//! Ancient Store Core Types
//!
//! Shared vocabulary for every crate of the remote ancient store: the closed
//! set of item kinds, the typed records kept per kind-family, the error
//! taxonomy, the `AncientStore` contract, and the JSON-RPC wire format used
//! between the freezer service and its remote clients.

pub mod codec;
pub mod error;
pub mod hex;
pub mod kind;
pub mod record;
pub mod rpc;
pub mod store;

pub use error::{ErrorKind, FreezerError, Result};
pub use kind::{Family, Kind};
pub use record::{AncientRecord, BlockItem, HashItem, HASH_LENGTH};
pub use store::AncientStore;
