//! Remote Freezer Client
//!
//! [`RemoteFreezer`] implements [`AncientStore`](ancient_core::AncientStore)
//! by forwarding each call to an `ancient-store` server, so code written
//! against the trait runs unchanged against an in-process freezer or a
//! remote one.
//!
//! ```ignore
//! let freezer = RemoteFreezer::dial("http://localhost:9797").await?;
//! let frozen = freezer.ancients().await?;
//! ```

pub mod remote;
pub mod transport;

pub use remote::RemoteFreezer;
pub use transport::{dial, HttpTransport, IpcTransport, Transport};
