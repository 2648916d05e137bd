//! Local-socket transport
//!
//! A Unix domain socket carrying length-prefixed JSON-RPC payloads (see
//! [`ancient_core::codec`]). One task per connection; requests on a
//! connection are answered in order.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ancient_core::codec::FrameCodec;
use ancient_core::FreezerError;
use ancient_observability::metrics::CONNECTIONS_ACTIVE;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::api::FreezerApi;

/// Local-socket listener bound to a filesystem path.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    api: Arc<FreezerApi>,
}

impl IpcServer {
    /// Bind `path`, replacing a stale socket file left by a previous run.
    pub fn bind(path: impl Into<PathBuf>, api: Arc<FreezerApi>) -> std::io::Result<Self> {
        let path = path.into();
        if path.exists() {
            warn!(path = %path.display(), "Removing stale IPC socket");
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            listener,
            path,
            api,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` resolves, then remove the socket.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(path = %self.path.display(), "IPC RPC server listening");
        let next_id = AtomicU64::new(0);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let id = next_id.fetch_add(1, Ordering::Relaxed);
                            let api = self.api.clone();
                            tokio::spawn(async move {
                                CONNECTIONS_ACTIVE.inc();
                                match handle_connection(stream, id, api).await {
                                    Ok(()) => debug!(connection = id, "IPC connection closed"),
                                    Err(e) => warn!(connection = id, error = %e, "IPC connection error"),
                                }
                                CONNECTIONS_ACTIVE.dec();
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept IPC connection");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("IPC RPC server shutting down");
                    break;
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Could not remove IPC socket");
        }
        Ok(())
    }
}

#[instrument(skip(stream, api))]
async fn handle_connection(
    stream: UnixStream,
    connection: u64,
    api: Arc<FreezerApi>,
) -> Result<(), FreezerError> {
    debug!("New IPC connection");
    let mut framed = Framed::new(stream, FrameCodec::new());

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let response = api.handle_bytes(&frame).await;
        framed.send(Bytes::from(response)).await?;
    }
    Ok(())
}
