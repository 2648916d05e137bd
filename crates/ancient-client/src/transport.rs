//! Client transports
//!
//! A [`Transport`] moves one JSON-RPC request to the server and brings back its
//! response. Two variants exist, matching the server listeners:
//!
//! - [`HttpTransport`]: `POST` to the server URL via reqwest.
//! - [`IpcTransport`]: length-prefixed frames over a Unix socket. One
//!   request is in flight per connection; concurrent callers queue on a mutex.
//!   A connection is reused only after a clean exchange. A failed or
//!   cancelled call drops it and the next call dials again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ancient_core::codec::FrameCodec;
use ancient_core::rpc::{RpcRequest, RpcResponse};
use ancient_core::{FreezerError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

/// Default per-request timeout of the HTTP transport.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse>;

    /// Release the connection. Later calls fail with a transport error.
    async fn close(&self) -> Result<()>;
}

/// Connect to `endpoint`: an `http://` or `https://` URL, or a socket path
/// (optionally written `unix://<path>`).
pub async fn dial(endpoint: &str) -> Result<Arc<dyn Transport>> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Ok(Arc::new(HttpTransport::new(endpoint)?));
    }
    let path = endpoint.strip_prefix("unix://").unwrap_or(endpoint);
    Ok(Arc::new(IpcTransport::connect(path).await?))
}

pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").field("url", &self.url).finish()
    }
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FreezerError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FreezerError::Transport(format!("{} to {}: {}", request.method, self.url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FreezerError::Transport(format!(
                "{} failed with status {}: {}",
                request.method, status, body
            )));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| FreezerError::Codec(format!("invalid response to {}: {}", request.method, e)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct IpcTransport {
    path: PathBuf,
    framed: Mutex<Option<Framed<UnixStream, FrameCodec>>>,
    closed: AtomicBool,
}

impl fmt::Debug for IpcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcTransport").field("path", &self.path).finish()
    }
}

impl IpcTransport {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let framed = open_framed(&path).await?;
        tracing::debug!(path = %path.display(), "Connected IPC transport");
        Ok(Self {
            path,
            framed: Mutex::new(Some(framed)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn open_framed(path: &Path) -> Result<Framed<UnixStream, FrameCodec>> {
    let stream = UnixStream::connect(path).await.map_err(|e| {
        FreezerError::Transport(format!("failed to connect {}: {}", path.display(), e))
    })?;
    Ok(Framed::new(stream, FrameCodec::new()))
}

#[async_trait]
impl Transport for IpcTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        let payload = Bytes::from(serde_json::to_vec(&request)?);

        let mut slot = self.framed.lock().await;
        // Out of the slot for the whole exchange: if this future is dropped
        // midway, the connection goes with it instead of keeping an unread
        // reply for the next caller.
        let mut framed = match slot.take() {
            Some(framed) => framed,
            None if self.closed.load(Ordering::SeqCst) => {
                return Err(FreezerError::Transport("IPC transport is closed".to_string()));
            }
            None => {
                tracing::debug!(path = %self.path.display(), "Redialing IPC transport");
                open_framed(&self.path).await?
            }
        };

        framed.send(payload).await?;
        let frame = framed.next().await.ok_or_else(|| {
            FreezerError::Transport(format!(
                "server closed {} before answering",
                self.path.display()
            ))
        })??;
        let response: RpcResponse = serde_json::from_slice(&frame)?;
        if response.id != request.id {
            return Err(FreezerError::Transport(format!(
                "response id {} does not match request id {} of {}",
                response.id, request.id, request.method
            )));
        }

        *slot = Some(framed);
        Ok(response)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.framed.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn test_dial_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ipc");
        let err = dial(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, FreezerError::Transport(_)));
    }

    #[tokio::test]
    async fn test_dial_http_is_lazy() {
        let transport = dial("http://127.0.0.1:1").await.unwrap();
        assert!(format!("{:?}", transport).contains("HttpTransport"));
    }

    /// Answers every frame after `delay`, with results 5, 7, 9, ... in the
    /// order requests arrive.
    fn slow_server(path: &Path, delay: Duration) -> tokio::task::JoinHandle<()> {
        let listener = tokio::net::UnixListener::bind(path).unwrap();
        let next = Arc::new(AtomicU64::new(5));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let next = next.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, FrameCodec::new());
                    while let Some(Ok(frame)) = framed.next().await {
                        let request: RpcRequest = serde_json::from_slice(&frame).unwrap();
                        let result = next.fetch_add(2, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                        let response = RpcResponse::success(request.id, Value::from(result));
                        let bytes = Bytes::from(serde_json::to_vec(&response).unwrap());
                        if framed.send(bytes).await.is_err() {
                            break;
                        }
                    }
                });
            }
        })
    }

    #[tokio::test]
    async fn test_cancelled_call_does_not_leak_its_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.ipc");
        let server = slow_server(&path, Duration::from_millis(200));

        let transport = IpcTransport::connect(&path).await.unwrap();
        let first = tokio::time::timeout(
            Duration::from_millis(50),
            transport.call(RpcRequest::new(1, "freezer_ancients", Value::Null)),
        )
        .await;
        assert!(first.is_err());

        let response = transport
            .call(RpcRequest::new(2, "freezer_ancients", Value::Null))
            .await
            .unwrap();
        assert_eq!(response.id, Value::from(2));
        assert_eq!(response.result, Some(Value::from(7)));

        server.abort();
    }

    #[tokio::test]
    async fn test_closed_ipc_transport_stays_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.ipc");
        let server = slow_server(&path, Duration::from_millis(1));

        let transport = IpcTransport::connect(&path).await.unwrap();
        transport.close().await.unwrap();
        let err = transport
            .call(RpcRequest::new(1, "freezer_ancients", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, FreezerError::Transport(_)));

        server.abort();
    }

    #[tokio::test]
    async fn test_http_unreachable_is_transport_error() {
        let transport = HttpTransport::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = transport
            .call(RpcRequest::new(1, "freezer_ancients", Value::Null))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
