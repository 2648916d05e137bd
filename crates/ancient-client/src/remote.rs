use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ancient_core::hex::HexBytes;
use ancient_core::rpc::{methods, RpcRequest};
use ancient_core::{AncientRecord, AncientStore, FreezerError, Kind, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::transport::{dial, Transport};

/// [`AncientStore`] served by a remote freezer.
///
/// Every operation is one JSON-RPC call; errors come back with the kind the
/// server raised. Nothing is retried here: callers such as the freezing
/// pipeline decide what a transient failure means.
#[derive(Debug)]
pub struct RemoteFreezer {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
}

impl RemoteFreezer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// Dial `endpoint` (an HTTP URL or a socket path) and check that it
    /// answers by asking for the frozen count.
    pub async fn dial(endpoint: &str) -> Result<Self> {
        let remote = Self::new(dial(endpoint).await?);
        let frozen = remote.ancients().await?;
        tracing::info!(endpoint, frozen, "Connected to remote freezer");
        Ok(remote)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .transport
            .call(RpcRequest::new(id, method, params))
            .await?;
        if response.id != Value::from(id) {
            return Err(FreezerError::Transport(format!(
                "{} answered with id {}, expected {}",
                method, response.id, id
            )));
        }
        let result = response.into_result()?;
        serde_json::from_value(result)
            .map_err(|e| FreezerError::Codec(format!("unexpected result of {}: {}", method, e)))
    }
}

#[async_trait]
impl AncientStore for RemoteFreezer {
    async fn has_ancient(&self, kind: Kind, number: u64) -> Result<bool> {
        self.call(methods::HAS_ANCIENT, json!([kind, number])).await
    }

    async fn ancient(&self, kind: Kind, number: u64) -> Result<Vec<u8>> {
        let blob: HexBytes = self.call(methods::ANCIENT, json!([kind, number])).await?;
        Ok(blob.into_inner())
    }

    async fn ancient_range(
        &self,
        kind: Kind,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>> {
        let blobs: Vec<HexBytes> = self
            .call(
                methods::ANCIENT_RANGE,
                json!([kind, start, count, max_bytes]),
            )
            .await?;
        Ok(blobs.into_iter().map(HexBytes::into_inner).collect())
    }

    async fn ancients(&self) -> Result<u64> {
        self.call(methods::ANCIENTS, json!([])).await
    }

    async fn ancient_size(&self, kind: Kind) -> Result<u64> {
        self.call(methods::ANCIENT_SIZE, json!([kind])).await
    }

    async fn append_ancient(&self, number: u64, record: AncientRecord) -> Result<()> {
        let params = json!([
            number,
            HexBytes(record.hash),
            HexBytes(record.header),
            HexBytes(record.body),
            HexBytes(record.receipts),
            HexBytes(record.td),
        ]);
        self.call::<Value>(methods::APPEND_ANCIENT, params).await?;
        Ok(())
    }

    async fn truncate_ancients(&self, items: u64) -> Result<()> {
        self.call::<Value>(methods::TRUNCATE_ANCIENTS, json!([items]))
            .await?;
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        self.call::<Value>(methods::SYNC, json!([])).await?;
        Ok(())
    }

    /// Tell the server, then drop the connection. The server keeps serving
    /// other clients.
    async fn close(&self) -> Result<()> {
        let acknowledged = self.call::<Value>(methods::CLOSE, json!([])).await;
        self.transport.close().await?;
        acknowledged.map(|_| ())
    }
}
