//! `freezer_*` JSON-RPC dispatcher
//!
//! Transport-agnostic: both the HTTP and the local-socket listener hand raw
//! request bytes to [`FreezerApi::handle_bytes`] and write back whatever it
//! returns. Parameters are positional, byte blobs travel as `0x` hex.
//!
//! ```text
//! freezer_hasAncient      [kind, n]                          -> bool
//! freezer_ancient         [kind, n]                          -> hex
//! freezer_ancientRange    [kind, start, count, maxBytes]     -> [hex]
//! freezer_ancients        []                                 -> uint64
//! freezer_ancientSize     [kind]                             -> uint64
//! freezer_appendAncient   [n, hash, header, body, receipts, td] -> null
//! freezer_truncateAncients [n]                               -> null
//! freezer_sync            []                                 -> null
//! freezer_close           []                                 -> null
//! ```

use std::str::FromStr;
use std::sync::Arc;

use ancient_core::hex::HexBytes;
use ancient_core::rpc::{methods, RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
use ancient_core::{AncientRecord, AncientStore, Kind};
use ancient_observability::metrics::{RPC_ERRORS_TOTAL, RPC_REQUESTS_TOTAL};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Dispatches `freezer_*` calls onto an [`AncientStore`].
pub struct FreezerApi {
    store: Arc<dyn AncientStore>,
}

impl FreezerApi {
    pub fn new(store: Arc<dyn AncientStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AncientStore> {
        &self.store
    }

    /// Handle one raw payload: a single request object or a batch array.
    pub async fn handle_bytes(&self, payload: &[u8]) -> Vec<u8> {
        let response = match serde_json::from_slice::<Value>(payload) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => to_value(RpcResponse::failure(
                Value::Null,
                RpcError::parse_error(format!("parse error: {}", e)),
            )),
        };
        serde_json::to_vec(&response).unwrap_or_default()
    }

    pub async fn handle_value(&self, value: Value) -> Value {
        match value {
            Value::Array(batch) if batch.is_empty() => to_value(RpcResponse::failure(
                Value::Null,
                RpcError::invalid_request("empty batch"),
            )),
            Value::Array(batch) => {
                let mut responses = Vec::with_capacity(batch.len());
                for entry in batch {
                    responses.push(to_value(self.handle_entry(entry).await));
                }
                Value::Array(responses)
            }
            single => to_value(self.handle_entry(single).await),
        }
    }

    async fn handle_entry(&self, entry: Value) -> RpcResponse {
        let id = entry.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<RpcRequest>(entry) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => self.call(request).await,
            Ok(request) => RpcResponse::failure(
                request.id,
                RpcError::invalid_request(format!(
                    "unsupported jsonrpc version {:?}",
                    request.jsonrpc
                )),
            ),
            Err(e) => RpcResponse::failure(id, RpcError::invalid_request(e.to_string())),
        }
    }

    /// Execute a decoded request.
    pub async fn call(&self, request: RpcRequest) -> RpcResponse {
        let label = metric_label(&request.method);
        RPC_REQUESTS_TOTAL.with_label_values(&[label]).inc();

        match self.dispatch(&request.method, request.params).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(error) => {
                let kind = error
                    .data
                    .as_ref()
                    .and_then(|data| data.get("kind"))
                    .and_then(Value::as_str)
                    .unwrap_or("rpc")
                    .to_string();
                RPC_ERRORS_TOTAL
                    .with_label_values(&[label, kind.as_str()])
                    .inc();
                tracing::debug!(
                    method = %request.method,
                    code = error.code,
                    error = %error.message,
                    "RPC call failed"
                );
                RpcResponse::failure(request.id, error)
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let params = Params::new(params)?;
        let store = &self.store;

        match method {
            methods::CLOSE => {
                // Acknowledged only; the shared freezer outlives its clients.
                tracing::debug!("Client requested close");
                Ok(Value::Null)
            }
            methods::HAS_ANCIENT => {
                let kind = params.kind(0)?;
                let number = params.get::<u64>(1, "number")?;
                Ok(Value::Bool(store.has_ancient(kind, number).await?))
            }
            methods::ANCIENT => {
                let kind = params.kind(0)?;
                let number = params.get::<u64>(1, "number")?;
                let blob = store.ancient(kind, number).await?;
                Ok(Value::String(ancient_core::hex::encode(&blob)))
            }
            methods::ANCIENT_RANGE => {
                let kind = params.kind(0)?;
                let start = params.get::<u64>(1, "start")?;
                let count = params.get::<u64>(2, "count")?;
                let max_bytes = params.get_or::<u64>(3, "maxBytes", 0)?;
                let blobs = store.ancient_range(kind, start, count, max_bytes).await?;
                Ok(Value::Array(
                    blobs
                        .iter()
                        .map(|blob| Value::String(ancient_core::hex::encode(blob)))
                        .collect(),
                ))
            }
            methods::ANCIENTS => Ok(Value::from(store.ancients().await?)),
            methods::ANCIENT_SIZE => {
                let kind = params.kind(0)?;
                Ok(Value::from(store.ancient_size(kind).await?))
            }
            methods::APPEND_ANCIENT => {
                let number = params.get::<u64>(0, "number")?;
                let record = AncientRecord {
                    hash: params.get::<HexBytes>(1, "hash")?.into_inner(),
                    header: params.get::<HexBytes>(2, "header")?.into_inner(),
                    body: params.get::<HexBytes>(3, "body")?.into_inner(),
                    receipts: params.get::<HexBytes>(4, "receipts")?.into_inner(),
                    td: params.get::<HexBytes>(5, "td")?.into_inner(),
                };
                store.append_ancient(number, record).await?;
                Ok(Value::Null)
            }
            methods::TRUNCATE_ANCIENTS => {
                let items = params.get::<u64>(0, "items")?;
                store.truncate_ancients(items).await?;
                Ok(Value::Null)
            }
            methods::SYNC => {
                store.sync().await?;
                Ok(Value::Null)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// Positional parameter list.
struct Params(Vec<Value>);

impl Params {
    fn new(params: Value) -> Result<Self, RpcError> {
        match params {
            Value::Null => Ok(Self(Vec::new())),
            Value::Array(values) => Ok(Self(values)),
            other => Err(RpcError::invalid_params(format!(
                "expected positional parameters, got {}",
                other
            ))),
        }
    }

    fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, RpcError> {
        let value = self.0.get(index).ok_or_else(|| {
            RpcError::invalid_params(format!("missing value for required argument {}", index))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            RpcError::invalid_params(format!("invalid argument {} ({}): {}", index, name, e))
        })
    }

    fn get_or<T: DeserializeOwned>(&self, index: usize, name: &str, default: T) -> Result<T, RpcError> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.get(index, name),
        }
    }

    /// Kind names outside the closed set are `not-supported`, not bad params.
    fn kind(&self, index: usize) -> Result<Kind, RpcError> {
        let name = self.get::<String>(index, "kind")?;
        Kind::from_str(&name).map_err(RpcError::from)
    }
}

fn metric_label(method: &str) -> &'static str {
    match method {
        methods::CLOSE => methods::CLOSE,
        methods::HAS_ANCIENT => methods::HAS_ANCIENT,
        methods::ANCIENT => methods::ANCIENT,
        methods::ANCIENT_RANGE => methods::ANCIENT_RANGE,
        methods::ANCIENTS => methods::ANCIENTS,
        methods::ANCIENT_SIZE => methods::ANCIENT_SIZE,
        methods::APPEND_ANCIENT => methods::APPEND_ANCIENT,
        methods::TRUNCATE_ANCIENTS => methods::TRUNCATE_ANCIENTS,
        methods::SYNC => methods::SYNC,
        _ => "unknown",
    }
}

fn to_value(response: RpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ancient_core::rpc::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
    use ancient_core::ErrorKind;
    use ancient_storage::MemoryAncientStore;
    use serde_json::json;

    fn api() -> FreezerApi {
        FreezerApi::new(Arc::new(MemoryAncientStore::new()))
    }

    async fn rpc(api: &FreezerApi, method: &str, params: Value) -> Value {
        let request = json!({"jsonrpc": "2.0", "id": 7, "method": method, "params": params});
        let raw = api.handle_bytes(request.to_string().as_bytes()).await;
        serde_json::from_slice(&raw).unwrap()
    }

    fn hash(n: u8) -> String {
        format!("0x{}", "ab".repeat(31)) + &format!("{:02x}", n)
    }

    async fn append(api: &FreezerApi, n: u64) -> Value {
        rpc(
            api,
            methods::APPEND_ANCIENT,
            json!([n, hash(n as u8), "0xbb", "0xcc", "0xdd", "0xee"]),
        )
        .await
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let api = api();
        let response = append(&api, 0).await;
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"], Value::Null);
        assert!(response.get("error").is_none());

        let response = rpc(&api, methods::ANCIENTS, json!([])).await;
        assert_eq!(response["result"], 1);

        let response = rpc(&api, methods::ANCIENT, json!(["headers", 0])).await;
        assert_eq!(response["result"], "0xbb");

        let response = rpc(&api, methods::ANCIENT, json!(["hashes", 0])).await;
        assert_eq!(response["result"], hash(0));

        let response = rpc(&api, methods::HAS_ANCIENT, json!(["diffs", 1])).await;
        assert_eq!(response["result"], false);
    }

    #[tokio::test]
    async fn test_ancient_range() {
        let api = api();
        for n in 0..3 {
            append(&api, n).await;
        }
        let response = rpc(&api, methods::ANCIENT_RANGE, json!(["bodies", 1, 5])).await;
        assert_eq!(response["result"], json!(["0xcc", "0xcc"]));
    }

    #[tokio::test]
    async fn test_freezer_errors_carry_kind() {
        let api = api();
        append(&api, 0).await;

        let response = rpc(&api, methods::ANCIENT, json!(["bodies", 5])).await;
        assert_eq!(response["error"]["code"], ErrorKind::OutOfBounds.code());
        assert_eq!(response["error"]["data"]["kind"], "out-of-bounds");
        assert_eq!(response["error"]["data"]["frozen"], 1);

        let response = append(&api, 4).await;
        assert_eq!(response["error"]["code"], ErrorKind::OutOfOrder.code());

        let response = rpc(&api, methods::ANCIENT, json!(["uncles", 0])).await;
        assert_eq!(response["error"]["code"], ErrorKind::NotSupported.code());
    }

    #[tokio::test]
    async fn test_bad_params() {
        let api = api();

        let response = rpc(&api, methods::ANCIENT, json!(["headers"])).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = rpc(
            &api,
            methods::APPEND_ANCIENT,
            json!([0, "abcd", "0xbb", "0xcc", "0xdd", "0xee"]),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = rpc(&api, methods::TRUNCATE_ANCIENTS, json!({"items": 1})).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = rpc(&api(), "freezer_migrateTable", json!([])).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_payloads() {
        let api = api();

        let raw = api.handle_bytes(b"{not json").await;
        let response: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);

        let raw = api.handle_bytes(br#"{"jsonrpc":"1.0","id":3,"method":"freezer_sync"}"#).await;
        let response: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
        assert_eq!(response["id"], 3);

        let raw = api.handle_bytes(b"[]").await;
        let response: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_batch() {
        let api = api();
        let batch = json!([
            {"jsonrpc": "2.0", "id": 1, "method": methods::ANCIENTS},
            {"jsonrpc": "2.0", "id": 2, "method": methods::SYNC, "params": []},
        ]);
        let raw = api.handle_bytes(batch.to_string().as_bytes()).await;
        let responses: Vec<Value> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"], 0);
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_close_keeps_store_open() {
        let api = api();
        let response = rpc(&api, methods::CLOSE, json!([])).await;
        assert_eq!(response["result"], Value::Null);

        let response = rpc(&api, methods::ANCIENTS, json!([])).await;
        assert_eq!(response["result"], 0);
    }
}
