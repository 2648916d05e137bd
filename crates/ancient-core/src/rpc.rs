//! JSON-RPC 2.0 envelopes for the `freezer` namespace.
//!
//! Numbers travel as plain JSON numbers, byte blobs as `0x`-prefixed hex
//! strings. Freezer errors travel in the `error` member with one of the codes
//! from [`ErrorKind::code`] and a structured `data` member, which lets the
//! client rebuild the exact [`FreezerError`] variant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, FreezerError};

pub const JSONRPC_VERSION: &str = "2.0";

/// Method namespace served by the freezer service.
pub const NAMESPACE: &str = "freezer";

pub mod methods {
    pub const CLOSE: &str = "freezer_close";
    pub const HAS_ANCIENT: &str = "freezer_hasAncient";
    pub const ANCIENT: &str = "freezer_ancient";
    pub const ANCIENT_RANGE: &str = "freezer_ancientRange";
    pub const ANCIENTS: &str = "freezer_ancients";
    pub const ANCIENT_SIZE: &str = "freezer_ancientSize";
    pub const APPEND_ANCIENT: &str = "freezer_appendAncient";
    pub const TRUNCATE_ANCIENTS: &str = "freezer_truncateAncients";
    pub const SYNC: &str = "freezer_sync";
}

// Codes reserved by the JSON-RPC 2.0 specification.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::from(id),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// The call outcome. A missing `result` on success means JSON `null`.
    pub fn into_result(self) -> Result<Value, FreezerError> {
        match self.error {
            Some(error) => Err(error.into_freezer_error()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Structured `data` member of a freezer error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            format!("the method {} does not exist/is not available", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// Rebuild the freezer error this RPC error was encoded from.
    pub fn into_freezer_error(self) -> FreezerError {
        let data: ErrorData = self
            .data
            .and_then(|data| serde_json::from_value(data).ok())
            .unwrap_or_default();
        let kind = data.kind.or_else(|| ErrorKind::from_code(self.code));
        let detail = data.detail.unwrap_or_else(|| self.message.clone());

        match kind {
            Some(ErrorKind::OutOfBounds) => FreezerError::OutOfBounds {
                number: data.number.unwrap_or_default(),
                frozen: data.frozen.unwrap_or_default(),
            },
            Some(ErrorKind::OutOfOrder) => FreezerError::OutOfOrder {
                number: data.number.unwrap_or_default(),
                frozen: data.frozen.unwrap_or_default(),
            },
            Some(ErrorKind::NotSupported) => FreezerError::NotSupported(detail),
            Some(ErrorKind::NotFound) => FreezerError::NotFound(detail),
            Some(ErrorKind::Transient) => FreezerError::Transient(detail),
            Some(ErrorKind::Fatal) => FreezerError::Fatal(detail),
            Some(ErrorKind::ReadOnly) => FreezerError::ReadOnly,
            Some(ErrorKind::Closed) => FreezerError::Closed,
            Some(ErrorKind::InvalidRecord) => FreezerError::InvalidRecord(detail),
            Some(ErrorKind::Codec) => FreezerError::Codec(detail),
            Some(ErrorKind::Transport) => FreezerError::Transport(detail),
            None => match self.code {
                METHOD_NOT_FOUND => FreezerError::NotSupported(self.message),
                INVALID_PARAMS => FreezerError::Codec(self.message),
                code => FreezerError::Transport(format!("rpc error {}: {}", code, self.message)),
            },
        }
    }
}

impl From<&FreezerError> for RpcError {
    fn from(err: &FreezerError) -> Self {
        let kind = err.kind();
        let mut data = ErrorData {
            kind: Some(kind),
            ..Default::default()
        };
        match err {
            FreezerError::OutOfBounds { number, frozen }
            | FreezerError::OutOfOrder { number, frozen } => {
                data.number = Some(*number);
                data.frozen = Some(*frozen);
            }
            FreezerError::NotSupported(detail)
            | FreezerError::NotFound(detail)
            | FreezerError::Transient(detail)
            | FreezerError::Fatal(detail)
            | FreezerError::InvalidRecord(detail)
            | FreezerError::Codec(detail)
            | FreezerError::Transport(detail) => data.detail = Some(detail.clone()),
            FreezerError::ReadOnly | FreezerError::Closed => {}
        }
        Self {
            code: kind.code(),
            message: err.to_string(),
            data: serde_json::to_value(data).ok(),
        }
    }
}

impl From<FreezerError> for RpcError {
    fn from(err: FreezerError) -> Self {
        RpcError::from(&err)
    }
}
