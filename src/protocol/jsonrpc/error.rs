//! The JSON-RPC 2.0 error object and its predefined error codes (§7).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::registry::callback::{ApplicationError, DEFAULT_APPLICATION_ERROR_CODE};

/// Predefined JSON-RPC 2.0 error codes (§7). Only the codes this binding
/// actually produces are represented here; codes for concerns this crate
/// has no counterpart for (rate limiting, auth, cancellation) are omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// -32700: the server could not parse the request bytes as JSON.
    ParseError,
    /// -32600: the decoded envelope is not a valid Request object.
    InvalidRequest,
    /// -32601: no callback is registered under the requested method name.
    MethodNotFound,
    /// -32602: `params` is not an array, or an argument has the wrong shape.
    InvalidParams,
    /// -32603: the callback's result could not be serialized, or some other
    /// unexpected internal failure occurred.
    InternalError,
    /// A server-defined code, including the default application error
    /// (-32000) and any code an [`ApplicationError`] advertises.
    ServerError(i64),
}

impl ErrorCode {
    /// The numeric wire code.
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) => code,
        }
    }

    /// The default human-readable message for the predefined codes.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ServerError(_) => "Server error",
        }
    }
}

/// The JSON-RPC error object: `{code, message, data?}` (§3, §7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError, ErrorCode::ParseError.default_message())
    }

    pub fn invalid_request() -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            ErrorCode::InvalidRequest.default_message(),
        )
    }

    pub fn method_not_found() -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            ErrorCode::MethodNotFound.default_message(),
        )
    }

    /// A batch carried more elements than the server's configured limit
    /// (§5 shared-resource policy: `LimitsConfig::max_batch_size`).
    pub fn batch_too_large(len: usize, max: usize) -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            format!("batch has {len} elements, want at most {max}"),
        )
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, detail.into())
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, detail.into())
    }

    /// Translates an application error per §7: the message comes from
    /// `Display`, and code/data are consulted from the [`ApplicationError`]
    /// trait, falling back to the defaults it provides.
    ///
    /// When `debug` is set, the message is extended with the error's full
    /// source chain, for diagnostics.
    pub fn from_application_error(error: &dyn ApplicationError, debug: bool) -> Self {
        let mut message = error.to_string();
        if debug {
            let mut source = std::error::Error::source(error);
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
        }
        Self {
            code: error.rpc_code(),
            message,
            data: error.rpc_data(),
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for JsonRpcError {}
