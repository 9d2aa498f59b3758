//! Protocol layer: the transport-agnostic message model and the concrete
//! JSON-RPC 2.0 binding (§3, §4.4).

pub mod jsonrpc;

pub use jsonrpc::{JsonRpcError, RequestBatch, RequestMessage, ResponseBatch, ResponseMessage};
