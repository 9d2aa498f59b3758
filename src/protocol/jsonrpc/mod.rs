//! JSON-RPC 2.0 concrete binding (§4.4).
//!
//! [`types`] carries the wire-level data model, [`error`] the predefined
//! error object and codes, [`codec`] framing/parsing/marshaling and
//! positional parameter decoding, [`http`] the HTTP transport's header
//! validation, and [`handler`] the request-batch dispatch that ties them to
//! a [`crate::registry::Registry`].

pub mod codec;
pub mod error;
pub mod handler;
pub mod http;
pub mod types;

pub use codec::{
    decode_positional_params, enforce_max_batch_size, marshal_request_batch,
    marshal_response_batch, parse_request_envelope, parse_response_envelope, FrameError,
    IncomingRequest, JsonRpcFrameCodec, ParsedEnvelope, StreamClientCodec, StreamServerCodec,
};
pub use error::{ErrorCode, JsonRpcError};
pub use handler::dispatch_batch;
pub use types::{
    Id, MessageBatch, RawId, RequestBatch, RequestMessage, ResponseBatch, ResponseMessage,
    JSONRPC_VERSION,
};
