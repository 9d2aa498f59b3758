//! Wire framing, envelope parsing, and positional parameter decoding (§4.2,
//! §4.4).
//!
//! The byte-level framing here reads one complete top-level JSON value off a
//! byte stream at a time, with no length prefix, using `serde_json`'s own
//! incremental deserializer to find the frame boundary. Everything above
//! that — batch/single detection, the authoritative `batch` flag, the
//! placeholder-on-decode-failure behavior for individual batch elements —
//! is pure and independently testable, free of any actual I/O.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::error::JsonRpcError;
use super::types::{
    normalize_raw_id, RequestBatch, RequestMessage, ResponseBatch, ResponseMessage,
    JSONRPC_VERSION,
};

/// A framing-level failure: the transport itself broke, or the byte stream
/// could not be split into JSON values at all. Distinct from a well-formed
/// JSON value that simply isn't a valid JSON-RPC envelope (§7's Parse
/// trigger is reserved for that latter, content-level case).
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits incoming bytes into one complete top-level JSON value per frame,
/// skipping insignificant whitespace between values (§4.4).
pub struct JsonRpcFrameCodec;

fn is_insignificant_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

impl Decoder for JsonRpcFrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(b) = buf.first() {
            if is_insignificant_ws(*b) {
                buf.advance(1);
            } else {
                break;
            }
        }
        if buf.is_empty() {
            return Ok(None);
        }

        let consumed = {
            let mut stream = serde_json::Deserializer::from_slice(&buf[..]).into_iter::<&RawValue>();
            match stream.next() {
                Some(Ok(_)) => stream.byte_offset(),
                Some(Err(e)) if e.is_eof() => return Ok(None),
                Some(Err(e)) => {
                    return Err(FrameError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e,
                    )))
                }
                None => return Ok(None),
            }
        };

        Ok(Some(buf.split_to(consumed).freeze()))
    }
}

impl Encoder<Bytes> for JsonRpcFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// The outcome of parsing one frame's bytes as a request envelope.
pub enum ParsedEnvelope {
    /// A well-formed (or tolerably malformed, per-element) request batch.
    Requests(RequestBatch),
    /// The envelope itself could not be interpreted as a request at all
    /// (unparsable JSON, a bare scalar, or an empty batch array); the
    /// caller responds immediately with this error and id `null`, without
    /// ever reaching the handler (§4.3, §4.4, §8 scenario 5).
    Immediate(JsonRpcError),
}

/// Mirrors the wire shape of a request object, with every field optional so
/// malformed input can still be partially inspected (e.g. to echo an id).
#[derive(Debug, Default, Deserialize)]
struct WireRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Box<RawValue>>,
    #[serde(default)]
    id: Option<Box<RawValue>>,
}

fn decode_single_request(raw: &RawValue) -> RequestMessage {
    match serde_json::from_str::<WireRequest>(raw.get()) {
        Ok(wire) if wire.jsonrpc.as_deref() == Some(JSONRPC_VERSION) => RequestMessage {
            id: normalize_raw_id(wire.id),
            method: wire.method.unwrap_or_default(),
            params: wire.params,
        },
        // Decoded as an object, but the wrong jsonrpc version (or none at
        // all): keep any id we did manage to parse and clear the method so
        // the handler treats it as "valid id, unusable shape" (§4.3).
        Ok(wire) => RequestMessage {
            id: normalize_raw_id(wire.id),
            method: String::new(),
            params: None,
        },
        Err(_) => RequestMessage::placeholder(),
    }
}

/// Parses one decoded top-level JSON frame's raw bytes into a request
/// batch (§4.4). `bytes` is assumed to already be one complete, syntactically
/// valid JSON value — `JsonRpcFrameCodec` guarantees this for stream
/// transports; the HTTP binding calls this directly on a full request body
/// instead, so malformed JSON is handled here too.
pub fn parse_request_envelope(bytes: &[u8]) -> ParsedEnvelope {
    let raw: Box<RawValue> = match serde_json::from_slice(bytes) {
        Ok(r) => r,
        Err(_) => return ParsedEnvelope::Immediate(JsonRpcError::parse_error()),
    };

    let text = raw.get().trim_start();
    if text.starts_with('[') {
        let elements: Vec<Box<RawValue>> = match serde_json::from_str(raw.get()) {
            Ok(v) => v,
            Err(_) => return ParsedEnvelope::Immediate(JsonRpcError::invalid_request()),
        };
        if elements.is_empty() {
            return ParsedEnvelope::Immediate(JsonRpcError::invalid_request());
        }
        let items = elements.iter().map(|el| decode_single_request(el)).collect();
        ParsedEnvelope::Requests(RequestBatch::array(items))
    } else if text.starts_with('{') {
        ParsedEnvelope::Requests(RequestBatch::single(decode_single_request(&raw)))
    } else {
        ParsedEnvelope::Immediate(JsonRpcError::invalid_request())
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireResponse {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<JsonRpcError>,
    #[serde(default)]
    id: Option<Box<RawValue>>,
}

fn decode_single_response(raw: &RawValue) -> Result<ResponseMessage, JsonRpcError> {
    let wire: WireResponse =
        serde_json::from_str(raw.get()).map_err(|_| JsonRpcError::parse_error())?;
    Ok(ResponseMessage {
        id: normalize_raw_id(wire.id),
        result: wire.result,
        error: wire.error,
    })
}

/// Parses a raw response frame, client-side counterpart of
/// [`parse_request_envelope`] (§4.6).
pub fn parse_response_envelope(bytes: &[u8]) -> Result<ResponseBatch, JsonRpcError> {
    let raw: Box<RawValue> = serde_json::from_slice(bytes).map_err(|_| JsonRpcError::parse_error())?;
    let text = raw.get().trim_start();
    if text.starts_with('[') {
        let elements: Vec<Box<RawValue>> =
            serde_json::from_str(raw.get()).map_err(|_| JsonRpcError::parse_error())?;
        let items = elements
            .iter()
            .map(|el| decode_single_response(el))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResponseBatch::array(items))
    } else {
        Ok(ResponseBatch::single(decode_single_response(&raw)?))
    }
}

#[derive(Serialize)]
struct WireRequestOut<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a RawValue>,
}

/// Serializes a request batch, honoring its authoritative `is_array` flag
/// (§3, §4.4).
pub fn marshal_request_batch(batch: &RequestBatch) -> Vec<u8> {
    let wire: Vec<WireRequestOut> = batch
        .items
        .iter()
        .map(|r| WireRequestOut {
            jsonrpc: JSONRPC_VERSION,
            method: &r.method,
            params: r.params.as_deref(),
            id: r.id.as_deref(),
        })
        .collect();

    if batch.is_array {
        serde_json::to_vec(&wire).expect("a well-formed request batch always serializes")
    } else {
        serde_json::to_vec(&wire[0]).expect("a well-formed request always serializes")
    }
}

mod raw_id_ref {
    use super::RawValue;
    use serde::{Serialize, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<&RawValue>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(raw) => raw.serialize(s),
            None => s.serialize_none(),
        }
    }
}

#[derive(Serialize)]
struct WireResponseOut<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a JsonRpcError>,
    #[serde(with = "raw_id_ref")]
    id: Option<&'a RawValue>,
}

/// Serializes a response batch. Unlike a request's `id`, a response's `id`
/// member is always present, serializing as `null` when absent (§3).
pub fn marshal_response_batch(batch: &ResponseBatch) -> Vec<u8> {
    let wire: Vec<WireResponseOut> = batch
        .items
        .iter()
        .map(|r| WireResponseOut {
            jsonrpc: JSONRPC_VERSION,
            result: r.result.as_deref(),
            error: r.error.as_ref(),
            id: r.id.as_deref(),
        })
        .collect();

    if batch.is_array {
        serde_json::to_vec(&wire).expect("a well-formed response batch always serializes")
    } else {
        serde_json::to_vec(&wire[0]).expect("a well-formed response always serializes")
    }
}

/// Slices a request's raw `params` into a positional argument array,
/// enforcing the array shape and the "too many arguments" rule (§4.4). A
/// shorter array than `arity` is left to the callback's own per-argument
/// decoding (missing trailing arguments fall back to `null`, see
/// `registry::callback::decode_arg`).
pub fn decode_positional_params(
    params: Option<&RawValue>,
    arity: usize,
) -> Result<Vec<serde_json::Value>, JsonRpcError> {
    let elements: Vec<serde_json::Value> = match params {
        None => Vec::new(),
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw.get()).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
            match value {
                serde_json::Value::Array(items) => items,
                _ => return Err(JsonRpcError::invalid_params("params must be an array")),
            }
        }
    };

    if elements.len() > arity {
        return Err(JsonRpcError::invalid_params(format!(
            "too many arguments, want at most {arity}"
        )));
    }

    Ok(elements)
}

/// What a server-side read produced: either requests to dispatch, or an
/// envelope-level failure to answer immediately without dispatch (§4.4).
pub enum IncomingRequest {
    Batch(RequestBatch),
    EnvelopeError(JsonRpcError),
}

fn to_incoming(envelope: ParsedEnvelope) -> IncomingRequest {
    match envelope {
        ParsedEnvelope::Requests(batch) => IncomingRequest::Batch(batch),
        ParsedEnvelope::Immediate(err) => IncomingRequest::EnvelopeError(err),
    }
}

/// Caps the number of elements a batch-flagged request may carry
/// (`LimitsConfig::max_batch_size`). A single (non-array) request is never
/// subject to this cap. Returns the rejection to answer with, if any,
/// leaving `batch` untouched so the caller can still echo nothing further.
pub fn enforce_max_batch_size(batch: &RequestBatch, max_batch_size: usize) -> Option<JsonRpcError> {
    if batch.is_array && batch.len() > max_batch_size {
        Some(JsonRpcError::batch_too_large(batch.len(), max_batch_size))
    } else {
        None
    }
}

/// The stream-transport server-side codec: frames off one JSON value at a
/// time and hands back classified requests, or writes response batches
/// (§4.2, §4.5).
pub struct StreamServerCodec<T> {
    framed: tokio_util::codec::Framed<T, JsonRpcFrameCodec>,
}

impl<T> StreamServerCodec<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: tokio_util::codec::Framed::new(io, JsonRpcFrameCodec),
        }
    }

    /// Reads the next request batch off the connection. `Ok(None)` means
    /// the peer closed the connection cleanly.
    pub async fn read_request_batch(&mut self) -> Result<Option<IncomingRequest>, FrameError> {
        use futures::StreamExt;
        match self.framed.next().await {
            Some(Ok(bytes)) => Ok(Some(to_incoming(parse_request_envelope(&bytes)))),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Writes a response batch. Callers must not call this with an empty
    /// batch (all-notification batches write nothing, per §4.4).
    pub async fn write_response_batch(&mut self, batch: ResponseBatch) -> Result<(), FrameError> {
        use futures::SinkExt;
        let bytes = marshal_response_batch(&batch);
        self.framed.send(Bytes::from(bytes)).await
    }

    pub async fn close(&mut self) {
        use futures::SinkExt;
        let _ = self.framed.close().await;
    }
}

/// The stream-transport client-side codec, mirroring [`StreamServerCodec`]
/// (§4.2, §4.6).
pub struct StreamClientCodec<T> {
    framed: tokio_util::codec::Framed<T, JsonRpcFrameCodec>,
}

impl<T> StreamClientCodec<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: tokio_util::codec::Framed::new(io, JsonRpcFrameCodec),
        }
    }

    pub async fn write_request_batch(&mut self, batch: &RequestBatch) -> Result<(), FrameError> {
        use futures::SinkExt;
        let bytes = marshal_request_batch(batch);
        self.framed.send(Bytes::from(bytes)).await
    }

    pub async fn read_response_batch(&mut self) -> Result<Option<ResponseBatch>, FrameError> {
        use futures::StreamExt;
        match self.framed.next().await {
            Some(Ok(bytes)) => match parse_response_envelope(&bytes) {
                Ok(batch) => Ok(Some(batch)),
                Err(err) => Ok(Some(ResponseBatch::single(ResponseMessage::failure(
                    None, err,
                )))),
            },
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    pub async fn close(&mut self) {
        use futures::SinkExt;
        let _ = self.framed.close().await;
    }
}

#[cfg(test)]
#[path = "tests/property_tests.rs"]
mod property_tests;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_request() {
        let bytes = br#"{"jsonrpc":"2.0","method":"rpc.subtract","params":[42,23],"id":1}"#;
        match parse_request_envelope(bytes) {
            ParsedEnvelope::Requests(batch) => {
                assert!(!batch.is_array);
                assert_eq!(batch.items[0].method, "rpc.subtract");
                assert!(batch.items[0].is_callable());
            }
            ParsedEnvelope::Immediate(_) => panic!("expected a parsed request"),
        }
    }

    #[test]
    fn empty_batch_is_immediate_invalid_request() {
        match parse_request_envelope(b"[]") {
            ParsedEnvelope::Immediate(err) => assert_eq!(err.code, -32600),
            ParsedEnvelope::Requests(_) => panic!("expected an immediate error"),
        }
    }

    #[test]
    fn garbage_json_is_parse_error() {
        match parse_request_envelope(b"{not json") {
            ParsedEnvelope::Immediate(err) => assert_eq!(err.code, -32700),
            ParsedEnvelope::Requests(_) => panic!("expected a parse error"),
        }
    }

    #[test]
    fn batch_element_decode_failure_becomes_placeholder() {
        let bytes = br#"[{"jsonrpc":"2.0","method":"a.b","id":1}, 123]"#;
        match parse_request_envelope(bytes) {
            ParsedEnvelope::Requests(batch) => {
                assert!(batch.is_array);
                assert_eq!(batch.len(), 2);
                assert!(batch.items[0].is_callable());
                assert!(!batch.items[1].is_callable());
                assert!(!batch.items[1].has_valid_id());
            }
            ParsedEnvelope::Immediate(_) => panic!("expected a parsed batch"),
        }
    }

    #[test]
    fn wrong_version_with_id_keeps_id_clears_method() {
        let bytes = br#"{"jsonrpc":"1.0","method":"a.b","id":5}"#;
        match parse_request_envelope(bytes) {
            ParsedEnvelope::Requests(batch) => {
                let req = &batch.items[0];
                assert!(req.method.is_empty());
                assert!(req.has_valid_id());
            }
            ParsedEnvelope::Immediate(_) => panic!("expected a parsed request"),
        }
    }

    #[test]
    fn marshal_single_response_is_not_an_array() {
        let id = RawValue::from_string("1".to_string()).unwrap();
        let result = RawValue::from_string("19".to_string()).unwrap();
        let batch = ResponseBatch::single(ResponseMessage::success(Some(id), result));
        let bytes = marshal_response_batch(&batch);
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.starts_with('['));
        assert!(text.contains("\"id\":1"));
        assert!(text.contains("\"result\":19"));
    }

    #[test]
    fn marshal_batch_of_one_stays_an_array() {
        let id = RawValue::from_string("1".to_string()).unwrap();
        let result = RawValue::from_string("19".to_string()).unwrap();
        let batch = ResponseBatch::array(vec![ResponseMessage::success(Some(id), result)]);
        let bytes = marshal_response_batch(&batch);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with('['));
    }

    #[test]
    fn absent_response_id_serializes_null() {
        let batch = ResponseBatch::single(ResponseMessage::failure(None, JsonRpcError::parse_error()));
        let bytes = marshal_response_batch(&batch);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"id\":null"));
    }

    #[test]
    fn too_many_positional_params_rejected() {
        let params = RawValue::from_string("[1,2,3]".to_string()).unwrap();
        let err = decode_positional_params(Some(&params), 2).unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn non_array_params_rejected() {
        let params = RawValue::from_string("{\"a\":1}".to_string()).unwrap();
        let err = decode_positional_params(Some(&params), 1).unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn fewer_params_than_arity_are_left_for_the_callback() {
        let params = RawValue::from_string("[1]".to_string()).unwrap();
        let decoded = decode_positional_params(Some(&params), 3).unwrap();
        assert_eq!(decoded.len(), 1);
    }
}
