//! Wire-level data model for the JSON-RPC 2.0 binding (§3).
//!
//! Every field that crosses the wire is carried as raw, unparsed JSON
//! (`serde_json::value::RawValue`) until something downstream decides how it
//! needs to be interpreted: a request's `params` are sliced and typed
//! against a [`Callback`](crate::registry::Callback)'s declared arity, and a
//! response's `result`/`error` are threaded back to whichever client call is
//! waiting on the matching `id`. Keeping these fields opaque here avoids
//! committing the core to any concrete parameter or result type.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

use super::error::JsonRpcError;

/// The fixed protocol version string every envelope must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request or response identifier, carried as raw unparsed JSON so the
/// core never has to agree with a caller on a concrete id type.
pub type RawId = Box<RawValue>;

/// A convenience, typed view of an identifier, used when building requests
/// from Rust code rather than parsing them off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// A string identifier.
    String(String),
    /// A numeric identifier. The spec permits fractional JSON numbers as
    /// ids but recommends against them; this crate only ever produces
    /// integers.
    Number(i64),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "{s}"),
            Id::Number(n) => write!(f, "{n}"),
        }
    }
}

impl Id {
    /// Renders this id as a raw JSON value, ready to embed in an outgoing
    /// request.
    pub fn to_raw(&self) -> RawId {
        let text = serde_json::to_string(self).expect("Id always serializes");
        RawValue::from_string(text).expect("a serialized Id is valid JSON")
    }
}

impl From<i64> for Id {
    fn from(v: i64) -> Self {
        Id::Number(v)
    }
}

impl From<String> for Id {
    fn from(v: String) -> Self {
        Id::String(v)
    }
}

impl From<&str> for Id {
    fn from(v: &str) -> Self {
        Id::String(v.to_string())
    }
}

/// Whether a raw id's bytes are a *valid id shape* (§3): non-empty, and not
/// an object or array. Only strings and numbers are legal ids.
pub fn is_valid_id_shape(raw: &RawValue) -> bool {
    match raw.get().trim_start().as_bytes().first() {
        None => false,
        Some(b'{') | Some(b'[') => false,
        Some(_) => true,
    }
}

/// Normalizes a raw id: the JSON literal `null` is treated as an absent id
/// everywhere past the codec boundary (§4.4, §8 invariants).
pub fn normalize_raw_id(raw: Option<RawId>) -> Option<RawId> {
    match raw {
        Some(id) if id.get().trim() == "null" => None,
        other => other,
    }
}

/// A decoded JSON-RPC request envelope.
///
/// `params`, when present, must be a JSON array in this binding (§4.4); the
/// codec enforces that at parameter-decoding time, not here.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    /// The request id; absent for notifications.
    pub id: Option<RawId>,
    /// The dotted `namespace.method` name. Empty for a placeholder request
    /// produced when a batch element could not be decoded at all, or when
    /// the decoded envelope carried the wrong `jsonrpc` version (§4.4).
    pub method: String,
    /// Raw, unparsed parameter array.
    pub params: Option<Box<RawValue>>,
}

impl RequestMessage {
    /// An empty placeholder for a batch element that failed to decode
    /// entirely; the handler rejects it with `InvalidRequest` and id `null`
    /// (§4.4).
    pub fn placeholder() -> Self {
        Self {
            id: None,
            method: String::new(),
            params: None,
        }
    }

    /// *Notification* ⇔ id absent ∧ method non-empty (§3).
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && !self.method.is_empty()
    }

    /// *Valid id* ⇔ id bytes non-empty and not an object/array (§3).
    pub fn has_valid_id(&self) -> bool {
        matches!(&self.id, Some(raw) if is_valid_id_shape(raw))
    }

    /// *Callable* ⇔ id present ∧ valid ∧ method non-empty (§3).
    pub fn is_callable(&self) -> bool {
        self.has_valid_id() && !self.method.is_empty()
    }
}

/// A decoded JSON-RPC response envelope.
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    /// Echoed request id; `None` serializes to `null` (envelope-level
    /// failures only, §3).
    pub id: Option<RawId>,
    /// Present iff the call succeeded.
    pub result: Option<Box<RawValue>>,
    /// Present iff the call failed; mutually exclusive with `result`.
    pub error: Option<JsonRpcError>,
}

impl ResponseMessage {
    /// Builds a successful response.
    pub fn success(id: Option<RawId>, result: Box<RawValue>) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    pub fn failure(id: Option<RawId>, error: JsonRpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// An ordered collection of request or response messages, plus whether the
/// wire form was a JSON array. The flag is authoritative for serialization
/// (§3): a batch-flagged collection of exactly one element still
/// serializes as a one-element array.
#[derive(Debug, Clone)]
pub struct MessageBatch<T> {
    /// The messages, in arrival/emission order.
    pub items: Vec<T>,
    /// Whether the wire envelope was (or, for an outgoing batch, must be) a
    /// JSON array rather than a single object.
    pub is_array: bool,
}

impl<T> MessageBatch<T> {
    /// Wraps a single message as a non-array batch.
    pub fn single(item: T) -> Self {
        Self {
            items: vec![item],
            is_array: false,
        }
    }

    /// Wraps a, possibly empty, collection as an array batch.
    pub fn array(items: Vec<T>) -> Self {
        Self {
            items,
            is_array: true,
        }
    }

    /// Whether this batch carries no elements at all.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The number of elements in this batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of decoded requests.
pub type RequestBatch = MessageBatch<RequestMessage>;
/// A batch of decoded responses.
pub type ResponseBatch = MessageBatch<ResponseMessage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_requires_nonempty_method() {
        let notice = RequestMessage {
            id: None,
            method: "rpc.update".to_string(),
            params: None,
        };
        assert!(notice.is_notification());
        assert!(!notice.is_callable());

        let malformed = RequestMessage {
            id: None,
            method: String::new(),
            params: None,
        };
        assert!(!malformed.is_notification());
    }

    #[test]
    fn callable_requires_valid_id_and_method() {
        let id = RawValue::from_string("1".to_string()).unwrap();
        let request = RequestMessage {
            id: Some(id),
            method: "rpc.subtract".to_string(),
            params: None,
        };
        assert!(request.is_callable());
        assert!(!request.is_notification());
    }

    #[test]
    fn object_and_array_ids_are_invalid_shapes() {
        let obj_id = RawValue::from_string("{}".to_string()).unwrap();
        assert!(!is_valid_id_shape(&obj_id));

        let arr_id = RawValue::from_string("[1]".to_string()).unwrap();
        assert!(!is_valid_id_shape(&arr_id));

        let str_id = RawValue::from_string("\"abc\"".to_string()).unwrap();
        assert!(is_valid_id_shape(&str_id));

        let num_id = RawValue::from_string("42".to_string()).unwrap();
        assert!(is_valid_id_shape(&num_id));
    }

    #[test]
    fn null_id_normalizes_to_absent() {
        let null_id = RawValue::from_string("null".to_string()).unwrap();
        assert!(normalize_raw_id(Some(null_id)).is_none());
        assert!(normalize_raw_id(None).is_none());

        let real_id = RawValue::from_string("1".to_string()).unwrap();
        assert!(normalize_raw_id(Some(real_id)).is_some());
    }

    #[test]
    fn single_element_batch_flagged_as_array_stays_flagged() {
        let batch = RequestBatch::array(vec![RequestMessage::placeholder()]);
        assert!(batch.is_array);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn id_round_trips_through_raw() {
        let id = Id::Number(42);
        let raw = id.to_raw();
        assert_eq!(raw.get(), "42");

        let id = Id::String("abc".to_string());
        let raw = id.to_raw();
        assert_eq!(raw.get(), "\"abc\"");
    }
}
