//! HTTP header validation for the JSON-RPC HTTP binding (§4.4, §6).
//!
//! This is pure: it classifies an already-received `http::Request<Bytes>`
//! against the binding's rules (method, body size, content type) and, on
//! success, hands the body off to [`super::codec::parse_request_envelope`].
//! Actually opening a TCP listener and translating raw bytes into an
//! `http::Request` is the host application's concern, so no socket or HTTP
//! server crate appears here.

use bytes::Bytes;
use http::{HeaderValue, Method, Request, Response, StatusCode};

/// The JSON-RPC HTTP media type (§4.4, §6).
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The outcome of validating an incoming HTTP request before it reaches the
/// JSON-RPC dispatch pipeline (§4.4).
pub enum IncomingHttp {
    /// A `GET` with no body and an empty query: answer 200 with an empty
    /// body and never dispatch (health probe).
    HealthProbe,
    /// A valid `POST` whose body should be parsed and dispatched.
    Dispatch(Bytes),
    /// The request was rejected outright; reply with this status and never
    /// dispatch.
    Rejected(StatusCode),
}

/// Maximum accepted JSON-RPC HTTP body size (§4.4): 5 MiB.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Classifies an incoming HTTP request per §4.4's header validation rules.
pub fn classify_request(request: &Request<Bytes>, max_body_bytes: usize) -> IncomingHttp {
    if request.method() == Method::GET {
        if request.body().is_empty() && request.uri().query().is_none() {
            return IncomingHttp::HealthProbe;
        }
        return IncomingHttp::Rejected(StatusCode::METHOD_NOT_ALLOWED);
    }

    if request.method() != Method::POST {
        return IncomingHttp::Rejected(StatusCode::METHOD_NOT_ALLOWED);
    }

    if request.body().len() > max_body_bytes {
        return IncomingHttp::Rejected(StatusCode::PAYLOAD_TOO_LARGE);
    }

    match request.headers().get(http::header::CONTENT_TYPE) {
        Some(value) if content_type_is_json(value) => {}
        _ => return IncomingHttp::Rejected(StatusCode::UNSUPPORTED_MEDIA_TYPE),
    }

    IncomingHttp::Dispatch(request.body().clone())
}

fn content_type_is_json(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|s| s.split(';').next().unwrap_or("").trim() == JSON_CONTENT_TYPE)
        .unwrap_or(false)
}

/// Builds the health-probe response: 200, empty body, no content type.
pub fn health_probe_response() -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Bytes::new())
        .expect("a status-only response always builds")
}

/// Builds a bare rejection response carrying only the given status.
pub fn rejection_response(status: StatusCode) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .body(Bytes::new())
        .expect("a status-only response always builds")
}

/// Wraps a successful dispatch's response bytes with the JSON-RPC content
/// type (§4.4: "on success set response `Content-Type: application/json`").
pub fn dispatch_response(body: Vec<u8>) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(Bytes::from(body))
        .expect("a well-formed JSON-RPC response always builds")
}

/// Sets the outbound client request headers the binding requires:
/// `Accept` and `Content-Type` both `application/json` (§4.4).
pub fn client_request_headers() -> [(http::header::HeaderName, &'static str); 2] {
    [
        (http::header::ACCEPT, JSON_CONTENT_TYPE),
        (http::header::CONTENT_TYPE, JSON_CONTENT_TYPE),
    ]
}
