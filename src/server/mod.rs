//! The RPC server: accept loop, per-connection serve loop, the HTTP
//! one-shot path, and shutdown (§4.5).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::protocol::ProtocolError;
use crate::error::transport::TransportError;
use crate::protocol::jsonrpc::codec::{
    enforce_max_batch_size, marshal_response_batch, parse_request_envelope, IncomingRequest,
    ParsedEnvelope, StreamServerCodec,
};
use crate::protocol::jsonrpc::handler::dispatch_batch;
use crate::protocol::jsonrpc::http::{
    classify_request, dispatch_response, health_probe_response, rejection_response, IncomingHttp,
};
use crate::protocol::jsonrpc::types::{ResponseBatch, ResponseMessage};
use crate::registry::{BuiltinRpcService, Registry, RpcService};

/// `Server` holds the registry, a running flag, and a table of active
/// connections (keyed by a monotonic sequence) so [`Server::shutdown`] can
/// unblock every one of their pending reads (§4.5).
///
/// The codec table the design describes maps to a table of per-connection
/// [`CancellationToken`]s here rather than the codecs themselves: closing a
/// connection is "make its read return", and a cancellation token already
/// expresses exactly that without the server needing a handle into another
/// task's owned I/O object.
pub struct Server {
    registry: Registry,
    connections: DashMap<u64, CancellationToken>,
    next_id: AtomicU64,
    running: AtomicBool,
    debug_errors: bool,
    max_batch_size: usize,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Builds a server and registers the built-in `rpc` service (§4.1).
    /// `debug_errors` controls whether application error responses include
    /// their full source chain (§7). The batch-size and connection caps
    /// default to [`crate::config::limits::LimitsConfig`]'s own defaults;
    /// use [`Server::with_limits`] to override them from loaded
    /// configuration.
    pub fn new(debug_errors: bool) -> Self {
        let limits = crate::config::limits::LimitsConfig::default();
        Self::with_limits(debug_errors, limits.max_batch_size, limits.max_connections)
    }

    /// Builds a server with an explicit cap on batch-flagged request size
    /// (§5's shared-resource policy), typically sourced from
    /// `LimitsConfig::max_batch_size`, leaving the connection cap at its
    /// default. A single (non-array) request is never subject to the
    /// batch-size cap.
    pub fn with_max_batch_size(debug_errors: bool, max_batch_size: usize) -> Self {
        let max_connections = crate::config::limits::LimitsConfig::default().max_connections;
        Self::with_limits(debug_errors, max_batch_size, max_connections)
    }

    /// Builds a server with explicit caps on both batch-flagged request size
    /// and concurrently accepted connections, typically sourced from a
    /// loaded `LimitsConfig`. The connection cap is enforced by
    /// [`Server::accept_unix`] as a semaphore sized to `max_connections`:
    /// the accept loop will not pull another connection off the listener
    /// until a previously accepted one closes and releases its permit.
    pub fn with_limits(debug_errors: bool, max_batch_size: usize, max_connections: usize) -> Self {
        let registry = Registry::new();
        registry
            .register(BuiltinRpcService::new(registry.downgrade()))
            .expect("the built-in rpc service always registers cleanly");

        Self {
            registry,
            connections: DashMap::new(),
            next_id: AtomicU64::new(0),
            running: AtomicBool::new(true),
            debug_errors,
            max_batch_size,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
        }
    }

    /// Registers `service`'s callbacks. Must be called before [`Server::accept_unix`]
    /// starts handing connections to concurrent tasks (§4.1, §4.5).
    pub fn register<S: RpcService>(&self, service: S) -> Result<(), ProtocolError> {
        self.registry.register(service)
    }

    /// Whether the server is still accepting work (§4.5's state machine).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Compare-and-swap `running` 1→0 and cancel every active connection's
    /// token, unblocking its pending read (§4.5). Idempotent: a second call
    /// is a no-op.
    pub fn shutdown(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            for entry in self.connections.iter() {
                entry.value().cancel();
            }
        }
    }

    /// Accepts connections off `listener` until shutdown, spawning a
    /// concurrent [`Server::serve_conn`] for each (§4.5).
    ///
    /// A connection is only accepted once a permit is free on
    /// `connection_limit` (§5's shared-resource policy,
    /// `LimitsConfig::max_connections`): once all permits are held, the
    /// loop stops pulling new connections off `listener` until one of the
    /// in-flight connections closes and its permit is released.
    pub async fn accept_unix(self: Arc<Self>, listener: UnixListener) -> Result<(), TransportError> {
        while self.is_running() {
            let permit = Arc::clone(&self.connection_limit)
                .acquire_owned()
                .await
                .expect("connection semaphore is never closed");

            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _permit = permit;
                        server.serve_conn(stream).await;
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "accept failed");
                    return Err(TransportError::from(err));
                }
            }
        }
        Ok(())
    }

    /// Serves one stream connection: wraps it in a codec and loops reading
    /// request batches, dispatching each on its own spawned task and
    /// writing completed response batches back as they finish (§4.3, §4.5).
    ///
    /// A read/decode error closes the connection instead of retrying, to
    /// avoid busy-looping on a connection whose transport has gone bad (§9).
    pub async fn serve_conn<T>(self: Arc<Self>, io: T)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        self.connections.insert(id, token.clone());

        let mut codec = StreamServerCodec::new(io);
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<ResponseBatch>();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(response) = response_rx.recv() => {
                    if !response.is_empty() && codec.write_response_batch(response).await.is_err() {
                        break;
                    }
                }
                read = codec.read_request_batch() => {
                    match read {
                        Ok(Some(IncomingRequest::Batch(batch))) => {
                            if let Some(err) = enforce_max_batch_size(&batch, self.max_batch_size) {
                                let response = ResponseBatch::single(ResponseMessage::failure(None, err));
                                if codec.write_response_batch(response).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                            let registry = self.registry.clone();
                            let conn_token = token.clone();
                            let debug_errors = self.debug_errors;
                            let tx = response_tx.clone();
                            tokio::spawn(async move {
                                let response = dispatch_batch(&registry, conn_token, batch, debug_errors).await;
                                let _ = tx.send(response);
                            });
                        }
                        Ok(Some(IncomingRequest::EnvelopeError(err))) => {
                            let response = ResponseBatch::single(ResponseMessage::failure(None, err));
                            if codec.write_response_batch(response).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::error!(error = %err, "connection read error, closing");
                            break;
                        }
                    }
                }
            }
        }

        codec.close().await;
        self.connections.remove(&id);
    }

    /// One-shot variant of [`Server::serve_conn`]: reads exactly one request
    /// batch and writes exactly one response batch, then closes (§4.5). Used
    /// by the in-process pipe transport for a single embedded call.
    pub async fn serve_request<T>(&self, io: T) -> Result<(), TransportError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut codec = StreamServerCodec::new(io);
        let outcome = codec
            .read_request_batch()
            .await
            .map_err(|err| TransportError::Other(err.to_string()))?;

        let response = match outcome {
            Some(IncomingRequest::Batch(batch)) => {
                if let Some(err) = enforce_max_batch_size(&batch, self.max_batch_size) {
                    Some(ResponseBatch::single(ResponseMessage::failure(None, err)))
                } else {
                    Some(dispatch_batch(&self.registry, CancellationToken::new(), batch, self.debug_errors).await)
                }
            }
            Some(IncomingRequest::EnvelopeError(err)) => {
                Some(ResponseBatch::single(ResponseMessage::failure(None, err)))
            }
            None => None,
        };

        if let Some(response) = response {
            if !response.is_empty() {
                codec
                    .write_response_batch(response)
                    .await
                    .map_err(|err| TransportError::Other(err.to_string()))?;
            }
        }

        codec.close().await;
        Ok(())
    }

    /// Serves one HTTP request/response pair (§4.4, §4.5). Unlike the
    /// stream path this works directly on `Bytes` rather than an
    /// `io::Read`/`io::Write` shim — HTTP already hands the core a
    /// complete body and expects a complete response back, so there is no
    /// framing left to do.
    pub async fn serve_http(&self, request: Request<Bytes>, max_body_bytes: usize) -> Response<Bytes> {
        match classify_request(&request, max_body_bytes) {
            IncomingHttp::HealthProbe => health_probe_response(),
            IncomingHttp::Rejected(status) => rejection_response(status),
            IncomingHttp::Dispatch(body) => match parse_request_envelope(&body) {
                ParsedEnvelope::Requests(batch) => {
                    if let Some(err) = enforce_max_batch_size(&batch, self.max_batch_size) {
                        dispatch_response(marshal_response_batch(&ResponseBatch::single(
                            ResponseMessage::failure(None, err),
                        )))
                    } else {
                        let response =
                            dispatch_batch(&self.registry, CancellationToken::new(), batch, self.debug_errors).await;
                        if response.is_empty() {
                            dispatch_response(Vec::new())
                        } else {
                            dispatch_response(marshal_response_batch(&response))
                        }
                    }
                }
                ParsedEnvelope::Immediate(err) => dispatch_response(marshal_response_batch(
                    &ResponseBatch::single(ResponseMessage::failure(None, err)),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::jsonrpc::http::MAX_BODY_BYTES;
    use crate::registry::{Callback, RpcError};
    use bytes::Bytes;

    struct MathService;

    impl RpcService for MathService {
        fn namespace(&self) -> &str {
            "math"
        }

        fn into_callbacks(self) -> Vec<(String, Callback)> {
            vec![(
                "subtract".to_string(),
                Callback::from_fn2(|a: i64, b: i64| async move { Ok::<_, RpcError>(a - b) }),
            )]
        }
    }

    #[tokio::test]
    async fn serve_conn_over_in_process_pipe_answers_request() {
        let server = Arc::new(Server::new(false));
        server.register(MathService).unwrap();

        let (server_end, mut client_end) = tokio::io::duplex(4096);
        let serve_task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve_conn(server_end).await }
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client_end
            .write_all(br#"{"jsonrpc":"2.0","method":"math.subtract","params":[42,23],"id":1}"#)
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        let n = client_end.read(&mut buf).await.unwrap();
        let text = String::from_utf8(buf[..n].to_vec()).unwrap();
        assert!(text.contains("\"result\":19"));

        server.shutdown();
        drop(client_end);
        let _ = serve_task.await;
    }

    #[tokio::test]
    async fn serve_http_rejects_wrong_content_type() {
        let server = Server::new(false);
        server.register(MathService).unwrap();

        let request = Request::builder()
            .method(http::Method::POST)
            .uri("http://localhost/")
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(Bytes::from_static(b"{}"))
            .unwrap();

        let response = server.serve_http(request, MAX_BODY_BYTES).await;
        assert_eq!(response.status(), http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn serve_http_get_health_probe() {
        let server = Server::new(false);
        let request = Request::builder()
            .method(http::Method::GET)
            .uri("http://localhost/")
            .body(Bytes::new())
            .unwrap();

        let response = server.serve_http(request, MAX_BODY_BYTES).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn serve_http_dispatches_post() {
        let server = Server::new(false);
        server.register(MathService).unwrap();

        let request = Request::builder()
            .method(http::Method::POST)
            .uri("http://localhost/")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(
                br#"{"jsonrpc":"2.0","method":"math.subtract","params":[42,23],"id":1}"#,
            ))
            .unwrap();

        let response = server.serve_http(request, MAX_BODY_BYTES).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("\"result\":19"));
    }

    #[tokio::test]
    async fn serve_http_rejects_oversized_batch() {
        let server = Server::with_max_batch_size(false, 1);
        server.register(MathService).unwrap();

        let request = Request::builder()
            .method(http::Method::POST)
            .uri("http://localhost/")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(
                br#"[{"jsonrpc":"2.0","method":"math.subtract","params":[1,1],"id":1},
                    {"jsonrpc":"2.0","method":"math.subtract","params":[2,2],"id":2}]"#,
            ))
            .unwrap();

        let response = server.serve_http(request, MAX_BODY_BYTES).await;
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("\"code\":-32600"));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let server = Server::new(false);
        assert!(server.is_running());
        server.shutdown();
        assert!(!server.is_running());
        server.shutdown();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn accept_unix_caps_concurrent_connections() {
        let server = Arc::new(Server::with_limits(false, 256, 1));
        server.register(MathService).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("kahiko-test.sock");
        let listener = crate::transport::bind_unix(&socket_path).unwrap();

        let accept_server = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = accept_server.accept_unix(listener).await;
        });

        let first = crate::transport::connect_unix(&socket_path).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.connection_limit.available_permits(), 0);
        assert_eq!(server.connections.len(), 1);

        // The kernel queues a second dial in the listen backlog, but the
        // accept loop must not pull it off the listener (let alone spawn a
        // `serve_conn` for it) while the single permit is held by `first`.
        let _second = crate::transport::connect_unix(&socket_path).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.connections.len(), 1);

        drop(first);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.connections.len(), 1);
    }
}
