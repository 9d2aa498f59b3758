//! The RPC client: a call multiplexer over a stream codec, or a
//! request/response dispatcher over HTTP (§4.6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::{to_raw_value, RawValue};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::protocol::ProtocolError;
use crate::error::transport::TransportError;
use crate::protocol::jsonrpc::codec::{
    marshal_request_batch, parse_response_envelope, StreamClientCodec,
};
use crate::protocol::jsonrpc::error::JsonRpcError;
use crate::protocol::jsonrpc::http::client_request_headers;
use crate::protocol::jsonrpc::types::{Id, RequestBatch, RequestMessage};

/// Errors a client call can fail with.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The callback returned, or the server answered with, a JSON-RPC error object.
    #[error("{0}")]
    Rpc(#[from] JsonRpcError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The result JSON didn't deserialize into the type the caller asked for.
    #[error("failed to decode value: {0}")]
    Decode(serde_json::Error),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// One element of an outgoing batch whose result type isn't known until the
/// caller inspects it (§4.6). Unlike [`Client::call`], a batch can mix
/// different methods and result shapes in one round trip, so elements carry
/// pre-serialized params and hand back raw results.
pub struct BatchElement {
    pub method: String,
    pub params: Box<RawValue>,
}

impl BatchElement {
    /// Builds a batch element, serializing `params` eagerly.
    pub fn new<P: Serialize>(method: impl Into<String>, params: P) -> ClientResult<Self> {
        Ok(Self {
            method: method.into(),
            params: to_raw_value(&params).map_err(ClientError::Decode)?,
        })
    }
}

/// Why a pending call's oneshot was completed with a failure instead of a
/// server-sent error object.
enum PendingOutcome {
    Rpc(JsonRpcError),
    /// The connection closed (or a write failed) while the call was still
    /// outstanding (§4.6's "end-of-stream error").
    EndOfStream,
}

type ResponseSlot = Result<Box<RawValue>, PendingOutcome>;

/// One submission handed to the stream dispatch task: the wire batch plus a
/// responder for every non-notification element, keyed by that element's
/// raw id text.
struct Submission {
    batch: RequestBatch,
    waiters: HashMap<String, oneshot::Sender<ResponseSlot>>,
}

#[derive(Clone)]
enum Mode {
    Stream {
        submit_tx: mpsc::UnboundedSender<Submission>,
    },
    Http {
        http_client: reqwest::Client,
        url: Url,
    },
}

/// A multiplexed JSON-RPC client (§4.6). Cloning a `Client` is cheap and
/// shares the same underlying connection or HTTP client.
#[derive(Clone)]
pub struct Client {
    mode: Mode,
    next_id: Arc<AtomicU64>,
}

impl Client {
    /// Runs the client over a stream transport: spawns a dispatch task that
    /// owns the codec exclusively, serializing writes and correlating reads
    /// by id (§4.6).
    ///
    /// A single task owning the codec gives the same at-most-one-outstanding-write
    /// guarantee the design describes as a `tokio::sync::Mutex` around the
    /// write half: since every write first passes through this task's
    /// channel, there is no second writer to guard against.
    pub fn connect_stream<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_stream_dispatch(io, submit_rx));
        Self {
            mode: Mode::Stream { submit_tx },
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Runs the client over HTTP: each submission is one POST, no background
    /// task (§4.6).
    pub fn connect_http(http_client: reqwest::Client, url: Url) -> Self {
        Self {
            mode: Mode::Http { http_client, url },
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn allocate_id(&self) -> Id {
        Id::Number(self.next_id.fetch_add(1, Ordering::SeqCst) as i64)
    }

    /// Issues a call and waits for its response (§4.6).
    pub async fn call<P, R>(&self, token: CancellationToken, method: &str, params: P) -> ClientResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let raw = self.call_raw(token, method, params).await?;
        serde_json::from_str(raw.get()).map_err(ClientError::Decode)
    }

    async fn call_raw<P: Serialize>(
        &self,
        token: CancellationToken,
        method: &str,
        params: P,
    ) -> ClientResult<Box<RawValue>> {
        let id = self.allocate_id();
        let raw_id = id.to_raw();
        let key = raw_id.get().to_string();
        let raw_params = to_raw_value(&params).map_err(ClientError::Decode)?;
        let request = RequestMessage {
            id: Some(raw_id),
            method: method.to_string(),
            params: Some(raw_params),
        };

        if token.is_cancelled() {
            return Err(ClientError::Protocol(ProtocolError::Other(
                "call cancelled before submission".to_string(),
            )));
        }

        match &self.mode {
            Mode::Stream { submit_tx } => {
                let (tx, rx) = oneshot::channel();
                let mut waiters = HashMap::with_capacity(1);
                waiters.insert(key, tx);
                submit_tx
                    .send(Submission {
                        batch: RequestBatch::single(request),
                        waiters,
                    })
                    .map_err(|_| dispatch_gone())?;

                match rx.await {
                    Ok(Ok(raw)) => Ok(raw),
                    Ok(Err(PendingOutcome::Rpc(err))) => Err(ClientError::Rpc(err)),
                    Ok(Err(PendingOutcome::EndOfStream)) | Err(_) => Err(end_of_stream()),
                }
            }
            Mode::Http { http_client, url } => {
                let mut results = self
                    .dispatch_http(http_client, url, token, RequestBatch::single(request))
                    .await?;
                match results.remove(&key) {
                    Some(Ok(raw)) => Ok(raw),
                    Some(Err(err)) => Err(ClientError::Rpc(err)),
                    None => Err(ClientError::Protocol(ProtocolError::CorrelationError(format!(
                        "no response element for id {key}"
                    )))),
                }
            }
        }
    }

    /// Submits a call without awaiting its response; returns a handle whose
    /// completion can be awaited independently of the call site (§4.6).
    pub fn call_async<P, R>(&self, token: CancellationToken, method: &str, params: P) -> CallHandle<R>
    where
        P: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let method = method.to_string();
        let inner = tokio::spawn(async move { client.call(token, &method, params).await });
        CallHandle { inner }
    }

    /// Sends a fire-and-forget notification: the request carries no id and
    /// no response is awaited (§4.6).
    pub async fn notice<P: Serialize>(&self, token: CancellationToken, method: &str, params: P) -> ClientResult<()> {
        let raw_params = to_raw_value(&params).map_err(ClientError::Decode)?;
        let request = RequestMessage {
            id: None,
            method: method.to_string(),
            params: Some(raw_params),
        };

        if token.is_cancelled() {
            return Err(ClientError::Protocol(ProtocolError::Other(
                "notice cancelled before submission".to_string(),
            )));
        }

        match &self.mode {
            Mode::Stream { submit_tx } => submit_tx
                .send(Submission {
                    batch: RequestBatch::single(request),
                    waiters: HashMap::new(),
                })
                .map_err(|_| dispatch_gone()),
            Mode::Http { http_client, url } => self
                .dispatch_http(http_client, url, token, RequestBatch::single(request))
                .await
                .map(|_| ()),
        }
    }

    /// Submits a batch of heterogeneous calls over one transport round trip
    /// (§4.6), returning each element's raw outcome in submission order.
    pub async fn batch(
        &self,
        token: CancellationToken,
        elements: Vec<BatchElement>,
    ) -> ClientResult<Vec<ClientResult<Box<RawValue>>>> {
        if elements.is_empty() {
            return Ok(Vec::new());
        }

        let mut requests = Vec::with_capacity(elements.len());
        let mut keys = Vec::with_capacity(elements.len());
        for element in elements {
            let raw_id = self.allocate_id().to_raw();
            keys.push(raw_id.get().to_string());
            requests.push(RequestMessage {
                id: Some(raw_id),
                method: element.method,
                params: Some(element.params),
            });
        }
        let batch = RequestBatch::array(requests);

        if token.is_cancelled() {
            return Err(ClientError::Protocol(ProtocolError::Other(
                "batch cancelled before submission".to_string(),
            )));
        }

        match &self.mode {
            Mode::Stream { submit_tx } => {
                let mut receivers = Vec::with_capacity(keys.len());
                let mut waiters = HashMap::with_capacity(keys.len());
                for key in &keys {
                    let (tx, rx) = oneshot::channel();
                    waiters.insert(key.clone(), tx);
                    receivers.push(rx);
                }

                submit_tx
                    .send(Submission { batch, waiters })
                    .map_err(|_| dispatch_gone())?;

                let mut out = Vec::with_capacity(receivers.len());
                for rx in receivers {
                    out.push(match rx.await {
                        Ok(Ok(raw)) => Ok(raw),
                        Ok(Err(PendingOutcome::Rpc(err))) => Err(ClientError::Rpc(err)),
                        Ok(Err(PendingOutcome::EndOfStream)) | Err(_) => Err(end_of_stream()),
                    });
                }
                Ok(out)
            }
            Mode::Http { http_client, url } => {
                let mut results = self.dispatch_http(http_client, url, token, batch).await?;
                let mut out = Vec::with_capacity(keys.len());
                for key in &keys {
                    out.push(match results.remove(key) {
                        Some(Ok(raw)) => Ok(raw),
                        Some(Err(err)) => Err(ClientError::Rpc(err)),
                        None => Err(ClientError::Protocol(ProtocolError::CorrelationError(format!(
                            "no response element for id {key}"
                        )))),
                    });
                }
                Ok(out)
            }
        }
    }

    /// Submits a batch without awaiting it; mirrors [`Client::call_async`].
    pub fn batch_async(
        &self,
        token: CancellationToken,
        elements: Vec<BatchElement>,
    ) -> CallHandle<Vec<ClientResult<Box<RawValue>>>> {
        let client = self.clone();
        let inner = tokio::spawn(async move { client.batch(token, elements).await });
        CallHandle { inner }
    }

    /// Issues one POST carrying `batch`, correlating response elements by
    /// id (§4.6's HTTP mode). The response error, when present, is bound
    /// directly to the returned map rather than discarded.
    async fn dispatch_http(
        &self,
        http_client: &reqwest::Client,
        url: &Url,
        token: CancellationToken,
        batch: RequestBatch,
    ) -> ClientResult<HashMap<String, Result<Box<RawValue>, JsonRpcError>>> {
        let body = marshal_request_batch(&batch);
        let mut builder = http_client.post(url.clone()).body(body);
        for (name, value) in client_request_headers() {
            builder = builder.header(name, value);
        }

        let response = tokio::select! {
            _ = token.cancelled() => {
                return Err(ClientError::Protocol(ProtocolError::Other("call cancelled".to_string())));
            }
            result = builder.send() => {
                result.map_err(|err| ClientError::Transport(TransportError::Other(err.to_string())))?
            }
        };

        if !response.status().is_success() {
            return Err(ClientError::Transport(TransportError::Other(format!(
                "unexpected http status {}",
                response.status()
            ))));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::Transport(TransportError::Other(err.to_string())))?;

        if bytes.is_empty() {
            return Ok(HashMap::new());
        }

        let response_batch = parse_response_envelope(&bytes).map_err(ClientError::Rpc)?;
        let mut out = HashMap::with_capacity(response_batch.items.len());
        for element in response_batch.items {
            let key = element.id.as_ref().map(|id| id.get().to_string()).unwrap_or_default();
            let outcome = match element.error {
                Some(err) => Err(err),
                None => Ok(element
                    .result
                    .unwrap_or_else(|| RawValue::from_string("null".to_string()).unwrap())),
            };
            out.insert(key, outcome);
        }
        Ok(out)
    }
}

fn dispatch_gone() -> ClientError {
    ClientError::Protocol(ProtocolError::Other("client dispatch task is gone".to_string()))
}

fn end_of_stream() -> ClientError {
    ClientError::Protocol(ProtocolError::CorrelationError(
        "connection closed with the call still pending".to_string(),
    ))
}

/// A handle to a call or batch submitted with [`Client::call_async`] /
/// [`Client::batch_async`], whose completion can be awaited independently of
/// the call site (§4.6).
pub struct CallHandle<R> {
    inner: tokio::task::JoinHandle<ClientResult<R>>,
}

impl<R> CallHandle<R> {
    /// Waits for the call to complete.
    pub async fn join(self) -> ClientResult<R> {
        match self.inner.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Protocol(ProtocolError::Other(
                "call task panicked".to_string(),
            ))),
        }
    }
}

/// The stream-mode dispatch loop (§4.6): one task owns the codec and
/// alternates between accepting new submissions to write and reading
/// response batches to correlate against the pending table.
async fn run_stream_dispatch<T>(io: T, mut submit_rx: mpsc::UnboundedReceiver<Submission>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut codec = StreamClientCodec::new(io);
    let mut pending: HashMap<String, oneshot::Sender<ResponseSlot>> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            submission = submit_rx.recv() => {
                match submission {
                    Some(submission) => {
                        if codec.write_request_batch(&submission.batch).await.is_err() {
                            for (_, waiter) in submission.waiters {
                                let _ = waiter.send(Err(PendingOutcome::EndOfStream));
                            }
                            break;
                        }
                        pending.extend(submission.waiters);
                    }
                    None => break,
                }
            }
            read = codec.read_response_batch() => {
                match read {
                    Ok(Some(batch)) => {
                        for element in batch.items {
                            let key = element.id.as_ref().map(|id| id.get().to_string()).unwrap_or_default();
                            let Some(waiter) = pending.remove(&key) else {
                                tracing::warn!(id = %key, "dropping response with no matching pending call");
                                continue;
                            };
                            let outcome = match element.error {
                                Some(err) => Err(PendingOutcome::Rpc(err)),
                                None => Ok(element
                                    .result
                                    .unwrap_or_else(|| RawValue::from_string("null".to_string()).unwrap())),
                            };
                            let _ = waiter.send(outcome);
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    for (_, waiter) in pending.drain() {
        let _ = waiter.send(Err(PendingOutcome::EndOfStream));
    }
    codec.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Callback, RpcService};
    use crate::server::Server;

    struct MathService;

    impl RpcService for MathService {
        fn namespace(&self) -> &str {
            "math"
        }

        fn into_callbacks(self) -> Vec<(String, Callback)> {
            vec![(
                "subtract".to_string(),
                Callback::from_fn2(|a: i64, b: i64| async move {
                    Ok::<_, crate::registry::RpcError>(a - b)
                }),
            )]
        }
    }

    #[tokio::test]
    async fn call_over_stream_returns_result() {
        let server = Arc::new(Server::new(false));
        server.register(MathService).unwrap();

        let (server_end, client_end) = tokio::io::duplex(4096);
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve_conn(server_end).await }
        });

        let client = Client::connect_stream(client_end);
        let result: i64 = client
            .call(CancellationToken::new(), "math.subtract", (42, 23))
            .await
            .unwrap();
        assert_eq!(result, 19);
    }

    #[tokio::test]
    async fn notice_does_not_wait_for_a_response() {
        let server = Arc::new(Server::new(false));
        server.register(MathService).unwrap();

        let (server_end, client_end) = tokio::io::duplex(4096);
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve_conn(server_end).await }
        });

        let client = Client::connect_stream(client_end);
        client
            .notice(CancellationToken::new(), "math.subtract", (1, 1))
            .await
            .unwrap();

        let result: i64 = client
            .call(CancellationToken::new(), "math.subtract", (10, 4))
            .await
            .unwrap();
        assert_eq!(result, 6);
    }

    #[tokio::test]
    async fn batch_correlates_each_element_by_id() {
        let server = Arc::new(Server::new(false));
        server.register(MathService).unwrap();

        let (server_end, client_end) = tokio::io::duplex(4096);
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve_conn(server_end).await }
        });

        let client = Client::connect_stream(client_end);
        let elements = vec![
            BatchElement::new("math.subtract", (10, 1)).unwrap(),
            BatchElement::new("math.subtract", (10, 2)).unwrap(),
            BatchElement::new("math.subtract", (10, 3)).unwrap(),
        ];
        let results = client.batch(CancellationToken::new(), elements).await.unwrap();
        assert_eq!(results.len(), 3);

        let values: Vec<i64> = results
            .into_iter()
            .map(|r| serde_json::from_str(r.unwrap().get()).unwrap())
            .collect();
        assert_eq!(values, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn call_fails_with_end_of_stream_after_connection_closes() {
        let (server_end, client_end) = tokio::io::duplex(4096);
        drop(server_end);

        let client = Client::connect_stream(client_end);
        let outcome: ClientResult<i64> = client.call(CancellationToken::new(), "math.subtract", (1, 1)).await;
        assert!(matches!(
            outcome,
            Err(ClientError::Protocol(ProtocolError::CorrelationError(_)))
        ));
    }

    #[tokio::test]
    async fn call_rejects_an_already_cancelled_token() {
        let (_server_end, client_end) = tokio::io::duplex(4096);
        let client = Client::connect_stream(client_end);
        let token = CancellationToken::new();
        token.cancel();

        let outcome: ClientResult<i64> = client.call(token, "math.subtract", (1, 1)).await;
        assert!(matches!(outcome, Err(ClientError::Protocol(ProtocolError::Other(_)))));
    }
}
