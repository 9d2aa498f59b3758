//! A single invocable endpoint and its type-erased dispatch glue.
//!
//! There is no runtime reflection here: a [`Callback`] is built from one of
//! the `Callback::from_fn*` constructors below, each wrapping a concrete
//! closure in the type-erased `(CancellationToken, Vec<Value>) -> Result<Value,
//! CallbackError>` shape the [`crate::registry::Registry`] and
//! [`crate::protocol::jsonrpc::handler`] dispatch against, deserializing
//! positional JSON values into the closure's declared argument types and
//! serializing its `Result` back into a `Value`.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default JSON-RPC application error code, per the error taxonomy.
pub const DEFAULT_APPLICATION_ERROR_CODE: i64 = -32000;

/// Lets an application error override the default JSON-RPC error code and
/// attach structured `data`. The error's `message` always comes from its
/// `Display` implementation (required by the `std::error::Error` supertrait).
///
/// This collapses message/code/data into a single trait with overridable
/// provided methods: a present override wins, anything left unimplemented
/// falls back to the default (see `DESIGN.md`).
pub trait ApplicationError: std::error::Error + Send + Sync + 'static {
    /// The JSON-RPC error code to report. Defaults to -32000.
    fn rpc_code(&self) -> i64 {
        DEFAULT_APPLICATION_ERROR_CODE
    }

    /// Optional structured data to attach to the error response.
    fn rpc_data(&self) -> Option<Value> {
        None
    }
}

/// A boxed application error produced by a callback.
pub type BoxApplicationError = Box<dyn ApplicationError>;

/// A convenience concrete application error for callbacks that do not want
/// to define their own error type.
#[derive(Debug)]
pub struct RpcError {
    message: String,
    code: i64,
    data: Option<Value>,
}

impl RpcError {
    /// Builds a new application error with the default code and no data.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: DEFAULT_APPLICATION_ERROR_CODE,
            data: None,
        }
    }

    /// Overrides the JSON-RPC error code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    /// Attaches structured data to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RpcError {}

impl ApplicationError for RpcError {
    fn rpc_code(&self) -> i64 {
        self.code
    }

    fn rpc_data(&self) -> Option<Value> {
        self.data.clone()
    }
}

/// The outcome of attempting to invoke a callback.
#[derive(Debug)]
pub enum CallbackError {
    /// The positional parameters could not be decoded into the callback's
    /// declared argument types (wrong shape, wrong count, wrong type).
    InvalidParams(String),

    /// The callback ran and returned an application-level error.
    Application(BoxApplicationError),

    /// The callback's successful result could not be serialized.
    Internal(String),
}

type InvokeFn = dyn Fn(CancellationToken, Vec<Value>) -> BoxFuture<'static, Result<Value, CallbackError>>
    + Send
    + Sync;

/// One invocable method: how many positional arguments it declares, whether
/// the framework should prepend a cancellation token, and the type-erased
/// glue that decodes, invokes, and encodes.
#[derive(Clone)]
pub struct Callback {
    arity: usize,
    has_context: bool,
    handler: Arc<InvokeFn>,
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("arity", &self.arity)
            .field("has_context", &self.has_context)
            .finish()
    }
}

impl Callback {
    /// Declared positional argument count (not counting the cancellation token).
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether this callback wants a cancellation token as its first argument.
    pub fn has_context(&self) -> bool {
        self.has_context
    }

    /// Invokes the callback with the given cancellation token and positional
    /// JSON argument values.
    pub async fn invoke(
        &self,
        token: CancellationToken,
        params: Vec<Value>,
    ) -> Result<Value, CallbackError> {
        (self.handler)(token, params).await
    }
}

fn decode_arg<T: DeserializeOwned>(params: &[Value], index: usize) -> Result<T, CallbackError> {
    match params.get(index) {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| CallbackError::InvalidParams(format!("argument {index}: {e}"))),
        None => serde_json::from_value(Value::Null)
            .map_err(|_| CallbackError::InvalidParams(format!("missing value for required argument {index}"))),
    }
}

fn encode_result<R: Serialize>(value: R) -> Result<Value, CallbackError> {
    serde_json::to_value(value).map_err(|e| CallbackError::Internal(e.to_string()))
}

fn finish<R, E>(result: Result<R, E>) -> Result<Value, CallbackError>
where
    R: Serialize,
    E: ApplicationError,
{
    match result {
        Ok(value) => encode_result(value),
        Err(error) => Err(CallbackError::Application(Box::new(error))),
    }
}

macro_rules! impl_from_fn {
    ($ctor:ident, $ctor_ctx:ident, $arity:expr, [$($arg:ident : $idx:expr),*]) => {
        impl Callback {
            #[doc = "Builds a callback from a closure with the given positional arity, no cancellation token."]
            pub fn $ctor<F, Fut, $($arg,)* R, E>(f: F) -> Callback
            where
                F: Fn($($arg),*) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = Result<R, E>> + Send + 'static,
                $($arg: DeserializeOwned + Send + 'static,)*
                R: Serialize + Send + 'static,
                E: ApplicationError,
            {
                #[allow(unused_variables)]
                let handler = move |_token: CancellationToken, params: Vec<Value>| -> BoxFuture<'static, Result<Value, CallbackError>> {
                    $(let $arg = match decode_arg::<$arg>(&params, $idx) {
                        Ok(v) => v,
                        Err(e) => return Box::pin(async move { Err(e) }),
                    };)*
                    let fut = f($($arg),*);
                    Box::pin(async move { finish(fut.await) })
                };
                Callback {
                    arity: $arity,
                    has_context: false,
                    handler: Arc::new(handler),
                }
            }

            #[doc = "Builds a callback from a closure that additionally receives a cancellation token as its first argument."]
            pub fn $ctor_ctx<F, Fut, $($arg,)* R, E>(f: F) -> Callback
            where
                F: Fn(CancellationToken, $($arg),*) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = Result<R, E>> + Send + 'static,
                $($arg: DeserializeOwned + Send + 'static,)*
                R: Serialize + Send + 'static,
                E: ApplicationError,
            {
                #[allow(unused_variables)]
                let handler = move |token: CancellationToken, params: Vec<Value>| -> BoxFuture<'static, Result<Value, CallbackError>> {
                    $(let $arg = match decode_arg::<$arg>(&params, $idx) {
                        Ok(v) => v,
                        Err(e) => return Box::pin(async move { Err(e) }),
                    };)*
                    let fut = f(token, $($arg),*);
                    Box::pin(async move { finish(fut.await) })
                };
                Callback {
                    arity: $arity,
                    has_context: true,
                    handler: Arc::new(handler),
                }
            }
        }
    };
}

impl_from_fn!(from_fn0, from_fn0_ctx, 0, []);
impl_from_fn!(from_fn1, from_fn1_ctx, 1, [A1: 0]);
impl_from_fn!(from_fn2, from_fn2_ctx, 2, [A1: 0, A2: 1]);
impl_from_fn!(from_fn3, from_fn3_ctx, 3, [A1: 0, A2: 1, A3: 2]);
impl_from_fn!(from_fn4, from_fn4_ctx, 4, [A1: 0, A2: 1, A3: 2, A4: 3]);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_fn2_subtracts() {
        let callback = Callback::from_fn2(|a: i64, b: i64| async move { Ok::<_, RpcError>(a - b) });
        let token = CancellationToken::new();
        let result = callback
            .invoke(token, vec![Value::from(42), Value::from(23)])
            .await
            .unwrap();
        assert_eq!(result, Value::from(19));
    }

    #[tokio::test]
    async fn test_too_few_args_on_required_param_fails() {
        let callback = Callback::from_fn1(|a: i64| async move { Ok::<_, RpcError>(a) });
        let token = CancellationToken::new();
        let result = callback.invoke(token, vec![]).await;
        assert!(matches!(result, Err(CallbackError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_missing_optional_arg_defaults_to_none() {
        let callback =
            Callback::from_fn1(|a: Option<i64>| async move { Ok::<_, RpcError>(a.is_none()) });
        let token = CancellationToken::new();
        let result = callback.invoke(token, vec![]).await.unwrap();
        assert_eq!(result, Value::from(true));
    }

    #[tokio::test]
    async fn test_application_error_carries_custom_code() {
        let callback = Callback::from_fn0(|| async move {
            Err::<(), _>(RpcError::new("boom").with_code(-32050))
        });
        let token = CancellationToken::new();
        let result = callback.invoke(token, vec![]).await;
        match result {
            Err(CallbackError::Application(e)) => assert_eq!(e.rpc_code(), -32050),
            other => panic!("expected application error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_context_variant_receives_token() {
        let callback = Callback::from_fn0_ctx(|token: CancellationToken| async move {
            Ok::<_, RpcError>(token.is_cancelled())
        });
        let token = CancellationToken::new();
        token.cancel();
        let result = callback.invoke(token, vec![]).await.unwrap();
        assert_eq!(result, Value::from(true));
    }
}
