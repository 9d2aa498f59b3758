//! Per-request dispatch: classification, callback invocation, and batch
//! fan-out/gather (§4.3).

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::value::to_raw_value;
use tokio_util::sync::CancellationToken;

use super::codec::decode_positional_params;
use super::error::JsonRpcError;
use super::types::{RequestBatch, RequestMessage, ResponseBatch, ResponseMessage};
use crate::registry::{CallbackError, Registry};

/// Dispatches one decoded request batch and gathers the response batch
/// (§4.3). Each element is classified and (for callables and malformed
/// shapes) dispatched concurrently on its own task; notifications run for
/// their side effects only and never contribute a response element.
/// Responses are collected in completion order, not input order, and the
/// outgoing `is_array` flag is propagated unchanged from the request batch.
///
/// `debug_errors` controls whether an application error's response message
/// is extended with its full source chain (§7).
pub async fn dispatch_batch(
    registry: &Registry,
    token: CancellationToken,
    batch: RequestBatch,
    debug_errors: bool,
) -> ResponseBatch {
    let is_array = batch.is_array;

    let mut pending = FuturesUnordered::new();
    for request in batch.items {
        let registry = registry.clone();
        let token = token.clone();
        pending.push(tokio::spawn(async move {
            dispatch_one(&registry, token, request, debug_errors).await
        }));
    }

    let mut items = Vec::new();
    while let Some(joined) = pending.next().await {
        if let Ok(Some(response)) = joined {
            items.push(response);
        }
    }

    ResponseBatch { items, is_array }
}

/// Classifies and, if callable, dispatches one request element (§4.3).
/// Returns `None` for notifications — no response is ever produced for one.
async fn dispatch_one(
    registry: &Registry,
    token: CancellationToken,
    request: RequestMessage,
    debug_errors: bool,
) -> Option<ResponseMessage> {
    if request.is_notification() {
        dispatch_for_effect(registry, token, &request).await;
        return None;
    }

    if request.is_callable() {
        return Some(dispatch_callable(registry, token, &request, debug_errors).await);
    }

    if request.has_valid_id() {
        // Valid id, but an unusable shape (empty method): echo the id.
        return Some(ResponseMessage::failure(
            request.id.clone(),
            JsonRpcError::invalid_request(),
        ));
    }

    // Missing or malformed id: respond with id null (§4.3, §8 scenario 5).
    Some(ResponseMessage::failure(None, JsonRpcError::invalid_request()))
}

/// Runs a notification's callback purely for its side effects, if a
/// matching one is registered (§9).
async fn dispatch_for_effect(registry: &Registry, token: CancellationToken, request: &RequestMessage) {
    let Some(callback) = registry.lookup(&request.method) else {
        return;
    };
    let Ok(params) = decode_positional_params(request.params.as_deref(), callback.arity()) else {
        return;
    };
    let _ = callback.invoke(token, params).await;
}

/// Dispatch of a callable request: lookup → decode params → invoke →
/// marshal (§4.3).
async fn dispatch_callable(
    registry: &Registry,
    token: CancellationToken,
    request: &RequestMessage,
    debug_errors: bool,
) -> ResponseMessage {
    let id = request.id.clone();

    let Some(callback) = registry.lookup(&request.method) else {
        return ResponseMessage::failure(id, JsonRpcError::method_not_found());
    };

    let params = match decode_positional_params(request.params.as_deref(), callback.arity()) {
        Ok(params) => params,
        Err(err) => return ResponseMessage::failure(id, err),
    };

    match callback.invoke(token, params).await {
        Ok(value) => match to_raw_value(&value) {
            Ok(raw) => ResponseMessage::success(id, raw),
            Err(err) => ResponseMessage::failure(id, JsonRpcError::internal_error(err.to_string())),
        },
        Err(CallbackError::InvalidParams(detail)) => {
            ResponseMessage::failure(id, JsonRpcError::invalid_params(detail))
        }
        Err(CallbackError::Internal(detail)) => {
            ResponseMessage::failure(id, JsonRpcError::internal_error(detail))
        }
        Err(CallbackError::Application(error)) => ResponseMessage::failure(
            id,
            JsonRpcError::from_application_error(error.as_ref(), debug_errors),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Callback, RpcError, RpcService};
    use serde_json::value::RawValue;

    struct MathService;

    impl RpcService for MathService {
        fn namespace(&self) -> &str {
            "math"
        }

        fn into_callbacks(self) -> Vec<(String, Callback)> {
            vec![
                (
                    "subtract".to_string(),
                    Callback::from_fn2(|a: i64, b: i64| async move { Ok::<_, RpcError>(a - b) }),
                ),
                (
                    "update".to_string(),
                    Callback::from_fn1(|_values: Vec<i64>| async move { Ok::<_, RpcError>(()) }),
                ),
                (
                    "boom".to_string(),
                    Callback::from_fn0(|| async move {
                        Err::<(), _>(RpcError::new("boom").with_code(-32050))
                    }),
                ),
            ]
        }
    }

    fn registry_with_math() -> Registry {
        let registry = Registry::new();
        registry.register(MathService).unwrap();
        registry
    }

    fn req(id: Option<&str>, method: &str, params: Option<&str>) -> RequestMessage {
        RequestMessage {
            id: id.map(|s| RawValue::from_string(s.to_string()).unwrap()),
            method: method.to_string(),
            params: params.map(|s| RawValue::from_string(s.to_string()).unwrap()),
        }
    }

    #[tokio::test]
    async fn scenario_1_successful_call() {
        let registry = registry_with_math();
        let batch = RequestBatch::single(req(Some("1"), "math.subtract", Some("[42,23]")));
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        assert_eq!(response.len(), 1);
        assert_eq!(response.items[0].result.as_ref().unwrap().get(), "19");
    }

    #[tokio::test]
    async fn scenario_2_notification_produces_no_response() {
        let registry = registry_with_math();
        let batch = RequestBatch::single(req(None, "math.update", Some("[[1,2,3,4,5]]")));
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn scenario_3_unknown_method() {
        let registry = registry_with_math();
        let batch = RequestBatch::single(req(Some("\"1\""), "foobar", None));
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        assert_eq!(response.items[0].error.as_ref().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn unusable_shape_echoes_id() {
        let registry = registry_with_math();
        let batch = RequestBatch::single(req(Some("\"5\""), "", None));
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        let item = &response.items[0];
        assert_eq!(item.error.as_ref().unwrap().code, -32600);
        assert_eq!(item.id.as_ref().unwrap().get(), "\"5\"");
    }

    #[tokio::test]
    async fn malformed_id_responds_with_null_id() {
        let registry = registry_with_math();
        let batch = RequestBatch::single(req(Some("{}"), "math.subtract", Some("[1,2]")));
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        let item = &response.items[0];
        assert_eq!(item.error.as_ref().unwrap().code, -32600);
        assert!(item.id.is_none());
    }

    #[tokio::test]
    async fn application_error_carries_its_code() {
        let registry = registry_with_math();
        let batch = RequestBatch::single(req(Some("1"), "math.boom", None));
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        assert_eq!(response.items[0].error.as_ref().unwrap().code, -32050);
    }

    #[tokio::test]
    async fn scenario_6_mixed_batch() {
        let registry = registry_with_math();
        let items = vec![
            req(Some("\"1\""), "math.subtract", Some("[1,1]")),
            req(None, "math.update", Some("[[1]]")),
            req(Some("\"2\""), "math.subtract", Some("[42,23]")),
            req(Some("\"5\""), "", None),
            req(Some("\"9\""), "math.missing", None),
        ];
        let batch = RequestBatch::array(items);
        let response = dispatch_batch(&registry, CancellationToken::new(), batch, false).await;
        // One element (the notification) never contributes a response.
        assert_eq!(response.len(), 4);
        assert!(response.is_array);

        let ids: Vec<String> = response
            .items
            .iter()
            .map(|r| r.id.as_ref().map(|i| i.get().to_string()).unwrap_or_default())
            .collect();
        assert!(ids.contains(&"\"1\"".to_string()));
        assert!(ids.contains(&"\"2\"".to_string()));
        assert!(ids.contains(&"\"5\"".to_string()));
        assert!(ids.contains(&"\"9\"".to_string()));
    }
}
