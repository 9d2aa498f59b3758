//! Service table: namespace → callbacks, plus the built-in `rpc` service (§4.1).
//!
//! A `namespace.method` two-part key, services merged in atomically, and no
//! runtime reflection: a service declares its callbacks through the
//! `RpcService` trait instead of being introspected (§9's
//! reflection-to-static-dispatch decision).

pub mod callback;

pub use callback::{ApplicationError, BoxApplicationError, Callback, CallbackError, RpcError};

use crate::error::protocol::ProtocolError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// A host-supplied group of callbacks registered under one namespace.
///
/// There is no runtime reflection in this binding: a type implements this
/// trait by listing its own `(method_name, Callback)` pairs, typically built
/// with the `Callback::from_fn*` constructors. The trait is generic-bound at
/// `Registry::register`, not object-safe, since `into_callbacks` consumes
/// `Self` by value.
pub trait RpcService {
    /// The dotted-prefix namespace this service registers under. Must be
    /// non-empty (§4.1).
    fn namespace(&self) -> &str;

    /// Consumes the service, yielding its named callbacks.
    fn into_callbacks(self) -> Vec<(String, Callback)>;
}

/// A registered namespace and its callback table (§3).
#[derive(Clone, Default)]
struct Service {
    callbacks: HashMap<String, Callback>,
}

/// The namespace → service table (§3, §4.1).
///
/// Cloning a `Registry` is cheap and shares the same underlying table — this
/// is how the built-in `rpc` service gets a handle to list the namespaces
/// and methods of the very registry it is registered into, without the
/// registry owning a strong reference to itself (see [`Registry::downgrade`]).
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, Service>>>,
}

impl Registry {
    /// Builds an empty registry. Callers construct a [`crate::server::Server`]
    /// instead of calling this directly in most cases; the server registers
    /// the built-in `rpc` service as part of its own construction.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A weak handle to this registry's table, suitable for a callback
    /// closure that needs to read the registry it is itself registered in
    /// without creating a reference cycle.
    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers `service`'s callbacks under its namespace (§4.1).
    ///
    /// Rejects an empty namespace or a service with no callbacks. If the
    /// namespace already exists, the registration is a merge: it succeeds
    /// only if none of the new method names collide with existing ones,
    /// and is atomic — either every new callback is inserted, or (on a
    /// name collision) none are and the existing service is left untouched.
    pub fn register<S: RpcService>(&self, service: S) -> Result<(), ProtocolError> {
        let namespace = service.namespace().to_string();
        if namespace.trim().is_empty() {
            return Err(ProtocolError::RegistrationError(
                "namespace must not be empty".to_string(),
            ));
        }

        let callbacks = service.into_callbacks();
        if callbacks.is_empty() {
            return Err(ProtocolError::RegistrationError(
                "no suitable methods".to_string(),
            ));
        }

        let mut table = self.inner.lock();
        match table.get(&namespace) {
            Some(existing) => {
                if let Some((dup, _)) = callbacks
                    .iter()
                    .find(|(name, _)| existing.callbacks.contains_key(name))
                {
                    return Err(ProtocolError::RegistrationError(format!(
                        "callback name exists: {namespace}.{dup}"
                    )));
                }
            }
            None => {}
        }

        let entry = table.entry(namespace).or_insert_with(Service::default);
        entry.callbacks.extend(callbacks);
        Ok(())
    }

    /// Looks up `namespace.method`, splitting on the first `.` (§4.1). Any
    /// shape other than exactly two non-empty parts is a lookup miss.
    pub fn lookup(&self, method: &str) -> Option<Callback> {
        let (namespace, name) = split_method(method)?;
        let table = self.inner.lock();
        table.get(namespace)?.callbacks.get(name).cloned()
    }

    /// All registered namespaces, for `rpc.modules` (§6).
    pub fn namespaces(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    /// The method names registered under `namespace`, for `rpc.module`
    /// (§6). Empty if the namespace does not exist.
    pub fn methods(&self, namespace: &str) -> Vec<String> {
        self.inner
            .lock()
            .get(namespace)
            .map(|service| service.callbacks.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn split_method(method: &str) -> Option<(&str, &str)> {
    let (namespace, name) = method.split_once('.')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace, name))
}

/// A non-owning handle to a [`Registry`]'s table (§9's "avoid a reference
/// cycle" note). Used by the built-in `rpc` service so it can introspect the
/// registry it lives inside without the registry holding a strong `Arc` to
/// itself through its own callback table.
#[derive(Clone)]
pub struct WeakRegistry {
    inner: Weak<Mutex<HashMap<String, Service>>>,
}

impl WeakRegistry {
    /// Re-forms a usable [`Registry`] handle, or `None` if every strong
    /// reference (held by the owning `Server`) has already been dropped.
    pub fn upgrade(&self) -> Option<Registry> {
        self.inner.upgrade().map(|inner| Registry { inner })
    }
}

/// The automatically-registered `rpc` namespace exposing registry
/// introspection: `rpc.modules()` and `rpc.module(namespace)` (§4.1, §6).
pub struct BuiltinRpcService {
    registry: WeakRegistry,
}

impl BuiltinRpcService {
    /// Builds the built-in service around a weak handle to the registry it
    /// will itself be registered into.
    pub fn new(registry: WeakRegistry) -> Self {
        Self { registry }
    }
}

impl RpcService for BuiltinRpcService {
    fn namespace(&self) -> &str {
        "rpc"
    }

    fn into_callbacks(self) -> Vec<(String, Callback)> {
        let modules_registry = self.registry.clone();
        let module_registry = self.registry;

        vec![
            (
                "modules".to_string(),
                Callback::from_fn0(move || {
                    let registry = modules_registry.clone();
                    async move {
                        let namespaces = registry
                            .upgrade()
                            .map(|r| r.namespaces())
                            .unwrap_or_default();
                        Ok::<_, RpcError>(namespaces)
                    }
                }),
            ),
            (
                "module".to_string(),
                Callback::from_fn1(move |namespace: String| {
                    let registry = module_registry.clone();
                    async move {
                        let methods = registry
                            .upgrade()
                            .map(|r| r.methods(&namespace))
                            .unwrap_or_default();
                        Ok::<_, RpcError>(methods)
                    }
                }),
            ),
        ]
    }
}
