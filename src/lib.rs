//! Kahiko RPC
//!
//! A transport-agnostic JSON-RPC 2.0 framework: a statically-dispatched
//! service registry, an async request dispatcher, a call-multiplexing
//! client, and the stream/HTTP transports that carry them.
//!
//! # Architecture
//!
//! - [`config`] loads layered configuration (defaults, file, environment).
//! - [`error`] is the crate-wide error taxonomy.
//! - [`registry`] holds registered services and their callbacks.
//! - [`protocol`] is the wire-level message model and the JSON-RPC 2.0 codec.
//! - [`server`] accepts connections and dispatches requests against a registry.
//! - [`client`] multiplexes calls over a stream connection or HTTP.
//! - [`transport`] resolves an endpoint string to a concrete connection.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

/// Crate version, as set in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
