//! Transport error module.
//!
//! Errors from the stream transports (Unix domain socket, in-process pipe)
//! and the endpoint dial scheme (§6). WebSocket and stdio are reserved
//! scheme names recognized by the dial scheme only so they produce
//! `NotImplemented` rather than `UnknownScheme` — neither transport exists
//! in this binding.

use std::io;
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O failure on the underlying stream (socket, pipe, or HTTP body).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection; any calls still awaiting a response
    /// on it fail with this (§4.6, §7 propagation policy).
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport is already closed and cannot be read from or written to.
    #[error("transport closed")]
    Closed,

    /// An endpoint named a scheme this crate recognizes but does not
    /// implement (`ws`, `wss`, `stdio`; §6 dial scheme).
    #[error("transport not implemented: {0}")]
    NotImplemented(String),

    /// An endpoint named a scheme this crate has no transport for at all.
    #[error("no known transport for url scheme: {0}")]
    UnknownScheme(String),

    /// The endpoint string could not be parsed as a URL or a bare path.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Other transport errors.
    #[error("transport error: {0}")]
    Other(String),
}
