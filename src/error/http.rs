//! HTTP transport error module.
//!
//! This module defines error types that may occur during the HTTP binding of
//! the JSON-RPC transport, on both the server and client side.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during HTTP transport operations.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Error when creating the underlying HTTP connection.
    #[error("Failed to create connection: {0}")]
    ConnectionCreationError(String),

    /// Error when a request fails due to a timeout.
    #[error("Request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// Error when a request results in a non-2xx HTTP status code.
    #[error("HTTP error status: {status} - {message}")]
    HttpStatus {
        /// The HTTP status code
        status: u16,
        /// The response body or reason phrase
        message: String,
    },

    /// Error when a response cannot be decoded.
    #[error("Response decode error: {0}")]
    ResponseDecodeError(String),

    /// Error when an incoming request is malformed per §4.4's header rules
    /// (wrong method, oversized body, unexpected content type).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when the dial endpoint's URL is invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Other HTTP transport errors.
    #[error("HTTP transport error: {0}")]
    Other(String),
}
