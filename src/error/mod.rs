//! Error module for the Kahiko RPC framework.
//!
//! This module provides a comprehensive error handling framework for the entire crate,
//! following Rust's idiomatic error handling patterns with explicit error types,
//! proper error propagation, and helpful context information.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod http;
pub mod protocol;
pub mod transport;

/// Result type alias used throughout the Kahiko RPC framework.
pub type KahikoResult<T> = Result<T, KahikoError>;

/// Core error enum for the Kahiko RPC framework.
#[derive(Error, Debug)]
pub enum KahikoError {
    /// Errors occurring during configuration loading or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Errors related to JSON-RPC protocol handling.
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    /// Errors related to transport mechanisms (stream, in-process, HTTP).
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Errors related to HTTP client operations.
    #[error("HTTP client error: {0}")]
    Http(#[from] http::HttpError),

    /// IO errors that may occur during file or socket operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/Deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Custom error with message for cases where specific error types are not defined.
    #[error("{0}")]
    Custom(String),
}

/// Error reporting structure to provide context and debugging information.
#[derive(Debug)]
pub struct ErrorContext {
    /// The original error that occurred.
    pub error: KahikoError,

    /// The component where the error occurred.
    pub component: String,

    /// Additional context information to help with debugging.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Creates a new error context with the given error and component.
    pub fn new<S: Into<String>>(error: KahikoError, component: S) -> Self {
        Self {
            error,
            component: component.into(),
            details: None,
        }
    }

    /// Adds detail information to the error context.
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error in {}: {}", self.component, self.error)?;
        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }
        Ok(())
    }
}

/// Error reporter trait for reporting errors to various sinks.
pub trait ErrorReporter: Send + Sync + std::fmt::Debug {
    /// Report an error with context.
    fn report(&self, context: ErrorContext);
}

/// A simple error reporter implementation that logs errors using the tracing framework.
#[derive(Default, Debug)]
pub struct TracingErrorReporter;

impl TracingErrorReporter {
    /// Creates a new tracing-backed error reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: ErrorContext) {
        tracing::error!(
            error = %context.error,
            component = %context.component,
            details = context.details.as_deref().unwrap_or("None"),
            "error reported"
        );
    }
}

/// Holds a reporter instance and dispatches error reports to it.
///
/// This is not a process-wide global: a [`Server`](crate::server::Server) or
/// [`Client`](crate::client::Client) is constructed with one and owns it for
/// its lifetime, per the crate's "no global mutable state" design decision
/// (see `DESIGN.md`).
#[derive(Debug, Clone)]
pub struct ErrorReporting {
    reporter: Arc<dyn ErrorReporter>,
}

impl ErrorReporting {
    /// Builds a reporting sink around the given reporter.
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }

    /// Report an error with context.
    pub fn report(&self, context: ErrorContext) {
        self.reporter.report(context);
    }
}

impl Default for ErrorReporting {
    fn default() -> Self {
        Self::new(Arc::new(TracingErrorReporter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let error = KahikoError::Custom("test error".to_string());
        let context = ErrorContext::new(error, "test_component").with_details("additional details");

        let display_string = format!("{context}");
        assert!(display_string.contains("test error"));
        assert!(display_string.contains("test_component"));
        assert!(display_string.contains("additional details"));
    }

    #[test]
    fn test_nested_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let kahiko_error = KahikoError::Io(io_error);

        let error_string = format!("{kahiko_error}");
        assert!(error_string.contains("file not found"));
    }

    #[derive(Debug)]
    struct MockErrorReporter {
        reported_count: std::sync::atomic::AtomicUsize,
    }

    impl MockErrorReporter {
        fn new() -> Self {
            Self {
                reported_count: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn reported_count(&self) -> usize {
            self.reported_count.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl ErrorReporter for MockErrorReporter {
        fn report(&self, _context: ErrorContext) {
            self.reported_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_error_reporting_dispatches_to_reporter() {
        let reporter = Arc::new(MockErrorReporter::new());
        let reporting = ErrorReporting::new(reporter.clone());

        let error = KahikoError::Custom("test error".to_string());
        reporting.report(ErrorContext::new(error, "test_component"));

        assert_eq!(reporter.reported_count(), 1);
    }

    #[test]
    fn test_tracing_error_reporter_does_not_panic() {
        let reporter = TracingErrorReporter::new();
        let error = KahikoError::Custom("test error".to_string());
        reporter.report(ErrorContext::new(error, "test_component"));
    }
}
