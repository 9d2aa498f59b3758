//! The endpoint dial scheme and the stream transports it can resolve to
//! (§6): Unix domain sockets and an in-process duplex pipe. HTTP resolves
//! to a scheme recognized here but dialed through [`crate::client::Client`]'s
//! own HTTP mode, not through a stream connection.

use crate::error::transport::TransportError;
use reqwest::Url;
use std::path::PathBuf;
use tokio::io::DuplexStream;
use tokio::net::{UnixListener, UnixStream};

/// What an endpoint string resolves to (§6's dial scheme table).
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// `unix://path` or a bare path with no scheme: a Unix domain socket.
    Unix(PathBuf),
    /// `http://` or `https://host:port/...`: dial through the HTTP client.
    Http(Url),
}

/// Parses an endpoint string per §6: `http`/`https` → HTTP, empty scheme →
/// Unix socket, `ws`/`wss`/`stdio` → not-implemented, anything else →
/// unknown scheme.
pub fn parse_endpoint(endpoint: &str) -> Result<Endpoint, TransportError> {
    if let Some(rest) = endpoint.strip_prefix("unix://") {
        return Ok(Endpoint::Unix(PathBuf::from(rest)));
    }

    match Url::parse(endpoint) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Endpoint::Http(url)),
            "ws" | "wss" | "stdio" => {
                Err(TransportError::NotImplemented(url.scheme().to_string()))
            }
            other => Err(TransportError::UnknownScheme(other.to_string())),
        },
        // A bare filesystem path has no URL scheme at all; `Url::parse`
        // rejects it outright rather than reporting an empty scheme.
        Err(_) => Ok(Endpoint::Unix(PathBuf::from(endpoint))),
    }
}

/// Binds a Unix domain socket listener at `path`, removing a stale socket
/// file left behind by an unclean shutdown first.
pub fn bind_unix(path: &std::path::Path) -> Result<UnixListener, TransportError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path).map_err(TransportError::from)
}

/// Connects to a Unix domain socket at `path` (client-side dial).
pub async fn connect_unix(path: &std::path::Path) -> Result<UnixStream, TransportError> {
    UnixStream::connect(path).await.map_err(TransportError::from)
}

/// Builds a pair of connected in-process duplex streams for embedded use
/// (§6): one end plays the server's connection, the other the client's.
pub fn duplex_pair(buffer_size: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(buffer_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_and_https_resolve_to_http_endpoint() {
        assert!(matches!(
            parse_endpoint("http://localhost:8765/").unwrap(),
            Endpoint::Http(_)
        ));
        assert!(matches!(
            parse_endpoint("https://example.com/rpc").unwrap(),
            Endpoint::Http(_)
        ));
    }

    #[test]
    fn unix_scheme_and_bare_path_resolve_to_unix_endpoint() {
        match parse_endpoint("unix:///tmp/kahiko.sock").unwrap() {
            Endpoint::Unix(path) => assert_eq!(path, PathBuf::from("/tmp/kahiko.sock")),
            _ => panic!("expected a unix endpoint"),
        }

        match parse_endpoint("/tmp/kahiko.sock").unwrap() {
            Endpoint::Unix(path) => assert_eq!(path, PathBuf::from("/tmp/kahiko.sock")),
            _ => panic!("expected a unix endpoint"),
        }
    }

    #[test]
    fn reserved_schemes_are_not_implemented() {
        assert!(matches!(
            parse_endpoint("ws://localhost/"),
            Err(TransportError::NotImplemented(_))
        ));
        assert!(matches!(
            parse_endpoint("stdio://"),
            Err(TransportError::NotImplemented(_))
        ));
    }

    #[test]
    fn unrecognized_scheme_is_unknown() {
        assert!(matches!(
            parse_endpoint("ftp://example.com/"),
            Err(TransportError::UnknownScheme(_))
        ));
    }
}
