//! Error types for the WPT harness

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to resolve a URL through the virtual resource router.
///
/// Every variant surfaces as a 500 at the fetch boundary; the variants only
/// matter for logs and for callers inspecting the router directly.
#[derive(Error, Debug)]
pub enum RouteError {
    /// No route and no corpus file matched the URL
    #[error("Unexpected URL: {0}")]
    UnexpectedUrl(String),

    /// The URL targets a host other than the configured one
    #[error("Unexpected URL: {url} (origin {origin} is not {expected})")]
    OriginMismatch {
        url: String,
        origin: String,
        expected: String,
    },

    /// A bundled harness asset could not be read
    #[error("harness asset {path} unavailable: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request was aborted before it settled
    #[error("request canceled by user")]
    Cancelled,
}

impl RouteError {
    /// Whether the failure means "nothing is served here"
    pub fn is_unexpected_url(&self) -> bool {
        matches!(self, RouteError::UnexpectedUrl(_) | RouteError::OriginMismatch { .. })
    }
}

/// Failure of a single fetch through the resource loader
#[derive(Error, Debug)]
pub enum FetchError {
    /// The consumer aborted the request before it settled
    #[error("request canceled by user: {0}")]
    Aborted(String),

    /// The router could not produce the resource
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Failure of a document load or of a page script before the reporting
/// bridge is attached
#[derive(Error, Debug)]
pub enum LoadError {
    /// The document itself could not be fetched
    #[error("failed to load {url}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// The document could not be parsed
    #[error("malformed document {url}: {message}")]
    Malformed { url: String, message: String },

    /// A page script threw synchronously
    #[error("{message}")]
    Script { message: String, stack: String },
}

impl LoadError {
    /// Stack text reported for this failure
    pub fn stack(&self) -> String {
        match self {
            LoadError::Script { message, stack } if !stack.is_empty() => {
                format!("{}\n{}", message, stack)
            }
            other => {
                let mut text = other.to_string();
                let mut source = std::error::Error::source(other);
                while let Some(cause) = source {
                    text.push_str(&format!("\n    caused by: {}", cause));
                    source = cause.source();
                }
                text
            }
        }
    }
}

/// Main error type for a harness run.
///
/// Per-test failures never show up here; only failures that stop the whole
/// run do.
#[derive(Error, Debug)]
pub enum Error {
    /// The socket transport could not be started
    #[error("TransportError: {source}")]
    Transport {
        #[source]
        source: std::io::Error,
    },

    /// The corpus could not be enumerated
    #[error("DiscoveryError: {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    /// Invalid configuration
    #[error("ConfigError: {0}")]
    Config(String),
}

impl Error {
    /// Create a discovery error
    pub fn discovery(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Error::Discovery {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for harness runs
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_url_message() {
        let err = RouteError::UnexpectedUrl("http://127.0.0.1:1/nope.txt".to_string());
        assert_eq!(err.to_string(), "Unexpected URL: http://127.0.0.1:1/nope.txt");
        assert!(err.is_unexpected_url());
    }

    #[test]
    fn test_origin_mismatch_is_unexpected_url() {
        let err = RouteError::OriginMismatch {
            url: "http://example.com/a.html".to_string(),
            origin: "http://example.com".to_string(),
            expected: "http://127.0.0.1:8000".to_string(),
        };
        assert!(err.to_string().starts_with("Unexpected URL: http://example.com/a.html"));
        assert!(err.is_unexpected_url());
        assert!(!RouteError::Cancelled.is_unexpected_url());
    }

    #[test]
    fn test_load_error_stack_includes_cause() {
        let err = LoadError::Fetch {
            url: "http://127.0.0.1:1/nope.txt".to_string(),
            source: FetchError::Route(RouteError::UnexpectedUrl(
                "http://127.0.0.1:1/nope.txt".to_string(),
            )),
        };
        let stack = err.stack();
        assert!(stack.starts_with("failed to load http://127.0.0.1:1/nope.txt"));
        assert!(stack.contains("caused by: Unexpected URL"));
    }

    #[test]
    fn test_script_error_stack() {
        let err = LoadError::Script {
            message: "ReferenceError: x is not defined".to_string(),
            stack: "    at <anonymous>:1:1".to_string(),
        };
        assert_eq!(err.stack(), "ReferenceError: x is not defined\n    at <anonymous>:1:1");
    }
}
