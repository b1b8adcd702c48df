use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// `errorNum` reported by the server for write-write conflicts.
pub const ERROR_CONFLICT: i64 = 1200;

/// Failure raised by a host transport before any response was received.
///
/// The variant is decided where the failure happens, so the dispatcher never
/// has to inspect error messages to find out whether a retry is allowed.
/// Only [`TransportError::ConnectionRefused`] is eligible for automatic retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection refused by {url}")]
    ConnectionRefused { url: String },

    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Network error talking to {url}: {message}")]
    Network { url: String, message: String },

    #[error("Could not build request for {url}: {message}")]
    Request { url: String, message: String },
}

impl TransportError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, TransportError::ConnectionRefused { .. })
    }

    /// Endpoint the failed call was sent to.
    pub fn url(&self) -> &str {
        match self {
            TransportError::ConnectionRefused { url }
            | TransportError::Timeout { url, .. }
            | TransportError::Network { url, .. }
            | TransportError::Request { url, .. } => url,
        }
    }
}

/// Structured error reported by the server in the response body.
///
/// A body is treated as an application error when it is an object carrying
/// all of `error`, `code`, `errorMessage` and `errorNum`, whatever the HTTP
/// status was.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (errorNum {error_num}, code {code})")]
pub struct ApplicationError {
    /// HTTP-like code reported in the body
    pub code: u16,
    /// Server-specific error number
    pub error_num: i64,
    /// Human readable message
    pub message: String,
    /// HTTP status the response actually carried
    pub status: u16,
    /// The complete decoded body
    pub body: Value,
}

impl ApplicationError {
    /// Returns `true` if `body` has the four keys of the structured error shape.
    pub fn matches(body: &Value) -> bool {
        match body.as_object() {
            Some(obj) => ["error", "code", "errorMessage", "errorNum"]
                .iter()
                .all(|key| obj.contains_key(*key)),
            None => false,
        }
    }

    /// Extracts an application error from a decoded body, if it has the shape.
    pub fn from_body(status: u16, body: &Value) -> Option<Self> {
        if !Self::matches(body) {
            return None;
        }

        let code = body["code"]
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(status);
        let message = match &body["errorMessage"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Some(Self {
            code,
            error_num: body["errorNum"].as_i64().unwrap_or_default(),
            message,
            status,
            body: body.clone(),
        })
    }

    pub fn is_conflict(&self) -> bool {
        self.error_num == ERROR_CONFLICT
    }
}

#[derive(Error, Debug)]
pub enum HostwiseError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Application error: {0}")]
    Application(#[from] ApplicationError),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse response body (HTTP {status}): {source}")]
    Parse {
        status: u16,
        raw: Bytes,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    Closed,
}

impl HostwiseError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        HostwiseError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status associated with the error, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostwiseError::Application(e) => Some(e.status),
            HostwiseError::Http { status, .. } | HostwiseError::Parse { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostwiseError>;
