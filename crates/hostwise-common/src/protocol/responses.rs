//! hostwise Response Types
//!
//! A [`Response`] is what the dispatcher resolves a request with once the
//! response classifier has decided it is a success.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{HostwiseError, Result};

/// Decoded response body.
///
/// Bodies whose content type names JSON (or JavaScript) are parsed into
/// [`ResponseBody::Json`]. Everything else stays text, or raw bytes when the
/// request asked for a binary response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
    Binary(Bytes),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// Lossy text rendering, used for error messages.
    pub fn to_text(&self) -> String {
        match self {
            ResponseBody::Empty => String::new(),
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// A successful response.
///
/// # Fields
///
/// - `status`: HTTP status returned by the server
/// - `headers`: response headers
/// - `body`: decoded body
/// - `served_by`: registry index of the host that produced the response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub served_by: usize,
}

impl Response {
    pub fn json(&self) -> Option<&Value> {
        self.body.as_json()
    }

    /// Deserializes a JSON body into `T`.
    ///
    /// Fails with [`HostwiseError::InvalidRequest`] when the body is not JSON.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Json(value) => Ok(T::deserialize(value)?),
            other => Err(HostwiseError::InvalidRequest(format!(
                "Expected a JSON body, got {}",
                match other {
                    ResponseBody::Empty => "an empty body",
                    ResponseBody::Text(_) => "text",
                    _ => "binary data",
                }
            ))),
        }
    }
}
