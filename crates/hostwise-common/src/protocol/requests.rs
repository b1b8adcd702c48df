use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};
use serde_json::Value;
use std::time::Duration;

use super::error::{HostwiseError, Result};
use super::headers;

/// Query string attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Already-encoded query string, with or without the leading `?`
    Raw(String),
    /// Key/value pairs, form-encoded when the request is built
    Params(Vec<(String, String)>),
}

impl Query {
    fn encode(&self) -> String {
        match self {
            Query::Raw(raw) => raw.trim_start_matches('?').to_string(),
            Query::Params(params) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish(),
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Json(Value),
}

/// A logical request submitted to the dispatcher.
///
/// Built with the chained setters below and handed to
/// `Connection::request`. The dispatcher decides which host receives it
/// unless [`host`](Self::host) pins it to a registry index.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Registry index to pin the request to, bypassing load balancing
    pub host: Option<usize>,
    pub method: Method,
    /// Prefix prepended to `path`, e.g. a database scope
    pub base_path: Option<String>,
    pub path: Option<String>,
    pub query: Option<Query>,
    /// Extra headers, validated when the request is submitted
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Send byte bodies as `application/octet-stream`
    pub is_binary: bool,
    /// Keep non-JSON responses as raw bytes and tolerate undecodable JSON
    pub expect_binary: bool,
    /// Allow the request to be served by a follower
    pub allow_dirty_read: bool,
    /// Transport-level timeout for one attempt
    pub timeout: Option<Duration>,
    /// Re-submit up to this many times on write-write conflicts
    pub retry_on_conflict: Option<u32>,
    /// Maximum server-side queue time, in seconds
    pub max_queue_time: Option<f64>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            host: None,
            method,
            base_path: None,
            path: None,
            query: None,
            headers: Vec::new(),
            body: RequestBody::Empty,
            is_binary: false,
            expect_binary: false,
            allow_dirty_read: false,
            timeout: None,
            retry_on_conflict: None,
            max_queue_time: None,
        }
    }

    pub fn host(mut self, index: usize) -> Self {
        self.host = Some(index);
        self
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(Query::Raw(query.into()));
        self
    }

    /// Appends a key/value pair, replacing a raw query set earlier.
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let pair = (key.into(), value.into());
        match &mut self.query {
            Some(Query::Params(params)) => params.push(pair),
            _ => self.query = Some(Query::Params(vec![pair])),
        }
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self.is_binary = true;
        self
    }

    pub fn expect_binary(mut self, expect_binary: bool) -> Self {
        self.expect_binary = expect_binary;
        self
    }

    pub fn allow_dirty_read(mut self, allow: bool) -> Self {
        self.allow_dirty_read = allow;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_on_conflict(mut self, attempts: u32) -> Self {
        self.retry_on_conflict = Some(attempts);
        self
    }

    pub fn max_queue_time(mut self, seconds: f64) -> Self {
        self.max_queue_time = Some(seconds);
        self
    }

    /// Path relative to the host's base URL, including the query string.
    pub fn path_and_query(&self) -> String {
        let mut path = String::new();
        if let Some(base) = &self.base_path {
            path.push_str(base);
        }
        if let Some(p) = &self.path {
            path.push_str(p);
        }
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        if let Some(query) = &self.query {
            let encoded = query.encode();
            if !encoded.is_empty() {
                path.push('?');
                path.push_str(&encoded);
            }
        }

        path
    }

    /// Serializes the body and picks the content type it implies.
    pub fn encode_body(&self) -> Result<(Bytes, Option<&'static str>)> {
        match &self.body {
            RequestBody::Empty => Ok((Bytes::new(), None)),
            RequestBody::Json(value) => {
                Ok((Bytes::from(serde_json::to_vec(value)?), Some("application/json")))
            }
            RequestBody::Text(text) => {
                Ok((Bytes::from(text.clone()), Some("text/plain; charset=utf-8")))
            }
            RequestBody::Bytes(bytes) => {
                let content_type = self.is_binary.then_some("application/octet-stream");
                Ok((bytes.clone(), content_type))
            }
        }
    }

    /// Validates the caller's headers and adds the body and queue-time headers.
    pub fn header_map(&self, content_type: Option<&'static str>) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len() + 2);

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                HostwiseError::InvalidRequest(format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                HostwiseError::InvalidRequest(format!("Invalid value for header '{}': {}", name, e))
            })?;
            map.insert(name, value);
        }

        if let Some(content_type) = content_type {
            if !map.contains_key(CONTENT_TYPE) {
                map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        if let Some(seconds) = self.max_queue_time {
            let value = HeaderValue::from_str(&seconds.to_string()).map_err(|e| {
                HostwiseError::InvalidRequest(format!("Invalid max queue time: {}", e))
            })?;
            map.insert(headers::QUEUE_TIME_SECONDS, value);
        }

        Ok(map)
    }
}
