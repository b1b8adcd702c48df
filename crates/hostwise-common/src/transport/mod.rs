//! hostwise Transport Layer
//!
//! Every registered host owns one transport handle. The dispatcher never
//! talks to sockets itself: it hands a [`TransportRequest`] to the host's
//! [`HostTransport`] and gets back either a [`TransportResponse`] or a
//! [`TransportError`](crate::TransportError).
//!
//! # Components
//!
//! - **[`normalize_url`]** / **[`Endpoint`]**: protocol aliasing and endpoint parsing
//! - **[`HostTransport`]**: one host's request executor
//! - **[`TransportFactory`]**: builds transports when hosts are registered
//! - **[`HttpTransport`]**: hyper-based transport for `http`, `https` and unix sockets
//!
//! # Example
//!
//! ```no_run
//! use hostwise_common::transport::{ConnectionOptions, HostTransport, HttpTransport, TransportRequest};
//! use hostwise_common::Method;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("http://127.0.0.1:8529", &ConnectionOptions::default())?;
//! let response = transport
//!     .send(TransportRequest::new(Method::GET, "/_api/version"))
//!     .await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod http;


use bytes::Bytes;
use futures::future::BoxFuture;
use ::http::{HeaderMap, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::error::{Result, TransportError};

pub use endpoint::{normalize_url, Endpoint};
pub use self::http::{HttpTransport, HttpTransportFactory};

/// Connection settings shared by every host transport of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Maximum parallel sockets per host
    pub max_sockets: usize,
    /// Keep idle connections open for reuse
    pub keep_alive: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_sockets: 3,
            keep_alive: true,
        }
    }
}

impl ConnectionOptions {
    /// Number of requests the dispatcher may have in flight at once.
    ///
    /// Keep-alive lets each socket carry a second request while the first
    /// one drains, so the ceiling doubles.
    pub fn max_concurrency(&self) -> usize {
        let sockets = self.max_sockets.max(1);
        if self.keep_alive {
            sockets * 2
        } else {
            sockets
        }
    }
}

/// One fully assembled request for a single host.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the host's base URL, query string included
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }
}

/// Raw response as received from a host.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Executes requests against one host.
///
/// Implementations classify their own failures: a refused connection must be
/// reported as [`TransportError::ConnectionRefused`], since that is the only
/// failure the dispatcher retries on another host.
pub trait HostTransport: Send + Sync {
    /// Normalized URL this transport is bound to.
    fn url(&self) -> &str;

    /// Sends one request. The returned future must not borrow `self`.
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, std::result::Result<TransportResponse, TransportError>>;

    /// Releases the transport. Later sends fail with a network error.
    fn close(&self) {}
}

/// Builds a transport for a newly registered host.
///
/// Construction errors (missing protocol, bad socket path) are returned to
/// whoever registered the host.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &str, options: &ConnectionOptions) -> Result<Arc<dyn HostTransport>>;
}
