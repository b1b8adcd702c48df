//! HTTP Transport
//!
//! hyper-based [`HostTransport`] used for every registered host.
//!
//! # Architecture
//!
//! - **TCP endpoints** share a pooled `hyper_util` legacy client wrapped in a
//!   rustls connector, so `http` and `https` go through the same code path.
//!   With keep-alive the idle pool per host is capped at `max_sockets`;
//!   without it connections are never reused.
//! - **Unix socket endpoints** open a fresh `UnixStream` per request and run
//!   a hyper http1 handshake over it.
//!
//! Failures are classified here: a refused connection becomes
//! [`TransportError::ConnectionRefused`], an expired per-request timeout
//! becomes [`TransportError::Timeout`], anything else is a network error.

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, HOST};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ConnectionOptions, Endpoint, HostTransport, TransportFactory, TransportRequest, TransportResponse};
use crate::protocol::error::{Result, TransportError};

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;
type SendResult = std::result::Result<TransportResponse, TransportError>;

enum Route {
    Tcp { base: String, client: HyperClient },
    Unix { socket_path: PathBuf },
}

/// Transport bound to one host URL.
pub struct HttpTransport {
    url: String,
    route: Route,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Creates a transport for a normalized URL.
    ///
    /// # Errors
    ///
    /// Fails immediately when the URL has no usable protocol or names an
    /// invalid unix socket path.
    pub fn new(url: &str, options: &ConnectionOptions) -> Result<Self> {
        let route = match Endpoint::parse(url)? {
            Endpoint::Tcp { base, .. } => Route::Tcp {
                base,
                client: build_client(options),
            },
            Endpoint::Unix { socket_path } => Route::Unix { socket_path },
        };

        Ok(Self {
            url: url.to_string(),
            route,
            closed: AtomicBool::new(false),
        })
    }
}

fn build_client(options: &ConnectionOptions) -> HyperClient {
    // Only fails when another provider was installed first, which is fine
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    let max_idle = if options.keep_alive {
        options.max_sockets.max(1)
    } else {
        0
    };

    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(max_idle)
        .build(https)
}

impl HostTransport for HttpTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn send(&self, request: TransportRequest) -> BoxFuture<'static, SendResult> {
        let url = self.url.clone();

        if self.closed.load(Ordering::Acquire) {
            return Box::pin(future::ready(Err(TransportError::Network {
                url,
                message: "transport closed".to_string(),
            })));
        }

        let timeout = request.timeout;
        let call: BoxFuture<'static, SendResult> = match &self.route {
            Route::Tcp { base, client } => {
                let uri = format!("{}{}", base, request.path_and_query);
                Box::pin(send_tcp(client.clone(), url.clone(), uri, request))
            }
            Route::Unix { socket_path } => {
                Box::pin(send_unix(socket_path.clone(), url.clone(), request))
            }
        };

        Box::pin(async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::debug!(url = %url, "Request aborted after {}ms", limit.as_millis());
                        Err(TransportError::Timeout {
                            url,
                            timeout_ms: limit.as_millis() as u64,
                        })
                    }
                },
                None => call.await,
            }
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

async fn send_tcp(
    client: HyperClient,
    url: String,
    uri: String,
    request: TransportRequest,
) -> SendResult {
    let http_request = build_http_request(&url, &uri, None, request)?;

    let response = client
        .request(http_request)
        .await
        .map_err(|e| classify_error(&url, &e))?;

    read_response(&url, response).await
}

#[cfg(unix)]
async fn send_unix(socket_path: PathBuf, url: String, request: TransportRequest) -> SendResult {
    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
        if e.kind() == ErrorKind::ConnectionRefused {
            TransportError::ConnectionRefused { url: url.clone() }
        } else {
            TransportError::Network {
                url: url.clone(),
                message: format!("Failed to connect to {}: {}", socket_path.display(), e),
            }
        }
    })?;

    let (mut sender, connection) =
        hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
            .await
            .map_err(|e| classify_error(&url, &e))?;

    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!("Unix socket connection ended with error: {}", err);
        }
    });

    let path = request.path_and_query.clone();
    let http_request = build_http_request(&url, &path, Some("localhost"), request)?;

    let response = sender
        .send_request(http_request)
        .await
        .map_err(|e| classify_error(&url, &e))?;

    read_response(&url, response).await
}

#[cfg(not(unix))]
async fn send_unix(_socket_path: PathBuf, url: String, _request: TransportRequest) -> SendResult {
    Err(TransportError::Network {
        url,
        message: "unix sockets are not supported on this platform".to_string(),
    })
}

fn build_http_request(
    url: &str,
    uri: &str,
    host: Option<&'static str>,
    request: TransportRequest,
) -> std::result::Result<hyper::Request<Full<Bytes>>, TransportError> {
    let mut builder = hyper::Request::builder().method(request.method).uri(uri);

    if let Some(headers) = builder.headers_mut() {
        headers.extend(request.headers);
        if let Some(host) = host {
            if !headers.contains_key(HOST) {
                headers.insert(HOST, HeaderValue::from_static(host));
            }
        }
    }

    builder
        .body(Full::new(request.body))
        .map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })
}

async fn read_response(url: &str, response: hyper::Response<Incoming>) -> SendResult {
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| TransportError::Network {
            url: url.to_string(),
            message: format!("Failed to read response: {}", e),
        })?
        .to_bytes();

    Ok(TransportResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}

/// Maps a client error onto the transport taxonomy by looking for the
/// underlying I/O error in the source chain.
fn classify_error(url: &str, err: &(dyn StdError + 'static)) -> TransportError {
    if is_connection_refused(err) {
        return TransportError::ConnectionRefused {
            url: url.to_string(),
        };
    }

    TransportError::Network {
        url: url.to_string(),
        message: error_chain(err),
    }
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}

/// Builds an [`HttpTransport`] per registered host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(&self, url: &str, options: &ConnectionOptions) -> Result<Arc<dyn HostTransport>> {
        Ok(Arc::new(HttpTransport::new(url, options)?))
    }
}
