//! Endpoint normalization and parsing.
//!
//! Endpoints are accepted in several spellings and reduced to one canonical
//! string, which is also the key the host registry deduplicates on:
//!
//! - `tcp://host:port` becomes `http://host:port`
//! - `ssl://host:port` and `tls://host:port` become `https://host:port`
//! - `unix:///tmp/db.sock`, `http+unix:///tmp/db.sock` become `http://unix:/tmp/db.sock`

use std::path::PathBuf;

use crate::protocol::error::{HostwiseError, Result};

const PROTOCOL_ALIASES: [(&str, &str); 3] = [("tcp", "http"), ("ssl", "https"), ("tls", "https")];

/// Rewrites protocol aliases and unix socket forms into the canonical spelling.
///
/// Never fails; malformed URLs pass through unchanged and are rejected by
/// [`Endpoint::parse`].
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();

    for (alias, scheme) in PROTOCOL_ALIASES {
        if let Some(rest) = url.strip_prefix(alias) {
            if rest.len() > 1 && (rest.starts_with(':') || rest.starts_with('+')) {
                return normalize_unix(&format!("{}{}", scheme, rest));
            }
        }
    }

    normalize_unix(url)
}

fn normalize_unix(url: &str) -> String {
    let (scheme, rest) = if let Some(rest) = url.strip_prefix("http+") {
        ("http", rest)
    } else if let Some(rest) = url.strip_prefix("https+") {
        ("https", rest)
    } else {
        ("http", url)
    };

    match rest.strip_prefix("unix://") {
        Some(path) if path.starts_with('/') && path.len() > 1 => {
            format!("{}://unix:{}", scheme, path)
        }
        _ => url.to_string(),
    }
}

/// Where a normalized URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP endpoint; `base` is the URL without a trailing slash
    Tcp { base: String, secure: bool },
    /// Unix domain socket
    Unix { socket_path: PathBuf },
}

impl Endpoint {
    /// Parses a normalized URL.
    ///
    /// # Errors
    ///
    /// Returns [`HostwiseError::InvalidUrl`] if:
    /// - the URL has no `http`/`https` protocol
    /// - the URL has no host
    /// - a unix socket path is empty or relative
    /// - TLS is requested over a unix socket
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(idx) = url.find("://unix:") {
            let scheme = &url[..idx];
            let socket = &url[idx + "://unix:".len()..];

            match scheme {
                "http" => {}
                "https" => {
                    return Err(HostwiseError::invalid_url(
                        url,
                        "TLS over unix sockets is not supported",
                    ))
                }
                other => {
                    return Err(HostwiseError::invalid_url(
                        url,
                        format!("unsupported protocol '{}'", other),
                    ))
                }
            }

            if !socket.starts_with('/') || socket.len() < 2 {
                return Err(HostwiseError::invalid_url(
                    url,
                    "unix socket path must be absolute",
                ));
            }

            return Ok(Endpoint::Unix {
                socket_path: PathBuf::from(socket),
            });
        }

        let parsed = url::Url::parse(url)
            .map_err(|e| HostwiseError::invalid_url(url, format!("missing or invalid protocol: {}", e)))?;

        let secure = match parsed.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(HostwiseError::invalid_url(
                    url,
                    format!("unsupported protocol '{}'", other),
                ))
            }
        };

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(HostwiseError::invalid_url(url, "missing host"));
        }

        Ok(Endpoint::Tcp {
            base: url.trim_end_matches('/').to_string(),
            secure,
        })
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Endpoint::Unix { .. })
    }
}
