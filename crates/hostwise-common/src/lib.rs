//! hostwise Common Types and Transport
//!
//! This crate provides the protocol definitions and the per-host HTTP
//! transport shared by the hostwise dispatcher and its command-line tool.
//!
//! # Overview
//!
//! hostwise is a client-side request dispatcher for multi-host database
//! deployments. This crate holds the pieces that do not depend on dispatcher
//! state:
//!
//! - **Protocol Layer**: request options, decoded responses, the error
//!   taxonomy and the well-known header names
//! - **Transport Layer**: endpoint normalization, the [`HostTransport`] trait
//!   and its hyper-based implementation
//!
//! # Components
//!
//! - [`protocol`] - Request/response types and errors
//! - [`transport`] - Endpoint parsing and HTTP transports
//!
//! # Example
//!
//! ```
//! use hostwise_common::{Method, RequestOptions};
//! use std::time::Duration;
//!
//! let options = RequestOptions::new(Method::GET)
//!     .path("/_api/version")
//!     .query_param("details", "true")
//!     .timeout(Duration::from_secs(5));
//!
//! assert_eq!(options.path_and_query(), "/_api/version?details=true");
//! ```

pub mod protocol;
pub mod transport;

pub use http::{HeaderMap, Method, StatusCode};
pub use protocol::*;
pub use transport::{
    normalize_url, ConnectionOptions, Endpoint, HostTransport, HttpTransport,
    HttpTransportFactory, TransportFactory, TransportRequest, TransportResponse,
};
