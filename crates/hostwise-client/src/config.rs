//! Client Configuration
//!
//! [`ClientConfig`] holds everything a [`Connection`](crate::Connection)
//! needs at construction time. It can be built in code with the `with_*`
//! methods or loaded from JSON:
//!
//! ```json
//! {
//!   "urls": ["tcp://10.0.0.1:8529", "tcp://10.0.0.2:8529"],
//!   "load_balancing": "round_robin",
//!   "retry": { "bounded": 2 },
//!   "max_sockets": 4
//! }
//! ```
//!
//! Every field is optional in the JSON form and falls back to its default.

use hostwise_common::transport::ConnectionOptions;
use hostwise_common::{HostwiseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::load_balancer::LoadBalancingStrategy;

/// Endpoint used when no URL is configured
pub const DEFAULT_URL: &str = "http://127.0.0.1:8529";

/// Protocol version sent as `x-arango-version` unless overridden
pub const DEFAULT_PROTOCOL_VERSION: u32 = 30000;

/// How many connection refusals a task may absorb before it is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Refusals are surfaced immediately
    Disabled,
    /// At most `n` retries per task
    Bounded(u32),
    /// At most one retry per other registered host
    #[default]
    PerHost,
}

impl RetryPolicy {
    /// Whether a task that has been retried `retries` times may retry again.
    ///
    /// `PerHost` is evaluated against the host count at decision time, so
    /// hosts added after submission loosen the bound.
    pub fn allows(&self, retries: u32, host_count: usize) -> bool {
        match self {
            RetryPolicy::Disabled => false,
            RetryPolicy::Bounded(max) => retries < *max,
            RetryPolicy::PerHost => (retries as usize) < host_count.saturating_sub(1),
        }
    }
}

fn default_max_sockets() -> usize {
    3
}

fn default_keep_alive() -> bool {
    true
}

fn default_protocol_version() -> u32 {
    DEFAULT_PROTOCOL_VERSION
}

fn default_queue_time_samples() -> usize {
    10
}

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ClientConfig {
    /// Endpoints to register, in order. Empty means [`DEFAULT_URL`].
    pub urls: Vec<String>,
    pub load_balancing: LoadBalancingStrategy,
    pub retry: RetryPolicy,
    /// Parallel sockets per host
    #[serde(default = "default_max_sockets")]
    pub max_sockets: usize,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    /// Default maximum server-side queue time in seconds
    pub max_queue_time: Option<f64>,
    /// How many queue-time samples to keep
    #[serde(default = "default_queue_time_samples")]
    pub queue_time_samples: usize,
    /// Default conflict retries for requests that do not set their own
    pub retry_on_conflict: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            load_balancing: LoadBalancingStrategy::default(),
            retry: RetryPolicy::default(),
            max_sockets: default_max_sockets(),
            keep_alive: default_keep_alive(),
            headers: BTreeMap::new(),
            protocol_version: default_protocol_version(),
            max_queue_time: None,
            queue_time_samples: default_queue_time_samples(),
            retry_on_conflict: 0,
        }
    }
}

impl ClientConfig {
    pub fn with_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_load_balancing(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.load_balancing = strategy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_max_queue_time(mut self, seconds: f64) -> Self {
        self.max_queue_time = Some(seconds);
        self
    }

    pub fn with_queue_time_samples(mut self, samples: usize) -> Self {
        self.queue_time_samples = samples;
        self
    }

    pub fn with_retry_on_conflict(mut self, attempts: u32) -> Self {
        self.retry_on_conflict = attempts;
        self
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| HostwiseError::Config(e.to_string()))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HostwiseError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks the values a connection cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_sockets == 0 {
            return Err(HostwiseError::Config(
                "max_sockets must be at least 1".to_string(),
            ));
        }

        if let Some(empty) = self.urls.iter().position(|u| u.trim().is_empty()) {
            return Err(HostwiseError::Config(format!(
                "URL at position {} is empty",
                empty
            )));
        }

        if let Some(seconds) = self.max_queue_time {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(HostwiseError::Config(format!(
                    "max_queue_time must be a non-negative number, got {}",
                    seconds
                )));
            }
        }

        Ok(())
    }

    /// URLs to register, falling back to [`DEFAULT_URL`].
    pub fn effective_urls(&self) -> Vec<String> {
        if self.urls.is_empty() {
            vec![DEFAULT_URL.to_string()]
        } else {
            self.urls.clone()
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            max_sockets: self.max_sockets,
            keep_alive: self.keep_alive,
        }
    }

    /// Maximum number of requests in flight at once
    pub fn max_concurrency(&self) -> usize {
        self.connection_options().max_concurrency()
    }
}
