//! Turning command-line flags into a client configuration and request.

use anyhow::{anyhow, Context, Result};
use hostwise_client::{ClientConfig, LoadBalancingStrategy, RetryPolicy};
use hostwise_common::{Method, RequestOptions};
use std::time::Duration;

/// Environment variable holding comma-separated endpoint URLs
pub const URLS_ENV: &str = "HOSTWISE_URLS";

/// Flags shared by every subcommand that opens a connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionFlags {
    pub urls: Vec<String>,
    pub config: Option<String>,
    pub load_balancing: Option<LoadBalancingStrategy>,
    pub retries: Option<u32>,
    pub no_retry: bool,
}

impl ConnectionFlags {
    /// Builds the client configuration.
    ///
    /// Flags override the config file. `env_urls` is only consulted when no
    /// `-u` flag was given.
    pub fn into_config(self, env_urls: Option<String>) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path))?,
            None => ClientConfig::default(),
        };

        if !self.urls.is_empty() {
            config.urls = self.urls;
        } else if let Some(env) = env_urls {
            let urls = split_urls(&env);
            if !urls.is_empty() {
                config.urls = urls;
            }
        }

        if let Some(strategy) = self.load_balancing {
            config.load_balancing = strategy;
        }

        if self.no_retry {
            config.retry = RetryPolicy::Disabled;
        } else if let Some(retries) = self.retries {
            config.retry = RetryPolicy::Bounded(retries);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Splits a comma-separated URL list, dropping empty entries
pub fn split_urls(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect()
}

pub fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("Invalid HTTP method '{}'", method))
}

/// Parses a `key=value` query flag
pub fn parse_query_pair(pair: &str) -> Result<(String, String)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid query parameter '{}', expected key=value", pair))?;
    if key.is_empty() {
        return Err(anyhow!("Invalid query parameter '{}', empty key", pair));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parses a `Name: value` header flag
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header '{}', expected 'Name: value'", line))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Invalid header '{}', empty name", line));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Flags describing the single request sent by `hostwise call`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFlags {
    pub method: String,
    pub path: String,
    pub query: Vec<String>,
    pub headers: Vec<String>,
    pub data: Option<String>,
    pub dirty_read: bool,
    pub timeout_ms: Option<u64>,
}

impl RequestFlags {
    pub fn into_request(self) -> Result<RequestOptions> {
        let mut request = RequestOptions::new(parse_method(&self.method)?).path(self.path);

        for pair in &self.query {
            let (key, value) = parse_query_pair(pair)?;
            request = request.query_param(key, value);
        }

        for line in &self.headers {
            let (name, value) = parse_header_line(line)?;
            request = request.header(name, value);
        }

        if let Some(data) = &self.data {
            let body: serde_json::Value =
                serde_json::from_str(data).map_err(|e| anyhow!("Invalid JSON in data: {}", e))?;
            request = request.json(body);
        }

        if self.dirty_read {
            request = request.allow_dirty_read(true);
        }

        if let Some(ms) = self.timeout_ms {
            request = request.timeout(Duration::from_millis(ms));
        }

        Ok(request)
    }
}
