use hostwise_common::transport::{normalize_url, ConnectionOptions, HostTransport, TransportFactory};
use hostwise_common::Result;
use std::sync::Arc;
use tracing::info;

/// Ordered set of known hosts.
///
/// `urls` and `transports` are index-aligned: index `i` names the same host
/// in both, and a normalized URL never appears twice. Hosts are only ever
/// appended, so an index stays valid for the lifetime of the registry.
pub struct HostRegistry {
    urls: Vec<String>,
    transports: Vec<Arc<dyn HostTransport>>,
    factory: Arc<dyn TransportFactory>,
    options: ConnectionOptions,
}

impl HostRegistry {
    /// Create an empty registry building transports with `factory`
    pub fn new(factory: Arc<dyn TransportFactory>, options: ConnectionOptions) -> Self {
        Self {
            urls: Vec::new(),
            transports: Vec::new(),
            factory,
            options,
        }
    }

    /// Registers hosts and returns the index of every URL passed in.
    ///
    /// Duplicates, in the input or already registered, map to the existing
    /// index and do not create a second transport.
    ///
    /// # Errors
    ///
    /// Fails on the first URL whose transport cannot be constructed. Hosts
    /// registered before it stay registered.
    pub fn add_hosts<I, S>(&mut self, urls: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .map(|url| self.add_host(url.as_ref()))
            .collect()
    }

    /// Registers a single host, see [`add_hosts`](Self::add_hosts).
    pub fn add_host(&mut self, url: &str) -> Result<usize> {
        let normalized = normalize_url(url);
        if let Some(index) = self.index_of_normalized(&normalized) {
            return Ok(index);
        }

        let transport = self.factory.create(&normalized, &self.options)?;
        self.urls.push(normalized);
        self.transports.push(transport);

        let index = self.urls.len() - 1;
        info!("Registered host {} at index {}", self.urls[index], index);
        Ok(index)
    }

    /// Index of `url` after normalization, if registered
    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.index_of_normalized(&normalize_url(url))
    }

    fn index_of_normalized(&self, normalized: &str) -> Option<usize> {
        self.urls.iter().position(|u| u == normalized)
    }

    pub fn transport(&self, index: usize) -> Option<&Arc<dyn HostTransport>> {
        self.transports.get(index)
    }

    pub fn url(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Closes every transport in registration order.
    pub fn close(&self) {
        for transport in &self.transports {
            transport.close();
        }
    }
}
