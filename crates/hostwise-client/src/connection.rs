use hostwise_common::transport::{HttpTransportFactory, TransportFactory};
use hostwise_common::{HostwiseError, RequestOptions, Response, Result};
use http::header::{HeaderName, HeaderValue};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::dispatcher::{Command, Dispatcher};
use crate::host_registry::HostRegistry;
use crate::queue_time::QueueTime;
use crate::task::Task;

/// Point-in-time view of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Requests currently handed to a transport
    pub executing: usize,
    /// Requests waiting for a free slot
    pub queued: usize,
    pub active_host: usize,
    pub active_dirty_host: usize,
    pub host_count: usize,
    pub max_concurrency: usize,
}

/// Handle to a running dispatcher.
///
/// Cheap to clone; every clone talks to the same dispatcher. The dispatcher
/// keeps running until [`close`](Self::close) is called or the last handle is
/// dropped and its in-flight requests have finished.
#[derive(Clone)]
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    default_conflict_retries: u32,
}

impl Connection {
    /// Connects using the hyper transport.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or an endpoint URL cannot be
    /// turned into a transport.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport_factory(config, Arc::new(HttpTransportFactory)).await
    }

    /// Connects using transports built by `factory`.
    pub async fn with_transport_factory(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = HostRegistry::new(factory, config.connection_options());
        registry.add_hosts(config.effective_urls())?;

        let commands = Dispatcher::spawn(&config, registry)?;

        Ok(Self {
            commands,
            default_conflict_retries: config.retry_on_conflict,
        })
    }

    /// Submits a request and waits for its classified outcome.
    ///
    /// Connection refusals within the retry budget and leader redirects are
    /// handled internally; the caller only sees the final response or error.
    pub async fn request(&self, options: RequestOptions) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        let task = Task::from_options(options, self.default_conflict_retries, reply)?;
        self.send(Command::Submit(task))?;
        response.await.map_err(|_| HostwiseError::Closed)?
    }

    /// Registers more hosts, returning the index of each URL.
    pub async fn add_hosts<I, S>(&self, urls: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls = urls.into_iter().map(Into::into).collect();
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddHosts { urls, reply })?;
        rx.await.map_err(|_| HostwiseError::Closed)?
    }

    /// Normalized URLs of every registered host, in index order.
    pub async fn host_urls(&self) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::HostUrls { reply })?;
        rx.await.map_err(|_| HostwiseError::Closed)
    }

    /// Sends `x-arango-trx-id` with every later request.
    pub fn set_transaction_id(&self, id: &str) -> Result<()> {
        let value = HeaderValue::from_str(id).map_err(|e| {
            HostwiseError::InvalidRequest(format!("Invalid transaction id '{}': {}", id, e))
        })?;
        self.send(Command::SetTransactionId(Some(value)))
    }

    pub fn clear_transaction_id(&self) -> Result<()> {
        self.send(Command::SetTransactionId(None))
    }

    /// Adds or replaces a header sent with every later request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let name = parse_header_name(name)?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            HostwiseError::InvalidRequest(format!("Invalid value for header '{}': {}", name, e))
        })?;
        self.send(Command::SetHeader {
            name,
            value: Some(value),
        })
    }

    pub fn remove_header(&self, name: &str) -> Result<()> {
        let name = parse_header_name(name)?;
        self.send(Command::SetHeader { name, value: None })
    }

    pub async fn stats(&self) -> Result<DispatcherStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| HostwiseError::Closed)
    }

    /// Recent server queue times reported in response headers.
    pub async fn queue_time(&self) -> Result<QueueTime> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::QueueTime { reply })?;
        rx.await.map_err(|_| HostwiseError::Closed)
    }

    /// Closes every transport and rejects queued requests.
    ///
    /// Requests already in flight still complete. Requests submitted after
    /// this returns fail with [`HostwiseError::Closed`]. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Close { reply }).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| HostwiseError::Closed)
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        HostwiseError::InvalidRequest(format!("Invalid header name '{}': {}", name, e))
    })
}
