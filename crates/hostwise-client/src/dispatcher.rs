//! Dispatcher actor
//!
//! One task owns the host registry, the pending queue, the balancer
//! pointers and the executing count. [`Connection`](crate::Connection)
//! handles talk to it over an unbounded command channel; transport calls run
//! as spawned tasks and report back over a second channel whose sender the
//! actor keeps for itself. Nothing here is shared, so nothing is locked.

use hostwise_common::protocol::headers::{
    ALLOW_DIRTY_READ, PROTOCOL_VERSION, QUEUE_TIME_SECONDS, TRANSACTION_ID,
};
use hostwise_common::transport::{TransportRequest, TransportResponse};
use hostwise_common::{HeaderMap, HostwiseError, Result, TransportError};
use http::header::{HeaderName, HeaderValue};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification};
use crate::config::{ClientConfig, RetryPolicy};
use crate::connection::DispatcherStats;
use crate::host_registry::HostRegistry;
use crate::load_balancer::LoadBalancer;
use crate::queue::DispatchQueue;
use crate::queue_time::{QueueTime, QueueTimeSamples};
use crate::task::Task;

/// Messages sent by connection handles
pub(crate) enum Command {
    Submit(Task),
    AddHosts {
        urls: Vec<String>,
        reply: oneshot::Sender<Result<Vec<usize>>>,
    },
    HostUrls {
        reply: oneshot::Sender<Vec<String>>,
    },
    SetTransactionId(Option<HeaderValue>),
    SetHeader {
        name: HeaderName,
        value: Option<HeaderValue>,
    },
    Stats {
        reply: oneshot::Sender<DispatcherStats>,
    },
    QueueTime {
        reply: oneshot::Sender<QueueTime>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Result of one transport attempt
struct Completion {
    task: Task,
    host: usize,
    outcome: std::result::Result<TransportResponse, TransportError>,
}

pub(crate) struct Dispatcher {
    registry: HostRegistry,
    queue: DispatchQueue<Task>,
    balancer: LoadBalancer,
    retry: RetryPolicy,
    executing: usize,
    max_executing: usize,
    default_headers: HeaderMap,
    transaction_id: Option<HeaderValue>,
    queue_times: QueueTimeSamples,
    closed: bool,
    completions_tx: mpsc::UnboundedSender<Completion>,
}

impl Dispatcher {
    /// Starts the actor for an already populated registry and returns the
    /// command sender.
    pub fn spawn(
        config: &ClientConfig,
        registry: HostRegistry,
    ) -> Result<mpsc::UnboundedSender<Command>> {
        let default_headers = default_headers(config)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            balancer: LoadBalancer::new(config.load_balancing, registry.len()),
            registry,
            queue: DispatchQueue::new(),
            retry: config.retry,
            executing: 0,
            max_executing: config.max_concurrency(),
            default_headers,
            transaction_id: None,
            queue_times: QueueTimeSamples::new(config.queue_time_samples),
            closed: false,
            completions_tx,
        };

        info!(
            "Dispatcher started with {} host(s), strategy {}, up to {} requests in flight",
            dispatcher.registry.len(),
            config.load_balancing,
            dispatcher.max_executing
        );

        tokio::spawn(dispatcher.run(commands_rx, completions_rx));
        Ok(commands_tx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut handles_open = true;

        loop {
            tokio::select! {
                command = commands.recv(), if handles_open => match command {
                    Some(command) => self.handle(command),
                    None => handles_open = false,
                },
                Some(completion) = completions.recv() => self.complete(completion),
                else => break,
            }

            // Every handle is gone and nothing is left to finish
            if !handles_open && self.executing == 0 && self.queue.is_empty() {
                break;
            }
        }

        debug!("Dispatcher stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit(task) => self.submit(task),
            Command::AddHosts { urls, reply } => {
                let _ = reply.send(self.registry.add_hosts(urls));
            }
            Command::HostUrls { reply } => {
                let _ = reply.send(self.registry.urls().to_vec());
            }
            Command::SetTransactionId(id) => self.transaction_id = id,
            Command::SetHeader { name, value } => match value {
                Some(value) => {
                    self.default_headers.insert(name, value);
                }
                None => {
                    self.default_headers.remove(name);
                }
            },
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::QueueTime { reply } => {
                let _ = reply.send(self.queue_times.snapshot());
            }
            Command::Close { reply } => {
                self.close();
                let _ = reply.send(());
            }
        }
    }

    fn submit(&mut self, task: Task) {
        if self.closed {
            task.reject(HostwiseError::Closed);
            return;
        }

        if let Some(host) = task.host {
            if host >= self.registry.len() {
                task.reject(HostwiseError::InvalidRequest(format!(
                    "Host index {} is out of range, {} host(s) registered",
                    host,
                    self.registry.len()
                )));
                return;
            }
        }

        self.queue.push(task);
        self.run_queue();
    }

    /// Starts queued tasks while execution slots are free.
    fn run_queue(&mut self) {
        while self.executing < self.max_executing {
            let Some(task) = self.queue.shift() else {
                return;
            };
            self.start(task);
        }
    }

    fn start(&mut self, task: Task) {
        let selection = self
            .balancer
            .select(task.host, task.allow_dirty_read, self.registry.len());

        let Some(transport) = self.registry.transport(selection.host).cloned() else {
            task.reject(HostwiseError::InvalidRequest(format!(
                "No host registered at index {}",
                selection.host
            )));
            return;
        };

        let mut headers = self.default_headers.clone();
        headers.extend(task.headers.clone());
        if let Some(id) = &self.transaction_id {
            headers.insert(TRANSACTION_ID, id.clone());
        }
        if selection.dirty_read {
            headers.insert(ALLOW_DIRTY_READ, HeaderValue::from_static("true"));
        }

        let request = TransportRequest {
            method: task.method.clone(),
            path_and_query: task.path_and_query.clone(),
            headers,
            body: task.body.clone(),
            timeout: task.timeout,
        };

        debug!(
            host = selection.host,
            url = transport.url(),
            "Dispatching {} {}",
            request.method,
            request.path_and_query
        );

        self.executing += 1;
        let host = selection.host;
        let completions = self.completions_tx.clone();
        let call = transport.send(request);

        tokio::spawn(async move {
            let outcome = call.await;
            let _ = completions.send(Completion {
                task,
                host,
                outcome,
            });
        });
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            task,
            host,
            outcome,
        } = completion;
        self.executing = self.executing.saturating_sub(1);

        match outcome {
            Ok(response) => self.on_response(task, host, response),
            Err(error) => self.on_failure(task, host, error),
        }

        self.run_queue();
    }

    fn on_failure(&mut self, mut task: Task, host: usize, error: TransportError) {
        let host_count = self.registry.len();

        if self
            .balancer
            .record_failure(host, task.allow_dirty_read, host_count)
        {
            warn!(
                "Host {} failed ({}), failing over to host {}",
                host,
                error,
                self.balancer.active_host()
            );
        }

        let retryable = task.host.is_none()
            && error.is_connection_refused()
            && self.retry.allows(task.retries, host_count);

        if retryable {
            task.retries += 1;
            warn!(
                "Connection to host {} refused, retrying (attempt {})",
                host, task.retries
            );
            self.requeue(task);
        } else {
            debug!("Request to host {} failed: {}", host, error);
            task.reject(HostwiseError::Transport(error));
        }
    }

    fn on_response(&mut self, mut task: Task, host: usize, response: TransportResponse) {
        self.queue_times.record_from_headers(&response.headers);

        match classify(response, host, task.expect_binary) {
            Classification::Redirect { leader_url } => match self.registry.add_host(&leader_url) {
                Ok(leader) => {
                    if self.balancer.follow_leader(host, leader) {
                        info!("Following leader redirect from host {} to host {}", host, leader);
                    } else {
                        debug!("Redirecting request from host {} to host {}", host, leader);
                    }
                    task.host = Some(leader);
                    self.requeue(task);
                }
                Err(e) => {
                    warn!("Ignoring unusable leader endpoint {}: {}", leader_url, e);
                    task.reject(e);
                }
            },
            Classification::Rejected(HostwiseError::Application(error))
                if error.is_conflict() && task.conflict_retries_left > 0 =>
            {
                task.conflict_retries_left -= 1;
                debug!(
                    "Write-write conflict on host {}, resubmitting ({} left): {}",
                    host, task.conflict_retries_left, error
                );
                self.requeue(task);
            }
            Classification::Rejected(error) => task.reject(error),
            Classification::Resolved(response) => task.resolve(response),
        }
    }

    fn requeue(&mut self, task: Task) {
        if self.closed {
            task.reject(HostwiseError::Closed);
        } else {
            self.queue.push(task);
        }
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            executing: self.executing,
            queued: self.queue.len(),
            active_host: self.balancer.active_host(),
            active_dirty_host: self.balancer.active_dirty_host(),
            host_count: self.registry.len(),
            max_concurrency: self.max_executing,
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.registry.close();

        let pending: Vec<Task> = self.queue.drain().collect();
        let rejected = pending.len();
        for task in pending {
            task.reject(HostwiseError::Closed);
        }

        info!(
            "Connection closed, {} queued request(s) rejected, {} still in flight",
            rejected, self.executing
        );
    }
}

/// Headers sent with every request: configured extras, the protocol
/// version and the default maximum queue time.
fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HostwiseError::Config(format!("Invalid header name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            HostwiseError::Config(format!("Invalid value for header '{}': {}", name, e))
        })?;
        headers.insert(header_name, header_value);
    }

    headers.insert(PROTOCOL_VERSION, HeaderValue::from(config.protocol_version));

    if let Some(seconds) = config.max_queue_time {
        let value = HeaderValue::from_str(&seconds.to_string())
            .map_err(|e| HostwiseError::Config(format!("Invalid max_queue_time: {}", e)))?;
        headers.insert(QUEUE_TIME_SECONDS, value);
    }

    Ok(headers)
}
