//! hostwise Client
//!
//! Client-side dispatcher for multi-host database deployments. A
//! [`Connection`] owns an ordered registry of endpoints and routes every
//! submitted request to one of them:
//!
//! - **Load balancing**: `none`, `round_robin` or `one_random`
//! - **Failover**: after a failed connection the active host moves on
//! - **Retries**: refused connections are retried on the next pick
//! - **Leader redirects**: 503 responses naming a leader are followed
//! - **Concurrency ceiling**: at most `max_sockets` (x2 with keep-alive)
//!   requests in flight, the rest wait in FIFO order
//!
//! # Example
//!
//! ```no_run
//! use hostwise_client::{ClientConfig, Connection, LoadBalancingStrategy};
//! use hostwise_common::{Method, RequestOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default()
//!     .with_urls(["tcp://10.0.0.1:8529", "tcp://10.0.0.2:8529"])
//!     .with_load_balancing(LoadBalancingStrategy::RoundRobin);
//!
//! let connection = Connection::new(config).await?;
//! let response = connection
//!     .request(RequestOptions::new(Method::GET).path("/_api/version"))
//!     .await?;
//! println!("served by host {}: {:?}", response.served_by, response.json());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod connection;
mod dispatcher;
pub mod host_registry;
pub mod load_balancer;
pub mod queue;
pub mod queue_time;
mod task;

pub use config::{ClientConfig, RetryPolicy, DEFAULT_URL};
pub use connection::{Connection, DispatcherStats};
pub use host_registry::HostRegistry;
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy, Selection};
pub use queue::DispatchQueue;
pub use queue_time::{QueueTime, QueueTimeSample, QueueTimeSamples};
