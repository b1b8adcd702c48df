use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How unpinned requests are spread over the registered hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Stick to one host and fail over when it stops answering
    #[default]
    None,
    /// Rotate through every host on each request
    RoundRobin,
    /// Like `None`, but starting from a random host
    OneRandom,
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadBalancingStrategy::None => "none",
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::OneRandom => "one_random",
        };
        f.write_str(name)
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(LoadBalancingStrategy::None),
            "round_robin" => Ok(LoadBalancingStrategy::RoundRobin),
            "one_random" => Ok(LoadBalancingStrategy::OneRandom),
            other => Err(format!(
                "unknown load balancing strategy '{}', expected none, round_robin or one_random",
                other
            )),
        }
    }
}

/// Host chosen for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub host: usize,
    /// The request must carry the dirty-read header
    pub dirty_read: bool,
}

/// Host selection and failover pointers.
///
/// Keeps two cursors into the host registry: the active host used by
/// regular requests and the active dirty host used by requests that may be
/// served by a follower. Pointers are plain indices; the caller passes the
/// current host count on every call since hosts can be added at any time.
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    active_host: usize,
    active_dirty_host: usize,
}

impl LoadBalancer {
    /// Create a balancer for `host_count` registered hosts
    pub fn new(strategy: LoadBalancingStrategy, host_count: usize) -> Self {
        let (active_host, active_dirty_host) = match strategy {
            LoadBalancingStrategy::OneRandom if host_count > 0 => {
                let mut rng = rand::thread_rng();
                (rng.gen_range(0..host_count), rng.gen_range(0..host_count))
            }
            _ => (0, 0),
        };

        Self {
            strategy,
            active_host,
            active_dirty_host,
        }
    }

    /// Picks the host for one attempt.
    ///
    /// A pinned index wins and never moves a pointer. Dirty reads use and
    /// advance the dirty pointer. Round robin uses and advances the active
    /// pointer. Any other strategy returns the active pointer unchanged.
    pub fn select(&mut self, pinned: Option<usize>, dirty_read: bool, host_count: usize) -> Selection {
        if let Some(host) = pinned {
            return Selection {
                host,
                dirty_read,
            };
        }

        let n = host_count.max(1);

        if dirty_read {
            let host = self.active_dirty_host % n;
            self.active_dirty_host = (host + 1) % n;
            return Selection {
                host,
                dirty_read: true,
            };
        }

        let host = self.active_host % n;
        if self.strategy == LoadBalancingStrategy::RoundRobin {
            self.active_host = (host + 1) % n;
        } else {
            self.active_host = host;
        }

        Selection {
            host,
            dirty_read: false,
        }
    }

    /// Round robin already moves on every request, so it never fails over
    pub fn failover_enabled(&self) -> bool {
        self.strategy != LoadBalancingStrategy::RoundRobin
    }

    /// Reacts to a connection-level failure on `failed_host`.
    ///
    /// Advances the active pointer only when the task was a regular one,
    /// more than one host exists, the strategy fails over and the pointer
    /// has not moved since the task started. Returns whether it advanced.
    pub fn record_failure(&mut self, failed_host: usize, dirty_read: bool, host_count: usize) -> bool {
        if dirty_read || host_count <= 1 || !self.failover_enabled() {
            return false;
        }
        if self.active_host != failed_host {
            return false;
        }

        self.active_host = (self.active_host + 1) % host_count;
        true
    }

    /// Re-points the active host at a leader when the redirected task was
    /// sent to the current active host.
    pub fn follow_leader(&mut self, task_host: usize, leader: usize) -> bool {
        if self.active_host == task_host {
            self.active_host = leader;
            true
        } else {
            false
        }
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    pub fn active_host(&self) -> usize {
        self.active_host
    }

    pub fn active_dirty_host(&self) -> usize {
        self.active_dirty_host
    }
}
