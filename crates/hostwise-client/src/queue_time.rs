//! Server queue-time sampling
//!
//! Servers report how long a request sat in their scheduler queue through
//! the `x-arango-queue-time-seconds` response header. The dispatcher keeps a
//! short window of the most recent values so callers can back off when the
//! cluster is overloaded.

use hostwise_common::protocol::headers::QUEUE_TIME_SECONDS;
use hostwise_common::HeaderMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

/// One reported queue time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueTimeSample {
    pub at: SystemTime,
    pub seconds: f64,
}

/// Snapshot returned by [`Connection::queue_time`](crate::Connection::queue_time)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueTime {
    /// Most recent value, if any response reported one
    pub latest: Option<f64>,
    /// Retained samples, oldest first
    pub values: Vec<QueueTimeSample>,
    /// Mean of the retained samples, 0 when there are none
    #[serde(rename = "avg")]
    pub average: f64,
}

/// Bounded window of queue-time samples
#[derive(Debug)]
pub struct QueueTimeSamples {
    samples: VecDeque<QueueTimeSample>,
    capacity: usize,
}

impl QueueTimeSamples {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, seconds: f64) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(QueueTimeSample {
            at: SystemTime::now(),
            seconds,
        });
    }

    /// Records the value of the queue-time header if present and numeric.
    /// Returns the recorded value.
    pub fn record_from_headers(&mut self, headers: &HeaderMap) -> Option<f64> {
        let seconds = headers
            .get(QUEUE_TIME_SECONDS)?
            .to_str()
            .ok()?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())?;
        self.record(seconds);
        Some(seconds)
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().map(|s| s.seconds)
    }

    pub fn values(&self) -> Vec<QueueTimeSample> {
        self.samples.iter().copied().collect()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.seconds).sum::<f64>() / self.samples.len() as f64
    }

    pub fn snapshot(&self) -> QueueTime {
        QueueTime {
            latest: self.latest(),
            values: self.values(),
            average: self.average(),
        }
    }
}
