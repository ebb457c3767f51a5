//! Sliding time window over feed batches

use serde_json::Value;
use std::collections::VecDeque;

/// One feed event: the aircraft list received at `timestamp` (epoch seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub timestamp: i64,
    pub aircraft: Vec<Value>,
}

impl Batch {
    pub fn new(timestamp: i64, aircraft: Vec<Value>) -> Self {
        Self { timestamp, aircraft }
    }
}

/// Batches in arrival order.
///
/// Eviction only looks at the front, so it is correct only while timestamps
/// are non-decreasing. Arrival order is assumed, not enforced.
#[derive(Debug, Default)]
pub struct WindowBuffer {
    batches: VecDeque<Batch>,
}

impl WindowBuffer {
    pub fn new() -> Self {
        Self {
            batches: VecDeque::new(),
        }
    }

    pub fn append(&mut self, batch: Batch) {
        self.batches.push_back(batch);
    }

    /// Evict from the front every batch older than `now - window_secs`.
    ///
    /// Returns the number of evicted batches.
    pub fn trim(&mut self, now: i64, window_secs: i64) -> usize {
        let cutoff = now - window_secs;
        let mut evicted = 0;

        while let Some(front) = self.batches.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.batches.pop_front();
            evicted += 1;
        }

        evicted
    }

    /// Flat view of every record in a batch with `timestamp >= now - window_secs`,
    /// in buffer order. Does not mutate the buffer.
    pub fn merge(&self, now: i64, window_secs: i64) -> Vec<&Value> {
        let cutoff = now - window_secs;

        self.batches
            .iter()
            .filter(|batch| batch.timestamp >= cutoff)
            .flat_map(|batch| batch.aircraft.iter())
            .collect()
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
