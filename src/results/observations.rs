use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Delivery latencies seen by subscribers, keyed by publisher client id.
///
/// Every subscriber writes into the same map, so each write takes the lock
/// for a single push only. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct SubscriberObservations {
    inner: Arc<Mutex<HashMap<String, Vec<f64>>>>,
}

impl SubscriberObservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one latency (microseconds) for `publisher_id`.
    pub fn record(&self, publisher_id: &str, latency_us: f64) {
        let mut map = self.inner.lock();
        match map.get_mut(publisher_id) {
            Some(samples) => samples.push(latency_us),
            None => {
                map.insert(publisher_id.to_string(), vec![latency_us]);
            }
        }
    }

    pub fn count_for(&self, publisher_id: &str) -> usize {
        self.inner.lock().get(publisher_id).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    /// Copy of the current state, for aggregation once all writers stopped.
    pub fn snapshot(&self) -> HashMap<String, Vec<f64>> {
        self.inner.lock().clone()
    }
}
