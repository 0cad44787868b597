//! The sample queue: the single hand-off point between inputs and outputs.
//!
//! Unbounded, multi-producer, lock-free. Records from one producer keep
//! their push order; no ordering holds across producers.

use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::record::MetricRecord;

/// Cloneable handle to a shared FIFO of [`MetricRecord`]s.
#[derive(Clone, Default)]
pub struct SampleQueue {
    inner: Arc<SegQueue<MetricRecord>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: MetricRecord) {
        self.inner.push(record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = MetricRecord>) {
        for record in records {
            self.inner.push(record);
        }
    }

    /// Non-blocking pop.
    pub fn pop(&self) -> Option<MetricRecord> {
        self.inner.pop()
    }

    /// Pop until empty. Never waits for more items.
    pub fn drain(&self) -> Vec<MetricRecord> {
        let mut out = Vec::with_capacity(self.inner.len());
        while let Some(record) = self.inner.pop() {
            out.push(record);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleQueue")
            .field("len", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let q = SampleQueue::new();
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            q.push(MetricRecord::gauge(*key, i as i64, 0));
        }
        let keys: Vec<_> = q.drain().iter().map(|r| r.key().to_string()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_drain_empty_is_noop() {
        let q = SampleQueue::new();
        assert!(q.drain().is_empty());
        assert!(q.drain().is_empty());
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let q = SampleQueue::new();
        std::thread::scope(|s| {
            for p in 0..4 {
                let q = q.clone();
                s.spawn(move || {
                    for i in 0..500 {
                        q.push(MetricRecord::gauge(format!("p{p}"), i as i64, 0));
                    }
                });
            }
        });

        let drained = q.drain();
        assert_eq!(drained.len(), 2000);
        for p in 0..4 {
            let key = format!("p{p}");
            let seen: Vec<i64> = drained
                .iter()
                .filter(|r| r.key() == key)
                .map(|r| match r.value() {
                    crate::record::MetricValue::Int(v) => *v,
                    other => panic!("unexpected value {other:?}"),
                })
                .collect();
            assert_eq!(seen, (0..500).collect::<Vec<_>>());
        }
    }
}
