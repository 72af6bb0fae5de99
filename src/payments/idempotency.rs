//! Processed-event record.
//!
//! Membership means the event's effects were applied. The record is bounded:
//! past `capacity` the oldest ids are evicted one at a time, and ids older
//! than `ttl_secs` age out. An evicted id is no longer a duplicate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::observability::metrics;

#[derive(Default)]
struct Inner {
    /// id -> insertion sequence number.
    seen: HashMap<String, u64>,
    /// (id, sequence, first-seen timestamp) in insertion order. Entries whose
    /// sequence no longer matches `seen` were forgotten and are skipped.
    order: VecDeque<(String, u64, u64)>,
    next_seq: u64,
}

pub struct IdempotencyCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl IdempotencyCache {
    pub fn new(capacity: usize, ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl_secs,
            clock,
        }
    }

    pub fn from_config(config: &WebhookConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.idempotency_capacity, config.idempotency_ttl_secs, clock)
    }

    pub fn seen(&self, id: &str) -> bool {
        let now = self.clock.now_unix_sec();
        let mut inner = self.lock();
        self.expire(&mut inner, now);
        inner.seen.contains_key(id)
    }

    pub fn record(&self, id: &str) {
        self.insert_if_absent(id);
    }

    /// Record `id` unless present. Returns `true` when the caller now owns
    /// the event and should apply its effects.
    pub fn insert_if_absent(&self, id: &str) -> bool {
        let now = self.clock.now_unix_sec();
        let mut inner = self.lock();
        self.expire(&mut inner, now);
        if inner.seen.contains_key(id) {
            return false;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.seen.insert(id.to_string(), seq);
        inner.order.push_back((id.to_string(), seq, now));

        while inner.seen.len() > self.capacity {
            let Some((old, old_seq, _)) = inner.order.pop_front() else {
                break;
            };
            if inner.seen.get(&old) == Some(&old_seq) {
                inner.seen.remove(&old);
                tracing::debug!(event_id = %old, "Idempotency record evicted at capacity");
            }
        }

        self.compact(&mut inner);
        metrics::record_idempotency_size(inner.seen.len());
        true
    }

    /// Drop `id` so a redelivery is processed again.
    pub fn forget(&self, id: &str) {
        let mut inner = self.lock();
        inner.seen.remove(id);
        self.compact(&mut inner);
        metrics::record_idempotency_size(inner.seen.len());
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop forgotten entries from `order` once they outnumber live ones.
    fn compact(&self, inner: &mut Inner) {
        if inner.order.len() <= self.capacity.saturating_mul(2) {
            return;
        }
        let Inner { seen, order, .. } = inner;
        order.retain(|(id, seq, _)| seen.get(id) == Some(seq));
    }

    fn expire(&self, inner: &mut Inner, now: u64) {
        if self.ttl_secs == 0 {
            return;
        }
        while let Some((_, _, at)) = inner.order.front() {
            if now.saturating_sub(*at) < self.ttl_secs {
                break;
            }
            if let Some((old, seq, _)) = inner.order.pop_front() {
                if inner.seen.get(&old) == Some(&seq) {
                    inner.seen.remove(&old);
                }
            }
        }
    }
}
