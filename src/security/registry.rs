//! Blocked-client registry.
//!
//! # Responsibilities
//! - Hold live bans keyed by client identifier
//! - Expire bans lazily on lookup
//! - Expose a coalesced expiry sweep driven by one background task
//!
//! # Design Decisions
//! - A client is blocked iff it has an entry with `now < expires_at`
//! - Expiries are queued in a single min-heap; stale heap entries (after an
//!   extension or a manual unblock) are skipped when popped
//! - No per-ban timers or tasks

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// A live ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub client: String,
    pub expires_at: u64,
}

pub struct BlockRegistry {
    /// client -> expires_at
    entries: DashMap<String, u64>,
    expiries: Mutex<BinaryHeap<Reverse<(u64, String)>>>,
    clock: Arc<dyn Clock>,
}

impl BlockRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            expiries: Mutex::new(BinaryHeap::new()),
            clock,
        }
    }

    /// Ban `client` for `duration_secs` from now. An existing longer ban is kept.
    /// Returns the effective expiry.
    pub fn block(&self, client: &str, duration_secs: u64) -> u64 {
        let expires_at = self.clock.now_unix_sec().saturating_add(duration_secs);
        let effective = {
            let mut entry = self.entries.entry(client.to_string()).or_insert(0);
            if *entry < expires_at {
                *entry = expires_at;
            }
            *entry
        };

        if effective == expires_at {
            self.expiries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Reverse((expires_at, client.to_string())));
        }
        effective
    }

    /// Whether `client` is currently banned. Expired entries are dropped here.
    pub fn is_blocked(&self, client: &str) -> bool {
        let now = self.clock.now_unix_sec();
        let expires_at = match self.entries.get(client) {
            Some(entry) => *entry,
            None => return false,
        };
        if now < expires_at {
            return true;
        }
        self.entries.remove_if(client, |_, exp| now >= *exp);
        false
    }

    /// Seconds left on the ban, if any.
    pub fn remaining(&self, client: &str) -> Option<u64> {
        let now = self.clock.now_unix_sec();
        self.entries
            .get(client)
            .map(|e| *e)
            .filter(|exp| now < *exp)
            .map(|exp| exp - now)
    }

    /// Lift a ban early. Returns whether one was live.
    pub fn unblock(&self, client: &str) -> bool {
        let now = self.clock.now_unix_sec();
        matches!(self.entries.remove(client), Some((_, exp)) if now < exp)
    }

    /// Drop every ban whose expiry has passed. Returns how many were released.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_unix_sec();
        let mut released = 0;
        let mut heap = self.expiries.lock().unwrap_or_else(|e| e.into_inner());

        while let Some(Reverse((expires_at, _))) = heap.peek() {
            if *expires_at > now {
                break;
            }
            let Some(Reverse((expires_at, client))) = heap.pop() else {
                break;
            };
            // Only release if the live entry still carries this expiry.
            if self
                .entries
                .remove_if(&client, |_, exp| *exp == expires_at && now >= *exp)
                .is_some()
            {
                released += 1;
                tracing::info!(client = %client, "Ban expired");
            }
        }
        released
    }

    /// Live bans, soonest expiry first.
    pub fn active(&self) -> Vec<BlockEntry> {
        let now = self.clock.now_unix_sec();
        let mut blocks: Vec<BlockEntry> = self
            .entries
            .iter()
            .filter(|r| now < *r.value())
            .map(|r| BlockEntry {
                client: r.key().clone(),
                expires_at: *r.value(),
            })
            .collect();
        blocks.sort_by_key(|b| b.expires_at);
        blocks
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued expiry timers, including stale ones.
    pub fn pending_expiries(&self) -> usize {
        self.expiries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
