//! Registry runtime statistics.
//!
//! Relaxed atomic counters; exact cross-counter consistency is not required.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct HubStats {
    live_clients: AtomicUsize,
    live_groups: AtomicUsize,
    registrations: AtomicU64,
    replacements: AtomicU64,
    unregister_requests: AtomicU64,
    unregistrations: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`HubStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStatsSnapshot {
    pub live_clients: usize,
    pub live_groups: usize,
    pub registrations: u64,
    pub replacements: u64,
    /// Unregister commands received, including no-op repeats.
    pub unregister_requests: u64,
    /// Unregister commands that actually removed a client.
    pub unregistrations: u64,
    pub delivered: u64,
    pub dropped: u64,
}

impl HubStats {
    pub(crate) fn set_sizes(&self, clients: usize, groups: usize) {
        self.live_clients.store(clients, Ordering::Relaxed);
        self.live_groups.store(groups, Ordering::Relaxed);
    }

    pub(crate) fn registered(&self, replaced: bool) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.replacements.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn unregister_requested(&self, removed: bool) {
        self.unregister_requests.fetch_add(1, Ordering::Relaxed);
        if removed {
            self.unregistrations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn deliveries(&self, delivered: usize, dropped: usize) {
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            live_clients: self.live_clients.load(Ordering::Relaxed),
            live_groups: self.live_groups.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            unregister_requests: self.unregister_requests.load(Ordering::Relaxed),
            unregistrations: self.unregistrations.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
