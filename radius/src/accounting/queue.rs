use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Traffic a user produced since the last flush.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub in_octets: u32,
    pub out_octets: u32,
    pub in_packets: u32,
    pub out_packets: u32,
}

impl Usage {
    fn accumulate(&mut self, other: &Usage) {
        self.in_octets = self.in_octets.saturating_add(other.in_octets);
        self.out_octets = self.out_octets.saturating_add(other.out_octets);
        self.in_packets = self.in_packets.saturating_add(other.in_packets);
        self.out_packets = self.out_packets.saturating_add(other.out_packets);
    }

    pub fn total_octets(&self) -> u64 {
        self.in_octets as u64 + self.out_octets as u64
    }
}

/// Shared accumulator written by every listener and drained by `UsageSync`.
#[derive(Debug, Default)]
pub struct AccountingQueue {
    remains: Mutex<HashMap<String, Usage>>,
}

impl AccountingQueue {
    pub fn new() -> Self {
        Default::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Usage>> {
        // the map stays consistent even if a holder panicked
        self.remains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, user: &str, usage: &Usage) {
        self.lock()
            .entry(user.to_owned())
            .or_default()
            .accumulate(usage);
    }

    /// Swaps the accumulator for an empty one and returns what it held.
    pub fn flush(&self) -> HashMap<String, Usage> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
