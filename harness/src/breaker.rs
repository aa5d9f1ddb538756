//! Dead-account circuit breaker.
//!
//! One-way registry consulted by every component before it acts on a
//! virtual user. A permanently broken account must not retry forever or
//! report cascading spurious failures, so once an address is recorded here
//! every later operation for it short-circuits to a no-op success.

use std::collections::HashMap;

use log::warn;
use parking_lot::RwLock;

use crate::ledger::Address;

/// Shared registry of virtual users that hit an unrecoverable failure.
#[derive(Debug, Default)]
pub struct DeadAccounts {
    inner: RwLock<HashMap<Address, String>>,
}

impl DeadAccounts {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unrecoverable failure for `address`. The first recorded
    /// reason wins; the transition is one-way.
    pub fn mark_dead(&self, address: Address, reason: impl Into<String>) {
        let reason = reason.into();
        let mut map = self.inner.write();
        if !map.contains_key(&address) {
            warn!("virtual user {} marked dead: {}", address, reason);
            map.insert(address, reason);
        }
    }

    /// Whether `address` has been written off.
    pub fn is_dead(&self, address: &Address) -> bool {
        self.inner.read().contains_key(address)
    }

    /// Number of dead virtual users, for run-level reporting.
    pub fn dead_count(&self) -> usize {
        self.inner.read().len()
    }

    /// The recorded failure reason for `address`, if it is dead.
    pub fn reason(&self, address: &Address) -> Option<String> {
        self.inner.read().get(address).cloned()
    }
}
