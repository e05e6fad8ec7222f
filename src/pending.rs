//! Pending-label tracking for the two-step "declare label, then send an
//! image" interaction.
//!
//! Each sender identity can hold at most one pending label. Declaring a
//! second label before an image arrives overwrites the first, and entries
//! never expire; they are removed only when a matching image is consumed or
//! the process exits.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Per-identity pending training labels behind a single lock.
#[derive(Debug, Default)]
pub struct PendingLabels {
    inner: Mutex<HashMap<String, String>>,
}

impl PendingLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `identity -> label`, overwriting any existing entry
    /// (last writer wins).
    pub fn declare(&self, identity: &str, label: &str) {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.insert(identity.to_string(), label.to_string());
    }

    /// Atomically looks up and removes the pending label for `identity`.
    /// Two concurrent image arrivals can never both consume the same entry.
    pub fn take_if_pending(&self, identity: &str) -> Option<String> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.remove(identity)
    }

    /// Number of identities currently waiting to send a training image.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
