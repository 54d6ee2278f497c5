use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

pub const DEFAULT_MEMO_CAPACITY: usize = 1024;

/// Outcome of an earlier probe for a caller model id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoEntry {
    /// The upstream accepted the id verbatim.
    Confirmed(Arc<str>),
    /// The probe failed or was rejected; go straight to the tier fallback.
    Unconfirmed,
}

/// Process-wide record of probe results, shared through an `Arc`.
///
/// Entries are never refreshed. Recording a new id while `capacity` ids are
/// held clears the map, so previously resolved ids are probed again.
#[derive(Debug)]
pub struct ResolutionMemo {
    entries: RwLock<FxHashMap<String, MemoEntry>>,
    capacity: usize,
}

impl Default for ResolutionMemo {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }
}

impl ResolutionMemo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn get(&self, requested: &str) -> Option<MemoEntry> {
        self.entries.read().get(requested).cloned()
    }

    pub fn record(&self, requested: &str, entry: MemoEntry) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(requested) {
            entries.clear();
        }
        entries.insert(requested.to_owned(), entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
