//! Extraction instrumentation.
//!
//! Loaders report, per query rule, whether the rule produced anything. A
//! [`StatsCollector`] receives those reports as counter increments.

use indexmap::IndexMap;
use std::cell::RefCell;

/// Sink for instrumentation counters.
pub trait StatsCollector {
    /// Increment the counter stored under `key`
    fn inc_value(&self, key: &str);
}

/// In-memory counter map.
#[derive(Debug, Default)]
pub struct MemoryStats {
    counters: RefCell<IndexMap<String, u64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter (0 if never incremented)
    pub fn get(&self, key: &str) -> u64 {
        self.counters.borrow().get(key).copied().unwrap_or(0)
    }

    /// Keys in first-increment order
    pub fn keys(&self) -> Vec<String> {
        self.counters.borrow().keys().cloned().collect()
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.counters.borrow().values().sum()
    }

    pub fn snapshot(&self) -> IndexMap<String, u64> {
        self.counters.borrow().clone()
    }
}

impl StatsCollector for MemoryStats {
    fn inc_value(&self, key: &str) {
        *self.counters.borrow_mut().entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Build the counter key for one query rule.
pub(crate) fn stats_key(
    loader: &str,
    field: &str,
    kind: &str,
    position: usize,
    name: Option<&str>,
    missing: bool,
) -> String {
    let mut key = format!("{}/{}/{}/{}", loader, field, kind, position);
    if let Some(name) = name {
        key.push('/');
        key.push_str(name);
    }
    if missing {
        key.push_str("/missing");
    }
    key
}
