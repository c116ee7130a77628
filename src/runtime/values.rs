//! Per-field value store shared by a loader tree.

use indexmap::IndexMap;
use serde_json::Value;

/// Insertion-ordered multi-value accumulator.
///
/// Maps a field name to the raw values collected for it so far. Values of a
/// field keep call order; fields are listed in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    values: IndexMap<String, Vec<Value>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected values for a field (empty if the field was never added)
    pub fn get(&self, field: &str) -> &[Value] {
        self.values.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append values to a field, creating the entry if needed.
    pub fn append<I>(&mut self, field: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.values
            .entry(field.to_string())
            .or_default()
            .extend(values);
    }

    /// Remove a field entry entirely. Removing a missing field is a no-op.
    pub fn clear(&mut self, field: &str) {
        self.values.shift_remove(field);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Field names in first-seen order.
    pub fn field_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_keeps_call_order() {
        let mut store = ValueStore::new();
        store.append("name", vec![json!("a"), json!("b")]);
        store.append("name", vec![json!("c")]);

        assert_eq!(store.get("name"), &[json!("a"), json!("b"), json!("c")]);
        assert!(store.get("missing").is_empty());
    }

    #[test]
    fn test_append_empty_creates_entry() {
        let mut store = ValueStore::new();
        store.append("name", Vec::new());

        assert!(store.contains("name"));
        assert!(store.get("name").is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = ValueStore::new();
        store.append("url", vec![json!("x")]);
        store.append("name", vec![json!("y")]);

        store.clear("url");
        store.clear("url");

        assert!(!store.contains("url"));
        assert_eq!(store.field_names(), vec!["name".to_string()]);
    }
}
