//! Record adapter: how a loader reads and writes the fields of its target.
//!
//! Any map-like structure keyed by field name can serve as the target of a
//! loader. [`Item`] adds an optional declared field set, and can be turned
//! into a typed struct through serde once loading is done.

use indexmap::{IndexMap, IndexSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Error type for record writes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("{record} does not support field '{field}'")]
    UnknownField { record: String, field: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Named-attribute access over a record.
///
/// `fields` is read once when a root loader is constructed, to seed the value
/// store. `set_field` is called by `load_item` for every field that produced
/// an output value.
pub trait Record {
    /// Current `(field, value)` pairs of the record
    fn fields(&self) -> Vec<(String, Value)>;

    /// Read a single field
    fn get_field(&self, field: &str) -> Option<Value>;

    /// Write a single field
    fn set_field(&mut self, field: &str, value: Value) -> Result<(), RecordError>;

    /// Check that `set_field` would accept `field`, without writing.
    fn check_field(&self, _field: &str) -> Result<(), RecordError> {
        Ok(())
    }

    /// Snapshot the record as a JSON object
    fn to_value(&self) -> Value {
        Value::Object(self.fields().into_iter().collect())
    }
}

/// `Record` for map types keyed by `String`; every field is accepted.
macro_rules! impl_map_record {
    ($($map:ty),* $(,)?) => {
        $(
            impl Record for $map {
                fn fields(&self) -> Vec<(String, Value)> {
                    self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                }

                fn get_field(&self, field: &str) -> Option<Value> {
                    self.get(field).cloned()
                }

                fn set_field(&mut self, field: &str, value: Value) -> Result<(), RecordError> {
                    self.insert(field.to_string(), value);
                    Ok(())
                }
            }
        )*
    };
}

impl_map_record!(
    Map<String, Value>,
    IndexMap<String, Value>,
    HashMap<String, Value>,
    BTreeMap<String, Value>,
);

/// A named record with an optional declared field set.
///
/// # Example
///
/// ```
/// use itemloader::{Item, Record};
/// use serde_json::json;
///
/// let mut item = Item::declared("Product", ["name", "price"]);
/// item.set_field("name", json!("Chair")).unwrap();
/// assert!(item.set_field("colour", json!("red")).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    #[serde(skip)]
    name: String,
    #[serde(skip)]
    declared: Option<IndexSet<String>>,
    #[serde(flatten)]
    values: IndexMap<String, Value>,
}

impl Item {
    /// An item that accepts any field
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: None,
            values: IndexMap::new(),
        }
    }

    /// An item that only accepts the given fields
    pub fn declared<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            declared: Some(fields.into_iter().map(Into::into).collect()),
            values: IndexMap::new(),
        }
    }

    /// Builder-style field assignment for pre-populated items.
    pub fn with_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check whether a field may be written
    pub fn accepts(&self, field: &str) -> bool {
        self.declared
            .as_ref()
            .map_or(true, |declared| declared.contains(field))
    }

    /// Convert the item to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Materialize the item as a typed struct
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_value())
    }
}

impl Record for Item {
    fn fields(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn get_field(&self, field: &str) -> Option<Value> {
        self.values.get(field).cloned()
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), RecordError> {
        self.check_field(field)?;
        self.values.insert(field.to_string(), value);
        Ok(())
    }

    fn check_field(&self, field: &str) -> Result<(), RecordError> {
        if self.accepts(field) {
            Ok(())
        } else {
            Err(RecordError::UnknownField {
                record: self.name.clone(),
                field: field.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Product {
        name: String,
        price: f64,
    }

    #[test]
    fn test_map_record_roundtrip() {
        let mut record = Map::new();
        record.set_field("name", json!("Alice")).unwrap();

        assert_eq!(record.get_field("name"), Some(json!("Alice")));
        assert_eq!(record.to_value(), json!({"name": "Alice"}));
    }

    #[test]
    fn test_map_records_accept_any_field() {
        let mut by_index: IndexMap<String, Value> = IndexMap::new();
        let mut by_hash: HashMap<String, Value> = HashMap::new();
        let mut by_tree: BTreeMap<String, Value> = BTreeMap::new();

        by_index.set_field("b", json!(1)).unwrap();
        by_index.set_field("a", json!(2)).unwrap();
        by_hash.set_field("a", json!(2)).unwrap();
        by_tree.set_field("b", json!(1)).unwrap();
        by_tree.set_field("a", json!(2)).unwrap();

        assert_eq!(by_index.fields()[0].0, "b");
        assert_eq!(by_tree.fields()[0].0, "a");
        assert_eq!(by_hash.get_field("a"), Some(json!(2)));
        assert!(by_tree.check_field("anything").is_ok());
    }

    #[test]
    fn test_item_rejects_undeclared_field() {
        let mut item = Item::declared("Product", ["name"]);

        let err = item.set_field("price", json!(1.0)).unwrap_err();
        assert_eq!(
            err,
            RecordError::UnknownField {
                record: "Product".to_string(),
                field: "price".to_string()
            }
        );
        assert!(item.is_empty());
        assert_eq!(item.check_field("price"), Err(err));
        assert!(item.check_field("name").is_ok());
    }

    #[test]
    fn test_item_to_typed_struct() {
        let item = Item::new("Product")
            .with_value("name", json!("Chair"))
            .with_value("price", json!(9.99));

        let product: Product = item.deserialize_into().unwrap();
        assert_eq!(
            product,
            Product {
                name: "Chair".to_string(),
                price: 9.99
            }
        );
        assert_eq!(item.to_json().unwrap(), r#"{"name":"Chair","price":9.99}"#);
    }
}
