//! Shared loader context.
//!
//! One context map is created per loader tree and shared by reference with
//! every nested loader. Processors that declare a `loader_context` parameter
//! receive a [`LoaderContext`] and see the map as it is when they run.

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::definition::LoaderDefinition;
use crate::processor::{wrap_loader_context, ProcessError};
use crate::record::Record;
use crate::runtime::values::ValueStore;
use crate::selector::Selector;

/// Reserved key under which the loader's record is visible.
pub const ITEM_KEY: &str = "item";

/// Context handed to context-aware processors.
///
/// Lookups go, in order, through the reserved `item` key, the node-local
/// layers (most recent first), the tree-wide shared map, and finally any
/// declaration-time defaults contributed by `Compose`/`MapCompose`.
#[derive(Clone, Default)]
pub struct LoaderContext {
    shared: Rc<RefCell<IndexMap<String, Value>>>,
    locals: Vec<Rc<IndexMap<String, Value>>>,
    defaults: Vec<Rc<IndexMap<String, Value>>>,
    item: Option<Rc<RefCell<dyn Record>>>,
    selector: Option<Rc<dyn Selector>>,
    values: Option<Rc<RefCell<ValueStore>>>,
    definition: Option<Rc<LoaderDefinition>>,
}

impl LoaderContext {
    /// Create the root context of a loader tree.
    pub fn new(
        values: IndexMap<String, Value>,
        item: Rc<RefCell<dyn Record>>,
        selector: Option<Rc<dyn Selector>>,
    ) -> Self {
        Self {
            shared: Rc::new(RefCell::new(values)),
            locals: Vec::new(),
            defaults: Vec::new(),
            item: Some(item),
            selector,
            values: None,
            definition: None,
        }
    }

    /// Give processors read access to the tree's collected values and the
    /// field declarations used to reduce them.
    pub(crate) fn attach(mut self, values: Rc<RefCell<ValueStore>>, definition: Rc<LoaderDefinition>) -> Self {
        self.values = Some(values);
        self.definition = Some(definition);
        self
    }

    /// A context that is not attached to any loader.
    ///
    /// Used when a composite processor is called directly, outside a loader.
    pub fn detached(values: IndexMap<String, Value>) -> Self {
        Self {
            shared: Rc::new(RefCell::new(values)),
            ..Self::default()
        }
    }

    /// Derive the context of a nested loader.
    ///
    /// The shared map and the record are the same objects; only the scope
    /// and the node-local keyword arguments differ.
    pub fn scoped(&self, selector: Rc<dyn Selector>, locals: IndexMap<String, Value>) -> Self {
        let mut child = self.clone();
        child.selector = Some(selector);
        if !locals.is_empty() {
            child.locals.push(Rc::new(locals));
        }
        child
    }

    /// Layer declaration-time defaults under this context.
    pub fn with_defaults(&self, defaults: &Rc<IndexMap<String, Value>>) -> Self {
        let mut layered = self.clone();
        if !defaults.is_empty() {
            layered.defaults.push(Rc::clone(defaults));
        }
        layered
    }

    /// Look up a context value.
    ///
    /// The reserved `item` key yields a snapshot of the loader's record.
    pub fn get(&self, key: &str) -> Option<Value> {
        if key == ITEM_KEY {
            if let Some(item) = &self.item {
                return Some(item.borrow().to_value());
            }
        }

        if let Some(value) = self.locals.iter().rev().find_map(|layer| layer.get(key)) {
            return Some(value.clone());
        }

        if let Some(value) = self.shared.borrow().get(key) {
            return Some(value.clone());
        }

        self.defaults.iter().find_map(|layer| layer.get(key).cloned())
    }

    /// Check if a key resolves in this context.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a value on the tree-wide shared map.
    ///
    /// The value becomes visible to every loader of the tree, including
    /// loaders created before the call.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.shared.borrow_mut().insert(key.into(), value)
    }

    /// Read a single field of the loader's record.
    pub fn item_field(&self, field: &str) -> Option<Value> {
        self.item.as_ref().and_then(|item| item.borrow().get_field(field))
    }

    /// The record handle, if this context belongs to a loader.
    pub fn item(&self) -> Option<Rc<RefCell<dyn Record>>> {
        self.item.clone()
    }

    /// Values collected so far for a field of the loader tree.
    ///
    /// Empty for a context that is not attached to a loader.
    pub fn collected_values(&self, field: &str) -> Vec<Value> {
        self.values
            .as_ref()
            .map(|values| values.borrow().get(field).to_vec())
            .unwrap_or_default()
    }

    /// Output value of another field, computed with that field's output
    /// processor against this context.
    ///
    /// A field whose output processor asks for its own output value recurses
    /// without end.
    pub fn output_value(&self, field: &str) -> Result<Option<Value>, ProcessError> {
        let Some(definition) = &self.definition else {
            return Ok(None);
        };
        let processor = definition.output_processor(field);
        let collected = Value::Array(self.collected_values(field));
        wrap_loader_context(processor.as_ref(), self).call(Some(collected))
    }

    /// The current extraction scope, if any.
    pub fn selector(&self) -> Option<Rc<dyn Selector>> {
        self.selector.clone()
    }

    /// Snapshot of the shared map's keys.
    pub fn keys(&self) -> Vec<String> {
        self.shared.borrow().keys().cloned().collect()
    }

    /// `true` if both contexts share the same underlying map.
    pub fn shares_values_with(&self, other: &LoaderContext) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderContext")
            .field("values", &self.shared.borrow())
            .field("locals", &self.locals)
            .field("defaults", &self.defaults)
            .field("has_item", &self.item.is_some())
            .field("has_selector", &self.selector.is_some())
            .field("attached", &self.definition.is_some())
            .finish()
    }
}
