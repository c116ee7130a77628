//! Registry of named processors.
//!
//! Loader configurations refer to functions by name. The registry maps those
//! names to processors; it starts out with the built-in string functions and
//! applications register their own on top.

use std::collections::HashMap;
use std::rc::Rc;

use crate::functions;
use crate::processor::Processor;

/// Registry for storing named processors
pub struct ProcessorRegistry {
    processors: HashMap<String, Rc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in string functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("strip", functions::strip());
        registry.register("lower", functions::lower());
        registry.register("upper", functions::upper());
        registry.register("title", functions::title());
        registry.register("to_int", functions::to_int());
        registry.register("to_float", functions::to_float());
        registry
    }

    /// Register a processor under a name, replacing any previous one
    ///
    /// # Example
    ///
    /// ```
    /// use itemloader::processor::from_fn;
    /// use itemloader::ProcessorRegistry;
    /// use serde_json::Value;
    ///
    /// let mut registry = ProcessorRegistry::new();
    /// registry.register("swapcase", from_fn("swapcase", |v| {
    ///     Ok(v.as_str().map(|s| {
    ///         Value::String(s.chars().map(|c| {
    ///             if c.is_uppercase() { c.to_ascii_lowercase() } else { c.to_ascii_uppercase() }
    ///         }).collect())
    ///     }))
    /// }));
    /// assert!(registry.has_processor("swapcase"));
    /// ```
    pub fn register(&mut self, name: impl Into<String>, processor: impl Processor + 'static) {
        self.processors.insert(name.into(), Rc::new(processor));
    }

    /// Register an already shared processor
    pub fn register_rc(&mut self, name: impl Into<String>, processor: Rc<dyn Processor>) {
        self.processors.insert(name.into(), processor);
    }

    /// Look up a processor by name
    pub fn get(&self, name: &str) -> Option<Rc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    /// Check if a processor is registered
    pub fn has_processor(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Get list of all registered names
    pub fn list_processors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{from_fn, Args};
    use serde_json::{json, Value};

    #[test]
    fn test_register_and_call() {
        let mut registry = ProcessorRegistry::new();

        registry.register(
            "double",
            from_fn("double", |v: Value| Ok(v.as_i64().map(|n| json!(n * 2)))),
        );

        let double = registry.get("double").unwrap();
        let result = double.call(Some(json!(21)), &Args::default()).unwrap();
        assert_eq!(result, Some(json!(42)));
    }

    #[test]
    fn test_processor_not_found() {
        let registry = ProcessorRegistry::new();
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_builtins() {
        let registry = ProcessorRegistry::default();

        assert_eq!(
            registry.list_processors(),
            vec!["lower", "strip", "title", "to_float", "to_int", "upper"]
        );
        assert!(!registry.has_processor("other_fn"));
    }
}
