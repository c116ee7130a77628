//! Loader definitions: which processors apply to which field.
//!
//! A definition is built once per loader type and shared by every loader of
//! that type. Field-specific declarations take precedence over the
//! definition-wide defaults, which fall back to [`Identity`].

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use crate::processor::Processor;
use crate::processors::Identity;

/// Input/output declarations of a single field
#[derive(Clone, Default)]
pub struct FieldProcessors {
    pub input: Option<Rc<dyn Processor>>,
    pub output: Option<Rc<dyn Processor>>,
}

/// Per-field processor registry for one loader type.
///
/// # Example
///
/// ```
/// use itemloader::processors::{MapCompose, TakeFirst};
/// use itemloader::functions::title;
/// use itemloader::LoaderDefinition;
///
/// let definition = LoaderDefinition::new("ProductLoader")
///     .with_input("name", MapCompose::new().then(title()))
///     .with_default_output(TakeFirst::new());
///
/// assert_eq!(definition.input_processor("name").name(), "MapCompose");
/// assert_eq!(definition.output_processor("price").name(), "TakeFirst");
/// ```
#[derive(Clone)]
pub struct LoaderDefinition {
    name: String,
    default_input: Rc<dyn Processor>,
    default_output: Rc<dyn Processor>,
    fields: IndexMap<String, FieldProcessors>,
}

impl LoaderDefinition {
    /// A definition with identity defaults and no field declarations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_input: Rc::new(Identity),
            default_output: Rc::new(Identity),
            fields: IndexMap::new(),
        }
    }

    /// Derive a definition from `parent`.
    ///
    /// The child starts with all of the parent's declarations; anything
    /// declared on the child afterwards overrides them.
    pub fn extend(parent: &LoaderDefinition, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..parent.clone()
        }
    }

    /// Loader type name, used in instrumentation keys
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_default_input(mut self, processor: impl Processor + 'static) -> Self {
        self.default_input = Rc::new(processor);
        self
    }

    pub fn with_default_output(mut self, processor: impl Processor + 'static) -> Self {
        self.default_output = Rc::new(processor);
        self
    }

    /// Declare the input processor of a field
    pub fn with_input(mut self, field: &str, processor: impl Processor + 'static) -> Self {
        self.set_input(field, Rc::new(processor));
        self
    }

    /// Declare the output processor of a field
    pub fn with_output(mut self, field: &str, processor: impl Processor + 'static) -> Self {
        self.set_output(field, Rc::new(processor));
        self
    }

    pub fn set_default_input(&mut self, processor: Rc<dyn Processor>) {
        self.default_input = processor;
    }

    pub fn set_default_output(&mut self, processor: Rc<dyn Processor>) {
        self.default_output = processor;
    }

    pub fn set_input(&mut self, field: &str, processor: Rc<dyn Processor>) {
        self.fields.entry(field.to_string()).or_default().input = Some(processor);
    }

    pub fn set_output(&mut self, field: &str, processor: Rc<dyn Processor>) {
        self.fields.entry(field.to_string()).or_default().output = Some(processor);
    }

    /// Resolve the input processor of a field
    pub fn input_processor(&self, field: &str) -> Rc<dyn Processor> {
        self.fields
            .get(field)
            .and_then(|f| f.input.clone())
            .unwrap_or_else(|| Rc::clone(&self.default_input))
    }

    /// Resolve the output processor of a field
    pub fn output_processor(&self, field: &str) -> Rc<dyn Processor> {
        self.fields
            .get(field)
            .and_then(|f| f.output.clone())
            .unwrap_or_else(|| Rc::clone(&self.default_output))
    }

    pub fn default_input(&self) -> Rc<dyn Processor> {
        Rc::clone(&self.default_input)
    }

    pub fn default_output(&self) -> Rc<dyn Processor> {
        Rc::clone(&self.default_output)
    }

    /// Fields with at least one declaration
    pub fn declared_fields(&self) -> Vec<&String> {
        self.fields.keys().collect()
    }
}

impl Default for LoaderDefinition {
    fn default() -> Self {
        Self::new("ItemLoader")
    }
}

impl fmt::Debug for LoaderDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: IndexMap<&String, (Option<String>, Option<String>)> = self
            .fields
            .iter()
            .map(|(name, p)| {
                (
                    name,
                    (
                        p.input.as_ref().map(|i| i.name()),
                        p.output.as_ref().map(|o| o.name()),
                    ),
                )
            })
            .collect();
        f.debug_struct("LoaderDefinition")
            .field("name", &self.name)
            .field("default_input", &self.default_input.name())
            .field("default_output", &self.default_output.name())
            .field("fields", &fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{Join, MapCompose, TakeFirst};

    #[test]
    fn test_identity_fallback() {
        let definition = LoaderDefinition::default();

        assert_eq!(definition.name(), "ItemLoader");
        assert_eq!(definition.input_processor("anything").name(), "Identity");
        assert_eq!(definition.output_processor("anything").name(), "Identity");
    }

    #[test]
    fn test_field_declaration_beats_default() {
        let definition = LoaderDefinition::new("L")
            .with_default_output(TakeFirst::new())
            .with_output("name", Join::default());

        assert_eq!(definition.output_processor("name").name(), "Join");
        assert_eq!(definition.output_processor("url").name(), "TakeFirst");
    }

    #[test]
    fn test_extend_merges_registries() {
        let parent = LoaderDefinition::new("Parent")
            .with_input("name", MapCompose::new())
            .with_default_output(TakeFirst::new());

        let child = LoaderDefinition::extend(&parent, "Child")
            .with_input("url", Join::default())
            .with_default_input(TakeFirst::new());

        assert_eq!(child.name(), "Child");
        assert_eq!(child.input_processor("name").name(), "MapCompose");
        assert_eq!(child.input_processor("url").name(), "Join");
        assert_eq!(child.input_processor("other").name(), "TakeFirst");
        assert_eq!(child.output_processor("other").name(), "TakeFirst");

        // parent is untouched
        assert_eq!(parent.input_processor("url").name(), "Identity");
        assert_eq!(child.declared_fields().len(), 2);
    }
}
