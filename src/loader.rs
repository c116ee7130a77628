//! The item loader.
//!
//! An [`ItemLoader`] collects raw values per field, runs each added value
//! through the field's input processor, and on [`ItemLoader::load_item`] runs
//! every field's collected values through its output processor and writes the
//! result into the target record.
//!
//! Loaders form trees: [`ItemLoader::nested`] creates a loader scoped to a
//! narrower part of the document that shares the value store, the record and
//! the context of its parent.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::definition::LoaderDefinition;
use crate::processor::{wrap_loader_context, ProcessError, Processor};
use crate::record::{Record, RecordError};
use crate::runtime::context::LoaderContext;
use crate::runtime::values::ValueStore;
use crate::selector::{QueryKind, Selector, SelectorError};
use crate::stats::{stats_key, StatsCollector};
use crate::utils::{arg_to_iter, as_text, extract_regex, flatten, is_empty, opt_to_iter, render};

/// Where in the loader a processor failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStage {
    /// A field's declared input processor
    Input,
    /// A field's declared output processor
    Output,
    /// A processor passed along with a value
    Argument,
}

impl fmt::Display for ProcessorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorStage::Input => f.write_str("input processor"),
            ProcessorStage::Output => f.write_str("output processor"),
            ProcessorStage::Argument => f.write_str("processor"),
        }
    }
}

/// Error type for loader operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoaderError {
    /// A scoped operation was called on a loader without a selector
    #[error("Cannot use {operation}: no selector configured on the loader")]
    MissingSelector { operation: &'static str },

    /// A processor failed while computing or materializing a value
    #[error("Error with {stage} {processor}: field={} value={value} error='{source}'", field_repr(.field))]
    Processor {
        stage: ProcessorStage,
        processor: String,
        field: Option<String>,
        value: String,
        source: ProcessError,
    },

    /// A field-less add was given something other than a mapping
    #[error("Values added without a field name must be a mapping, got {value}")]
    ExpectedMapping { value: String },

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl LoaderError {
    /// The processor failure behind this error, if any
    pub fn process_error(&self) -> Option<&ProcessError> {
        match self {
            LoaderError::Processor { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A structural query to extract values with.
///
/// Groups the query rules with the transient processors, regex and
/// instrumentation name that apply to them.
///
/// # Example
///
/// ```
/// use itemloader::{Query, QueryKind};
///
/// let query = Query::css("article h2::text")
///     .or("article .product-title::text")
///     .named("title from article");
/// assert_eq!(query.kind(), QueryKind::Css);
/// assert_eq!(query.rules().len(), 2);
/// ```
#[derive(Clone)]
pub struct Query {
    kind: QueryKind,
    rules: Vec<String>,
    name: Option<String>,
    processors: Vec<Rc<dyn Processor>>,
    re: Option<Regex>,
}

impl Query {
    pub fn new(kind: QueryKind, rule: impl Into<String>) -> Self {
        Self {
            kind,
            rules: vec![rule.into()],
            name: None,
            processors: Vec::new(),
            re: None,
        }
    }

    pub fn css(rule: impl Into<String>) -> Self {
        Self::new(QueryKind::Css, rule)
    }

    pub fn xpath(rule: impl Into<String>) -> Self {
        Self::new(QueryKind::Xpath, rule)
    }

    pub fn jmes(rule: impl Into<String>) -> Self {
        Self::new(QueryKind::Jmes, rule)
    }

    /// Add another rule; results of all rules are concatenated
    pub fn or(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    /// Name reported in instrumentation keys
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Transient processor applied before the field's input processor
    pub fn then(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Rc::new(processor));
        self
    }

    /// Keep only regex matches of the extracted strings
    pub fn re(mut self, regex: Regex) -> Self {
        self.re = Some(regex);
        self
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    fn processor_refs(&self) -> Vec<&dyn Processor> {
        self.processors.iter().map(|p| p.as_ref() as &dyn Processor).collect()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.kind)
            .field("rules", &self.rules)
            .field("name", &self.name)
            .field("processors", &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("re", &self.re.as_ref().map(Regex::as_str))
            .finish()
    }
}

/// Builder for root loaders.
pub struct LoaderBuilder<R: Record + 'static> {
    definition: Rc<LoaderDefinition>,
    item: Option<R>,
    selector: Option<Rc<dyn Selector>>,
    stats: Option<Rc<dyn StatsCollector>>,
    context: IndexMap<String, Value>,
}

impl<R: Record + 'static> LoaderBuilder<R> {
    /// Target record; a default one is created when omitted
    pub fn item(mut self, item: R) -> Self {
        self.item = Some(item);
        self
    }

    /// Scope for `add_css`/`add_xpath`/`add_jmes` and nesting
    pub fn selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Some(Rc::new(selector));
        self
    }

    pub fn selector_rc(mut self, selector: Rc<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Instrumentation sink
    pub fn stats(mut self, stats: Rc<dyn StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Extra context value for context-aware processors
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Build with the given record, ignoring any set through [`Self::item`].
    pub fn build_with(self, item: R) -> ItemLoader<R> {
        ItemLoader::root(self.definition, item, self.selector, self.stats, self.context)
    }
}

impl<R: Record + Default + 'static> LoaderBuilder<R> {
    pub fn build(mut self) -> ItemLoader<R> {
        let item = self.item.take().unwrap_or_default();
        self.build_with(item)
    }
}

/// Accumulates field values and materializes them into a record.
///
/// # Example
///
/// ```
/// use itemloader::processors::{MapCompose, TakeFirst};
/// use itemloader::functions::title;
/// use itemloader::{ItemLoader, LoaderDefinition};
/// use serde_json::{json, Map, Value};
/// use std::rc::Rc;
///
/// let definition = Rc::new(
///     LoaderDefinition::new("PersonLoader")
///         .with_input("name", MapCompose::new().then(title()))
///         .with_output("name", TakeFirst::new()),
/// );
///
/// let loader: ItemLoader<Map<String, Value>> = ItemLoader::new(definition);
/// loader.add_value("name", json!("marta")).unwrap();
/// loader.add_value("name", json!("PEDRO")).unwrap();
///
/// assert_eq!(loader.get_collected_values("name"), vec![json!("Marta"), json!("Pedro")]);
/// assert_eq!(loader.load_item().unwrap()["name"], json!("Marta"));
/// ```
pub struct ItemLoader<R: Record + 'static> {
    definition: Rc<LoaderDefinition>,
    values: Rc<RefCell<ValueStore>>,
    item: Rc<RefCell<R>>,
    context: LoaderContext,
    selector: Option<Rc<dyn Selector>>,
    stats: Option<Rc<dyn StatsCollector>>,
    positions: RefCell<HashMap<(String, QueryKind), usize>>,
    depth: usize,
}

impl<R: Record + Default + 'static> ItemLoader<R> {
    /// Root loader over a fresh default record
    pub fn new(definition: Rc<LoaderDefinition>) -> Self {
        Self::with_item(definition, R::default())
    }
}

impl<R: Record + 'static> ItemLoader<R> {
    pub fn builder(definition: Rc<LoaderDefinition>) -> LoaderBuilder<R> {
        LoaderBuilder {
            definition,
            item: None,
            selector: None,
            stats: None,
            context: IndexMap::new(),
        }
    }

    /// Root loader over an existing record.
    ///
    /// The record's current field values seed the value store as they are;
    /// they are not passed through input processors.
    pub fn with_item(definition: Rc<LoaderDefinition>, item: R) -> Self {
        Self::root(definition, item, None, None, IndexMap::new())
    }

    fn root(
        definition: Rc<LoaderDefinition>,
        item: R,
        selector: Option<Rc<dyn Selector>>,
        stats: Option<Rc<dyn StatsCollector>>,
        context: IndexMap<String, Value>,
    ) -> Self {
        let mut store = ValueStore::new();
        for (field, value) in item.fields() {
            store.append(&field, arg_to_iter(value));
        }

        let values = Rc::new(RefCell::new(store));
        let item = Rc::new(RefCell::new(item));
        let record: Rc<RefCell<dyn Record>> = item.clone();
        let context = LoaderContext::new(context, record, selector.clone())
            .attach(Rc::clone(&values), Rc::clone(&definition));

        tracing::debug!(
            "Created {} loader with {} seeded field(s)",
            definition.name(),
            values.borrow().len()
        );

        Self {
            definition,
            values,
            item,
            context,
            selector,
            stats,
            positions: RefCell::new(HashMap::new()),
            depth: 0,
        }
    }

    pub fn definition(&self) -> &LoaderDefinition {
        &self.definition
    }

    /// The shared context handed to context-aware processors
    pub fn context(&self) -> &LoaderContext {
        &self.context
    }

    pub fn selector(&self) -> Option<Rc<dyn Selector>> {
        self.selector.clone()
    }

    /// Handle to the target record, shared by the whole loader tree
    pub fn item(&self) -> Rc<RefCell<R>> {
        Rc::clone(&self.item)
    }

    /// `true` for the loader that created the value store
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Number of `nested` calls between this loader and the root
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Add a value to a field.
    pub fn add_value(&self, field: &str, value: Value) -> Result<(), LoaderError> {
        self.add_value_with(Some(field), value, &[], None)
    }

    /// Add a value after running it through a regex and transient processors.
    ///
    /// Without a field name, the computed value must be a mapping and each of
    /// its entries is added to the field of the same name. A computed
    /// "no value" is a no-op. Every entry goes through its input processor
    /// before anything is stored, so a failing call stores nothing.
    pub fn add_value_with(
        &self,
        field: Option<&str>,
        value: Value,
        processors: &[&dyn Processor],
        re: Option<&Regex>,
    ) -> Result<(), LoaderError> {
        let Some(value) = self.get_value_with(value, processors, re)? else {
            return Ok(());
        };

        for (field, processed) in self.process_entries(field, value)? {
            self.commit(&field, processed, false);
        }
        Ok(())
    }

    /// Replace the collected values of a field.
    pub fn replace_value(&self, field: &str, value: Value) -> Result<(), LoaderError> {
        self.replace_value_with(Some(field), value, &[], None)
    }

    /// Like [`Self::add_value_with`], but discards the field's collected
    /// values. They are only discarded once the new values went through the
    /// input processor; a computed "no value" leaves them untouched.
    pub fn replace_value_with(
        &self,
        field: Option<&str>,
        value: Value,
        processors: &[&dyn Processor],
        re: Option<&Regex>,
    ) -> Result<(), LoaderError> {
        let Some(value) = self.get_value_with(value, processors, re)? else {
            return Ok(());
        };

        for (field, processed) in self.process_entries(field, value)? {
            self.commit(&field, processed, true);
        }
        Ok(())
    }

    /// Compute a value without storing it.
    pub fn get_value(&self, value: Value, processors: &[&dyn Processor]) -> Result<Option<Value>, LoaderError> {
        self.get_value_with(value, processors, None)
    }

    /// Compute a value: apply the regex (if any), then each processor in
    /// turn, stopping at the first "no value".
    pub fn get_value_with(
        &self,
        value: Value,
        processors: &[&dyn Processor],
        re: Option<&Regex>,
    ) -> Result<Option<Value>, LoaderError> {
        let mut value = if value.is_null() { None } else { Some(value) };

        if let Some(re) = re {
            let extracted = opt_to_iter(value)
                .iter()
                .flat_map(|v| extract_regex(re, &as_text(v)))
                .map(Value::String)
                .collect();
            value = Some(Value::Array(extracted));
        }

        for processor in processors {
            let Some(current) = value else {
                break;
            };
            let bound = wrap_loader_context(*processor, &self.context);
            value = bound
                .call(Some(current.clone()))
                .map_err(|source| LoaderError::Processor {
                    stage: ProcessorStage::Argument,
                    processor: processor.name(),
                    field: None,
                    value: render(&current),
                    source,
                })?;
        }

        Ok(value)
    }

    /// Values collected so far for a field, before output processing
    pub fn get_collected_values(&self, field: &str) -> Vec<Value> {
        self.values.borrow().get(field).to_vec()
    }

    /// Run a field's collected values through its output processor.
    ///
    /// The record is not modified.
    pub fn get_output_value(&self, field: &str) -> Result<Option<Value>, LoaderError> {
        let collected = Value::Array(self.get_collected_values(field));
        let processor = self.definition.output_processor(field);
        let bound = wrap_loader_context(processor.as_ref(), &self.context);

        tracing::trace!("Running output processor {} for field '{}'", processor.name(), field);

        bound
            .call(Some(collected.clone()))
            .map_err(|source| LoaderError::Processor {
                stage: ProcessorStage::Output,
                processor: processor.name(),
                field: Some(field.to_string()),
                value: render(&collected),
                source,
            })
    }

    /// Write the output value of every collected field into the record.
    ///
    /// Fields whose output is "no value" are left as they are. Every loader
    /// of a tree loads into the same record.
    pub fn load_item(&self) -> Result<R, LoaderError>
    where
        R: Clone,
    {
        self.populate()?;
        Ok(self.item.borrow().clone())
    }

    /// Same as [`Self::load_item`], returning the shared record handle.
    ///
    /// All output values are computed and checked against the record before
    /// the first one is written; on error the record is unchanged.
    pub fn populate(&self) -> Result<Rc<RefCell<R>>, LoaderError> {
        let fields = self.values.borrow().field_names();

        let mut outputs = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(value) = self.get_output_value(&field)? {
                outputs.push((field, value));
            }
        }

        let written = outputs.len();
        {
            let mut item = self.item.borrow_mut();
            for (field, _) in &outputs {
                item.check_field(field)?;
            }
            for (field, value) in outputs {
                item.set_field(&field, value)?;
            }
        }

        tracing::debug!("Loaded {} field(s) into {} item", written, self.definition.name());
        Ok(self.item())
    }

    /// Create a loader scoped to the part of the document matched by `query`.
    pub fn nested(&self, kind: QueryKind, query: &str) -> Result<ItemLoader<R>, LoaderError> {
        self.nested_with(kind, query, IndexMap::new())
    }

    /// Like [`Self::nested`], with extra context values visible only to the
    /// new loader (and loaders nested under it).
    pub fn nested_with(
        &self,
        kind: QueryKind,
        query: &str,
        context: IndexMap<String, Value>,
    ) -> Result<ItemLoader<R>, LoaderError> {
        let selector = self.require_selector("nested")?;
        let scope = selector.descend(kind, query)?;

        tracing::debug!("Nesting {} loader at {} '{}'", self.definition.name(), kind, query);

        Ok(ItemLoader {
            definition: Rc::clone(&self.definition),
            values: Rc::clone(&self.values),
            item: Rc::clone(&self.item),
            context: self.context.scoped(Rc::clone(&scope), context),
            selector: Some(scope),
            stats: self.stats.clone(),
            positions: RefCell::new(HashMap::new()),
            depth: self.depth + 1,
        })
    }

    pub fn nested_css(&self, query: &str) -> Result<ItemLoader<R>, LoaderError> {
        self.nested(QueryKind::Css, query)
    }

    pub fn nested_xpath(&self, query: &str) -> Result<ItemLoader<R>, LoaderError> {
        self.nested(QueryKind::Xpath, query)
    }

    pub fn nested_jmes(&self, query: &str) -> Result<ItemLoader<R>, LoaderError> {
        self.nested(QueryKind::Jmes, query)
    }

    /// Add the values extracted by `query` to a field.
    pub fn add_query(&self, field: Option<&str>, query: &Query) -> Result<(), LoaderError> {
        let values = self.get_selector_values(field, query, "add_query")?;
        self.add_value_with(field, Value::Array(values), &query.processor_refs(), query.re.as_ref())
    }

    /// Replace a field's values with the values extracted by `query`.
    pub fn replace_query(&self, field: Option<&str>, query: &Query) -> Result<(), LoaderError> {
        let values = self.get_selector_values(field, query, "replace_query")?;
        self.replace_value_with(field, Value::Array(values), &query.processor_refs(), query.re.as_ref())
    }

    /// Compute the value extracted by `query` without storing it.
    pub fn get_query(&self, query: &Query) -> Result<Option<Value>, LoaderError> {
        let values = self.get_selector_values(None, query, "get_query")?;
        self.get_value_with(Value::Array(values), &query.processor_refs(), query.re.as_ref())
    }

    pub fn add_css(&self, field: &str, query: &str) -> Result<(), LoaderError> {
        self.add_query(Some(field), &Query::css(query))
    }

    pub fn add_xpath(&self, field: &str, query: &str) -> Result<(), LoaderError> {
        self.add_query(Some(field), &Query::xpath(query))
    }

    pub fn add_jmes(&self, field: &str, query: &str) -> Result<(), LoaderError> {
        self.add_query(Some(field), &Query::jmes(query))
    }

    pub fn replace_css(&self, field: &str, query: &str) -> Result<(), LoaderError> {
        self.replace_query(Some(field), &Query::css(query))
    }

    pub fn replace_xpath(&self, field: &str, query: &str) -> Result<(), LoaderError> {
        self.replace_query(Some(field), &Query::xpath(query))
    }

    pub fn replace_jmes(&self, field: &str, query: &str) -> Result<(), LoaderError> {
        self.replace_query(Some(field), &Query::jmes(query))
    }

    pub fn get_css(&self, query: &str) -> Result<Option<Value>, LoaderError> {
        self.get_query(&Query::css(query))
    }

    pub fn get_xpath(&self, query: &str) -> Result<Option<Value>, LoaderError> {
        self.get_query(&Query::xpath(query))
    }

    pub fn get_jmes(&self, query: &str) -> Result<Option<Value>, LoaderError> {
        self.get_query(&Query::jmes(query))
    }

    /// Report one query rule to the stats sink.
    ///
    /// The key is `<loader>/<field>/<kind>/<position>[/<name>]`, suffixed
    /// with `/missing` when the rule produced nothing. Nothing is reported
    /// without a sink or without a field.
    pub fn write_to_stats(
        &self,
        field: Option<&str>,
        data: &[Value],
        position: usize,
        kind: QueryKind,
        name: Option<&str>,
    ) {
        let (Some(stats), Some(field)) = (&self.stats, field) else {
            return;
        };

        let key = stats_key(
            self.definition.name(),
            field,
            kind.as_str(),
            position,
            name,
            data.is_empty(),
        );
        stats.inc_value(&key);
    }

    fn get_selector_values(
        &self,
        field: Option<&str>,
        query: &Query,
        operation: &'static str,
    ) -> Result<Vec<Value>, LoaderError> {
        let selector = self.require_selector(operation)?;
        let counter = field.map(|f| (f.to_string(), query.kind));
        let start = counter
            .as_ref()
            .and_then(|key| self.positions.borrow().get(key).copied())
            .unwrap_or(0);

        let mut collected = Vec::new();
        for (offset, rule) in query.rules.iter().enumerate() {
            let data = selector.select_all(query.kind, rule)?;
            self.write_to_stats(field, &data, start + offset + 1, query.kind, query.name.as_deref());
            collected.push(Value::Array(data));
        }

        if let Some(key) = counter {
            *self.positions.borrow_mut().entry(key).or_insert(0) += query.rules.len();
        }

        Ok(flatten(collected))
    }

    fn require_selector(&self, operation: &'static str) -> Result<Rc<dyn Selector>, LoaderError> {
        self.selector
            .clone()
            .ok_or(LoaderError::MissingSelector { operation })
    }

    /// Run the target field(s) of an add or replace through their input
    /// processors, without touching the value store.
    fn process_entries(
        &self,
        field: Option<&str>,
        value: Value,
    ) -> Result<Vec<(String, Option<Vec<Value>>)>, LoaderError> {
        match field.filter(|f| !f.is_empty()) {
            Some(field) => Ok(vec![(field.to_string(), self.process_input(field, value)?)]),
            None => expect_mapping(value)?
                .into_iter()
                .map(|(key, entry)| -> Result<_, LoaderError> {
                    let processed = self.process_input(&key, entry)?;
                    Ok((key, processed))
                })
                .collect(),
        }
    }

    /// Input-process a value; `None` when nothing is left to store.
    fn process_input(&self, field: &str, value: Value) -> Result<Option<Vec<Value>>, LoaderError> {
        let values = Value::Array(arg_to_iter(value));
        let processor = self.definition.input_processor(field);
        let bound = wrap_loader_context(processor.as_ref(), &self.context);

        let processed = bound
            .call(Some(values.clone()))
            .map_err(|source| LoaderError::Processor {
                stage: ProcessorStage::Input,
                processor: processor.name(),
                field: Some(field.to_string()),
                value: render(&values),
                source,
            })?;

        if is_empty(&processed) {
            tracing::trace!("Input processor {} left nothing for field '{}'", processor.name(), field);
            return Ok(None);
        }
        Ok(Some(opt_to_iter(processed)))
    }

    fn commit(&self, field: &str, processed: Option<Vec<Value>>, replace: bool) {
        let mut values = self.values.borrow_mut();
        if replace {
            values.clear(field);
        }
        if let Some(processed) = processed {
            tracing::debug!("Collected {} value(s) for field '{}'", processed.len(), field);
            values.append(field, processed);
        }
    }
}

impl<R: Record + 'static> fmt::Debug for ItemLoader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemLoader")
            .field("definition", &self.definition.name())
            .field("values", &self.values.borrow())
            .field("has_selector", &self.selector.is_some())
            .field("depth", &self.depth)
            .finish()
    }
}

fn field_repr(field: &Option<String>) -> String {
    match field {
        Some(field) => format!("'{}'", field),
        None => "None".to_string(),
    }
}

fn expect_mapping(value: Value) -> Result<serde_json::Map<String, Value>, LoaderError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LoaderError::ExpectedMapping {
            value: render(&other),
        }),
    }
}
