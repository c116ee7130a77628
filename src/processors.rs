//! Built-in processors.
//!
//! Each processor takes one value (usually the list of collected values of a
//! field) and returns one value. They compose: `Compose` and `MapCompose`
//! accept any [`Processor`], including each other.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

use crate::extraction::FieldPath;
use crate::processor::{wrap_loader_context, Args, ProcessError, Processor, LOADER_CONTEXT};
use crate::runtime::context::LoaderContext;
use crate::utils::{opt_to_iter, render_opt};

fn composite_args() -> Vec<String> {
    vec!["value".to_string(), LOADER_CONTEXT.to_string()]
}

/// Context seen by the functions of a composite processor.
fn composite_context(args: &Args, defaults: &Rc<IndexMap<String, Value>>) -> LoaderContext {
    match args.context() {
        Some(context) => context.with_defaults(defaults),
        None => LoaderContext::detached(defaults.as_ref().clone()),
    }
}

/// Apply functions one after the other to a single value.
///
/// With `stop_on_none` (the default), a "no value" result ends the chain and
/// is returned as is.
///
/// # Example
///
/// ```
/// use itemloader::processor::{from_fn, Args, Processor};
/// use itemloader::processors::{Compose, TakeFirst};
/// use serde_json::json;
///
/// let upper = from_fn("upper", |v| Ok(v.as_str().map(|s| json!(s.to_uppercase()))));
/// let proc = Compose::new().then(TakeFirst::new()).then(upper);
/// let out = proc.call(Some(json!(["hello", "world"])), &Args::default()).unwrap();
/// assert_eq!(out, Some(json!("HELLO")));
/// ```
#[derive(Clone)]
pub struct Compose {
    functions: Vec<Rc<dyn Processor>>,
    stop_on_none: bool,
    defaults: Rc<IndexMap<String, Value>>,
}

impl Compose {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            stop_on_none: true,
            defaults: Rc::default(),
        }
    }

    /// Build from an existing list of processors
    pub fn of(functions: Vec<Rc<dyn Processor>>) -> Self {
        Self {
            functions,
            ..Self::new()
        }
    }

    /// Append a function to the chain
    pub fn then(mut self, function: impl Processor + 'static) -> Self {
        self.functions.push(Rc::new(function));
        self
    }

    /// Keep calling functions after a "no value" result
    pub fn stop_on_none(mut self, stop: bool) -> Self {
        self.stop_on_none = stop;
        self
    }

    /// Declaration-time context value, shadowed by the live loader context
    pub fn with_default(mut self, key: impl Into<String>, value: Value) -> Self {
        Rc::make_mut(&mut self.defaults).insert(key.into(), value);
        self
    }
}

impl Default for Compose {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Compose {
    fn name(&self) -> String {
        "Compose".to_string()
    }

    fn arg_names(&self) -> Vec<String> {
        composite_args()
    }

    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError> {
        let context = composite_context(args, &self.defaults);
        let mut value = value;

        for function in &self.functions {
            if value.is_none() && self.stop_on_none {
                break;
            }
            let bound = wrap_loader_context(function.as_ref(), &context);
            value = bound.call(value.clone()).map_err(|err| ProcessError::Step {
                composite: "Compose",
                function: function.name(),
                value: render_opt(value.as_ref()),
                source: Box::new(err),
            })?;
        }

        Ok(value)
    }
}

impl fmt::Debug for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.functions.iter().map(|p| p.name()).collect();
        f.debug_struct("Compose")
            .field("functions", &names)
            .field("stop_on_none", &self.stop_on_none)
            .finish()
    }
}

/// Apply functions to every element of a list.
///
/// Each stage runs over the output of the previous one. Elements for which a
/// function returns "no value" are dropped; a list result is spliced in
/// place. The result is always a list.
#[derive(Clone, Default)]
pub struct MapCompose {
    functions: Vec<Rc<dyn Processor>>,
    defaults: Rc<IndexMap<String, Value>>,
}

impl MapCompose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(functions: Vec<Rc<dyn Processor>>) -> Self {
        Self {
            functions,
            defaults: Rc::default(),
        }
    }

    pub fn then(mut self, function: impl Processor + 'static) -> Self {
        self.functions.push(Rc::new(function));
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: Value) -> Self {
        Rc::make_mut(&mut self.defaults).insert(key.into(), value);
        self
    }
}

impl Processor for MapCompose {
    fn name(&self) -> String {
        "MapCompose".to_string()
    }

    fn arg_names(&self) -> Vec<String> {
        composite_args()
    }

    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError> {
        let context = composite_context(args, &self.defaults);
        let mut values = opt_to_iter(value);

        for function in &self.functions {
            let bound = wrap_loader_context(function.as_ref(), &context);
            let mut next = Vec::with_capacity(values.len());
            for element in values {
                let out = bound
                    .call(Some(element.clone()))
                    .map_err(|err| ProcessError::Step {
                        composite: "MapCompose",
                        function: function.name(),
                        value: element.to_string(),
                        source: Box::new(err),
                    })?;
                next.extend(opt_to_iter(out));
            }
            values = next;
        }

        Ok(Some(Value::Array(values)))
    }
}

impl fmt::Debug for MapCompose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.functions.iter().map(|p| p.name()).collect();
        f.debug_struct("MapCompose").field("functions", &names).finish()
    }
}

/// First element that is neither null nor an empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TakeFirst;

impl TakeFirst {
    pub fn new() -> Self {
        TakeFirst
    }
}

impl Processor for TakeFirst {
    fn name(&self) -> String {
        "TakeFirst".to_string()
    }

    fn call(&self, value: Option<Value>, _args: &Args) -> Result<Option<Value>, ProcessError> {
        Ok(opt_to_iter(value)
            .into_iter()
            .find(|v| !v.is_null() && v.as_str() != Some("")))
    }
}

/// Join a list of strings with a separator.
///
/// Fails with a type error when the input is not a list of strings.
#[derive(Debug, Clone)]
pub struct Join {
    separator: String,
}

impl Join {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for Join {
    fn default() -> Self {
        Self::new(" ")
    }
}

impl Processor for Join {
    fn name(&self) -> String {
        "Join".to_string()
    }

    fn call(&self, value: Option<Value>, _args: &Args) -> Result<Option<Value>, ProcessError> {
        let items = match value {
            Some(Value::Array(items)) => items,
            other => {
                return Err(ProcessError::InvalidType(format!(
                    "can only join a list, got {}",
                    render_opt(other.as_ref())
                )))
            }
        };

        let mut parts = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) => parts.push(s),
                None => {
                    return Err(ProcessError::InvalidType(format!(
                        "sequence item {}: expected string, found {}",
                        index, item
                    )))
                }
            }
        }

        Ok(Some(Value::String(parts.join(&self.separator))))
    }
}

/// Return the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Identity {
    pub fn new() -> Self {
        Identity
    }
}

impl Processor for Identity {
    fn name(&self) -> String {
        "Identity".to_string()
    }

    fn call(&self, value: Option<Value>, _args: &Args) -> Result<Option<Value>, ProcessError> {
        Ok(value)
    }
}

/// Query a single JSON value with a path such as `foo.bar[*].name`.
///
/// Paths that do not resolve, or resolve to null, yield "no value".
#[derive(Debug, Clone)]
pub struct SelectJmes {
    path: FieldPath,
}

impl SelectJmes {
    pub fn new(path: &str) -> Result<Self, crate::extraction::PathError> {
        Ok(Self {
            path: FieldPath::parse_query(path)?,
        })
    }
}

impl Processor for SelectJmes {
    fn name(&self) -> String {
        "SelectJmes".to_string()
    }

    fn call(&self, value: Option<Value>, _args: &Args) -> Result<Option<Value>, ProcessError> {
        Ok(value
            .and_then(|v| self.path.resolve(&v))
            .filter(|v| !v.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{from_fn, from_fn_with_context};
    use serde_json::json;

    fn call(p: &dyn Processor, value: Value) -> Result<Option<Value>, ProcessError> {
        p.call(Some(value), &Args::default())
    }

    fn upper() -> impl Processor {
        from_fn("upper", |v| match v {
            Value::String(s) => Ok(Some(json!(s.to_uppercase()))),
            other => Err(ProcessError::InvalidType(format!("upper expects a string, got {}", other))),
        })
    }

    fn filter_world() -> impl Processor {
        from_fn("filter_world", |v| Ok(if v == json!("world") { None } else { Some(v) }))
    }

    #[test]
    fn test_take_first() {
        let proc = TakeFirst::new();
        assert_eq!(call(&proc, json!([null, "", "hello", "world"])).unwrap(), Some(json!("hello")));
        assert_eq!(call(&proc, json!([null, "", 0, "hello"])).unwrap(), Some(json!(0)));
        assert_eq!(call(&proc, json!([null, ""])).unwrap(), None);
        assert_eq!(proc.call(None, &Args::default()).unwrap(), None);
    }

    #[test]
    fn test_identity() {
        let proc = Identity::new();
        let input = json!([null, "", "hello", "world"]);
        assert_eq!(call(&proc, input.clone()).unwrap(), Some(input));
    }

    #[test]
    fn test_join() {
        let proc = Join::default();
        assert_eq!(call(&proc, json!(["", "hello", "world"])).unwrap(), Some(json!(" hello world")));
        assert_eq!(call(&proc, json!(["hello", "world"])).unwrap(), Some(json!("hello world")));

        let err = call(&proc, json!([null, "", "hello"])).unwrap_err();
        assert!(err.is_type_error());

        let proc = Join::new("<br>");
        assert_eq!(call(&proc, json!(["Mar", "Ta"])).unwrap(), Some(json!("Mar<br>Ta")));
    }

    #[test]
    fn test_compose() {
        let first = from_fn("first", |v| Ok(v.as_array().and_then(|a| a.first().cloned())));
        let proc = Compose::new().then(first).then(upper());
        assert_eq!(call(&proc, json!(["hello", "world"])).unwrap(), Some(json!("HELLO")));

        let proc = Compose::new().then(upper());
        assert_eq!(proc.call(None, &Args::default()).unwrap(), None);
    }

    #[test]
    fn test_compose_without_stop_on_none() {
        let proc = Compose::new().then(upper()).stop_on_none(false);
        let err = proc.call(None, &Args::default()).unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Error in Compose with upper"), "{}", message);
        assert!(err.root_cause().is_type_error());
    }

    #[test]
    fn test_compose_wraps_stage_error() {
        let add_one = from_fn("add_one", |v| {
            v.as_i64()
                .map(|n| Some(json!(n + 1)))
                .ok_or_else(|| ProcessError::InvalidType(format!("unsupported operand: {}", v)))
        });
        let proc = Compose::new().then(upper()).then(add_one);
        let err = call(&proc, json!("hello")).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Error in Compose with add_one"), "{}", message);
        assert!(message.contains("value=\"HELLO\""), "{}", message);
        assert!(message.contains("Invalid type: unsupported operand"), "{}", message);
    }

    #[test]
    fn test_mapcompose() {
        let proc = MapCompose::new().then(filter_world()).then(upper());
        assert_eq!(
            call(&proc, json!(["hello", "world", "this", "is", "scrapy"])).unwrap(),
            Some(json!(["HELLO", "THIS", "IS", "SCRAPY"]))
        );
        assert_eq!(proc.call(None, &Args::default()).unwrap(), Some(json!([])));

        let err = call(&proc, json!([1])).unwrap_err();
        assert!(err.to_string().starts_with("Error in MapCompose with upper value=1"));
    }

    #[test]
    fn test_mapcompose_splices_lists() {
        let split = from_fn("split", |v| {
            let parts: Vec<Value> = v
                .as_str()
                .unwrap_or_default()
                .split(',')
                .map(|s| json!(s))
                .collect();
            Ok(Some(Value::Array(parts)))
        });
        let proc = MapCompose::new().then(split).then(upper());
        assert_eq!(call(&proc, json!(["a,b", "c"])).unwrap(), Some(json!(["A", "B", "C"])));
    }

    #[test]
    fn test_empty_mapcompose_returns_list() {
        let proc = MapCompose::new();
        assert_eq!(call(&proc, json!("marta")).unwrap(), Some(json!(["marta"])));
    }

    #[test]
    fn test_composite_declaration_defaults() {
        let lookup = from_fn_with_context("lookup", |v, ctx| Ok(Some(ctx.get("key").unwrap_or(v))));
        let proc = MapCompose::new().then(lookup).with_default("key", json!("val"));

        assert_eq!(call(&proc, json!(["text"])).unwrap(), Some(json!(["val"])));

        let mut live = IndexMap::new();
        live.insert("key".to_string(), json!("live"));
        let args = Args::new(Some(LoaderContext::detached(live)));
        assert_eq!(proc.call(Some(json!(["text"])), &args).unwrap(), Some(json!(["live"])));
    }

    #[test]
    fn test_select_jmes() {
        let cases = vec![
            ("foo.bar", json!({"foo": {"bar": "baz"}}), Some(json!("baz"))),
            ("foo.bar.baz", json!({"foo": {"bar": "baz"}}), None),
            ("foo", json!({"foo": {"bar": "baz"}}), Some(json!({"bar": "baz"}))),
            (
                "foo.bar[*].name",
                json!({"foo": {"bar": [{"name": "one"}, {"name": "two"}]}}),
                Some(json!(["one", "two"])),
            ),
            ("[1]", json!([1, 2]), Some(json!(2))),
        ];

        for (path, input, expected) in cases {
            let proc = SelectJmes::new(path).unwrap();
            assert_eq!(call(&proc, input).unwrap(), expected, "path {}", path);
        }
    }
}
