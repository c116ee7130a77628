//! The processor seam.
//!
//! A processor is anything that turns an optional value into an optional
//! value. Processors declare their parameter names so that a loader can tell,
//! per call, whether to hand them the shared [`LoaderContext`].

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

use crate::runtime::context::LoaderContext;
use crate::utils::render_opt;

/// Parameter name that marks a processor as context-aware.
pub const LOADER_CONTEXT: &str = "loader_context";

/// Error type for processor execution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessError {
    /// The processor got a value of a type it cannot handle
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// The processor got a value of the right type but cannot use it
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Any other failure, tagged with the originating error type
    #[error("{kind}: {message}")]
    Failed { kind: String, message: String },

    /// A stage of a composite processor failed
    #[error("Error in {composite} with {function} value={value} error='{source}'")]
    Step {
        composite: &'static str,
        function: String,
        value: String,
        source: Box<ProcessError>,
    },
}

impl ProcessError {
    /// Wrap an arbitrary error, keeping its type name.
    pub fn from_error<E: std::error::Error>(err: E) -> Self {
        let kind = std::any::type_name::<E>();
        ProcessError::Failed {
            kind: kind.rsplit("::").next().unwrap_or(kind).to_string(),
            message: err.to_string(),
        }
    }

    /// The innermost error of a chain of composite stages.
    pub fn root_cause(&self) -> &ProcessError {
        match self {
            ProcessError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, ProcessError::InvalidType(_))
    }
}

/// Extra arguments for a processor call.
///
/// `context` is only set when the processor declares `loader_context`.
/// `kwargs` holds keyword arguments bound through [`Partial`].
#[derive(Debug, Clone, Default)]
pub struct Args {
    context: Option<LoaderContext>,
    kwargs: IndexMap<String, Value>,
}

impl Args {
    pub fn new(context: Option<LoaderContext>) -> Self {
        Self {
            context,
            kwargs: IndexMap::new(),
        }
    }

    pub fn context(&self) -> Option<&LoaderContext> {
        self.context.as_ref()
    }

    /// Keyword argument bound by partial application
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}

/// A value transformation.
///
/// `arg_names` lists the formal parameters of the processor, the value
/// first. It drives context injection: a processor is handed the loader
/// context only when `loader_context` is among them.
pub trait Processor {
    /// Name used in error messages
    fn name(&self) -> String;

    /// Formal parameter names
    fn arg_names(&self) -> Vec<String> {
        vec!["values".to_string()]
    }

    /// Run the processor. `None` is the "no value" marker, in and out.
    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError>;
}

impl<P: Processor + ?Sized> Processor for Rc<P> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn arg_names(&self) -> Vec<String> {
        (**self).arg_names()
    }

    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError> {
        (**self).call(value, args)
    }
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn arg_names(&self) -> Vec<String> {
        (**self).arg_names()
    }

    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError> {
        (**self).call(value, args)
    }
}

/// Return the argument names of a processor.
///
/// Names already bound by partial application are left out. With
/// `strip_self`, a leading `self` receiver is removed as well. Processors
/// that do not describe their parameters yield an empty list.
pub fn get_func_args(processor: &dyn Processor, strip_self: bool) -> Vec<String> {
    let mut args = processor.arg_names();
    if strip_self && args.first().map(String::as_str) == Some("self") {
        args.remove(0);
    }
    args
}

/// A processor with the loader context resolved for one call site.
pub struct ContextBound<'p> {
    processor: &'p dyn Processor,
    context: Option<LoaderContext>,
}

impl ContextBound<'_> {
    /// Call the processor with a single value.
    pub fn call(&self, value: Option<Value>) -> Result<Option<Value>, ProcessError> {
        let args = Args::new(self.context.clone());
        self.processor.call(value, &args)
    }

    /// `true` if the loader context will be passed on.
    pub fn receives_context(&self) -> bool {
        self.context.is_some()
    }
}

/// Bind `context` to `processor` if, and only if, it declares
/// `loader_context`.
pub fn wrap_loader_context<'p>(
    processor: &'p dyn Processor,
    context: &LoaderContext,
) -> ContextBound<'p> {
    let wants_context = get_func_args(processor, false)
        .iter()
        .any(|arg| arg == LOADER_CONTEXT);

    ContextBound {
        processor,
        context: wants_context.then(|| context.clone()),
    }
}

type FunctionImpl = dyn Fn(Option<Value>, &Args) -> Result<Option<Value>, ProcessError>;

/// Closure-backed processor with declared parameter names.
pub struct Function {
    name: String,
    params: Vec<String>,
    func: Box<FunctionImpl>,
}

impl Function {
    /// Create a function processor with an explicit parameter list.
    ///
    /// # Example
    ///
    /// ```
    /// use itemloader::processor::{Args, Function, Processor};
    /// use serde_json::{json, Value};
    ///
    /// let join = Function::new("join", &["values", "sep"], |value, args| {
    ///     let sep = args.get("sep").and_then(Value::as_str).unwrap_or("");
    ///     let parts: Vec<String> = value
    ///         .and_then(|v| v.as_array().cloned())
    ///         .unwrap_or_default()
    ///         .iter()
    ///         .filter_map(|v| v.as_str().map(String::from))
    ///         .collect();
    ///     Ok(Some(Value::String(parts.join(sep))))
    /// });
    /// assert_eq!(join.call(Some(json!(["a", "b"])), &Args::default()).unwrap(), Some(json!("ab")));
    /// ```
    pub fn new<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
    where
        F: Fn(Option<Value>, &Args) -> Result<Option<Value>, ProcessError> + 'static,
    {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            func: Box::new(func),
        }
    }
}

impl Processor for Function {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn arg_names(&self) -> Vec<String> {
        self.params.clone()
    }

    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError> {
        (self.func)(value, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// One-argument processor from a closure.
///
/// The closure is not called for the "no value" marker; that case fails with
/// a type error, since the closure only accepts an actual value.
pub fn from_fn<F>(name: impl Into<String>, func: F) -> Function
where
    F: Fn(Value) -> Result<Option<Value>, ProcessError> + 'static,
{
    let name = name.into();
    let label = name.clone();
    Function::new(name, &["value"], move |value, _args| match value {
        Some(value) => func(value),
        None => Err(ProcessError::InvalidType(format!(
            "{} expected a value, got None",
            label
        ))),
    })
}

/// Context-aware processor from a closure.
///
/// Outside a loader, the closure gets an empty detached context.
pub fn from_fn_with_context<F>(name: impl Into<String>, func: F) -> Function
where
    F: Fn(Value, &LoaderContext) -> Result<Option<Value>, ProcessError> + 'static,
{
    let name = name.into();
    let label = name.clone();
    Function::new(name, &["value", LOADER_CONTEXT], move |value, args| {
        let value = value.ok_or_else(|| {
            ProcessError::InvalidType(format!("{} expected a value, got None", label))
        })?;
        match args.context() {
            Some(context) => func(value, context),
            None => func(value, &LoaderContext::default()),
        }
    })
}

/// Partial application over a processor.
///
/// Bound keyword arguments disappear from the processor's argument names.
/// Binding `loader_context` fixes the context the processor sees, so the
/// loader no longer injects its own.
pub struct Partial {
    inner: Rc<dyn Processor>,
    kwargs: IndexMap<String, Value>,
    context: Option<LoaderContext>,
}

impl Partial {
    pub fn new(inner: impl Processor + 'static) -> Self {
        Self {
            inner: Rc::new(inner),
            kwargs: IndexMap::new(),
            context: None,
        }
    }

    /// Bind a keyword argument
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    /// Bind a fixed `loader_context`
    pub fn bind_context(mut self, values: IndexMap<String, Value>) -> Self {
        self.context = Some(LoaderContext::detached(values));
        self
    }
}

impl Processor for Partial {
    fn name(&self) -> String {
        format!("partial({})", self.inner.name())
    }

    fn arg_names(&self) -> Vec<String> {
        self.inner
            .arg_names()
            .into_iter()
            .filter(|arg| !self.kwargs.contains_key(arg))
            .filter(|arg| !(self.context.is_some() && arg == LOADER_CONTEXT))
            .collect()
    }

    fn call(&self, value: Option<Value>, args: &Args) -> Result<Option<Value>, ProcessError> {
        let mut kwargs = args.kwargs.clone();
        for (name, bound) in &self.kwargs {
            kwargs.insert(name.clone(), bound.clone());
        }
        let context = self.context.clone().or_else(|| args.context.clone());

        tracing::trace!("Calling {} with value={}", self.name(), render_opt(value.as_ref()));
        self.inner.call(value, &Args { context, kwargs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn join_fn() -> Function {
        Function::new(
            "join",
            &["values", "sep", "loader_context", "ignored"],
            |value, args| {
                let parts: Vec<String> = value
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect();
                let sep = match args.get("sep").and_then(Value::as_str) {
                    Some(sep) => sep.to_string(),
                    None => args
                        .context()
                        .and_then(|ctx| ctx.get("sep"))
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_default(),
                };
                Ok(Some(Value::String(parts.join(&sep))))
            },
        )
    }

    #[test]
    fn test_get_func_args() {
        let f = join_fn();
        assert_eq!(
            get_func_args(&f, false),
            vec!["values", "sep", "loader_context", "ignored"]
        );

        let partial = Partial::new(join_fn()).bind("sep", json!("+"));
        assert_eq!(
            get_func_args(&partial, false),
            vec!["values", "loader_context", "ignored"]
        );

        let partial = Partial::new(Partial::new(join_fn()).bind("sep", json!("+")))
            .bind("ignored", json!("foo"));
        assert_eq!(get_func_args(&partial, false), vec!["values", "loader_context"]);
    }

    #[test]
    fn test_get_func_args_strip_self() {
        let method = Function::new("method", &["self", "a", "b"], |v, _| Ok(v));
        assert_eq!(get_func_args(&method, true), vec!["a", "b"]);
        assert_eq!(get_func_args(&method, false), vec!["self", "a", "b"]);
    }

    #[test]
    fn test_opaque_processor_has_no_args() {
        let opaque = Function::new("opaque", &[], |v, _| Ok(v));
        assert!(get_func_args(&opaque, false).is_empty());

        let ctx = LoaderContext::detached(IndexMap::new());
        assert!(!wrap_loader_context(&opaque, &ctx).receives_context());
    }

    #[test]
    fn test_wrap_loader_context_only_when_declared() {
        let ctx = LoaderContext::detached(IndexMap::new());

        let plain = from_fn("plain", |v| Ok(Some(v)));
        assert!(!wrap_loader_context(&plain, &ctx).receives_context());

        let aware = from_fn_with_context("aware", |v, _ctx| Ok(Some(v)));
        assert!(wrap_loader_context(&aware, &ctx).receives_context());
    }

    #[test]
    fn test_partial_bound_context_wins() {
        let mut bound = IndexMap::new();
        bound.insert("sep".to_string(), json!("."));
        let partial = Partial::new(join_fn()).bind_context(bound);

        assert!(!get_func_args(&partial, false).contains(&LOADER_CONTEXT.to_string()));

        let mut live = IndexMap::new();
        live.insert("sep".to_string(), json!("-"));
        let args = Args::new(Some(LoaderContext::detached(live)));

        let out = partial.call(Some(json!(["rabbit", "hole"])), &args).unwrap();
        assert_eq!(out, Some(json!("rabbit.hole")));
    }

    #[test]
    fn test_from_fn_rejects_none() {
        let upper = from_fn("upper", |v| Ok(Some(v)));
        let err = upper.call(None, &Args::default()).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_from_error_keeps_type_name() {
        let parse_err = "$10".parse::<f64>().unwrap_err();
        let expected = parse_err.to_string();
        let err = ProcessError::from_error(parse_err);

        let message = err.to_string();
        assert!(message.starts_with("ParseFloatError: "), "{}", message);
        assert!(message.contains(&expected));
    }
}
