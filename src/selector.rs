//! Extraction scopes.
//!
//! A [`Selector`] evaluates structural queries against some underlying
//! document. Loaders only depend on this trait; the crate ships
//! [`JsonSelector`] for JSON documents, and HTML/XML engines can plug in
//! by implementing it.

use serde_json::Value;
use std::fmt;
use std::rc::Rc;

use crate::extraction::{FieldPath, PathError};

/// Query languages a selector may understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Css,
    Xpath,
    Jmes,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Css => "css",
            QueryKind::Xpath => "xpath",
            QueryKind::Jmes => "jmes",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for selector evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectorError {
    #[error("{selector} does not support {kind} queries")]
    UnsupportedKind { selector: String, kind: QueryKind },

    #[error("Invalid {kind} query '{query}': {reason}")]
    InvalidQuery {
        kind: QueryKind,
        query: String,
        reason: String,
    },
}

/// A scope that structural queries run against.
pub trait Selector {
    /// All matches of `query`, as values (typically strings)
    fn select_all(&self, kind: QueryKind, query: &str) -> Result<Vec<Value>, SelectorError>;

    /// The narrower scope selected by `query`
    fn descend(&self, kind: QueryKind, query: &str) -> Result<Rc<dyn Selector>, SelectorError>;
}

/// Selector over a JSON document, answering `jmes` path queries.
///
/// # Example
///
/// ```
/// use itemloader::{JsonSelector, QueryKind, Selector};
/// use serde_json::json;
///
/// let doc = JsonSelector::new(json!({"website": {"url": "http://www.scrapy.org"}}));
/// let urls = doc.select_all(QueryKind::Jmes, "website.url").unwrap();
/// assert_eq!(urls, vec![json!("http://www.scrapy.org")]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSelector {
    root: Rc<Value>,
}

impl JsonSelector {
    pub fn new(root: Value) -> Self {
        Self {
            root: Rc::new(root),
        }
    }

    /// Parse a JSON document into a selector.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    fn resolve(&self, kind: QueryKind, query: &str) -> Result<Option<Value>, SelectorError> {
        if kind != QueryKind::Jmes {
            return Err(SelectorError::UnsupportedKind {
                selector: "JsonSelector".to_string(),
                kind,
            });
        }

        let path = FieldPath::parse_query(query).map_err(|err: PathError| {
            SelectorError::InvalidQuery {
                kind,
                query: query.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(path.resolve(&self.root))
    }
}

impl Selector for JsonSelector {
    fn select_all(&self, kind: QueryKind, query: &str) -> Result<Vec<Value>, SelectorError> {
        Ok(match self.resolve(kind, query)? {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
        })
    }

    fn descend(&self, kind: QueryKind, query: &str) -> Result<Rc<dyn Selector>, SelectorError> {
        let scope = self.resolve(kind, query)?.unwrap_or(Value::Null);
        Ok(Rc::new(JsonSelector::new(scope)))
    }
}
