//! Path-based addressing into JSON values.
//!
//! Paths use a small dotted/bracketed syntax:
//!
//! - `user.name` - nested object fields
//! - `items[0]`, `items[-1]` - array positions
//! - `items[*].name`, `*` - projections over arrays or object values

use serde_json::Value;
use std::fmt;

/// Error type for path parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Empty path")]
    Empty,

    #[error("Empty segment in path '{0}'")]
    EmptySegment(String),

    #[error("Invalid bracket expression '{segment}' in path '{path}'")]
    InvalidBracket { path: String, segment: String },
}

/// Represents a path to a field in structured data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "user", "name")
    Field(String),
    /// An array index; negative values count from the end
    Index(isize),
    /// Projection over every element (`[*]` or `*`)
    Wildcard,
}

impl FieldPath {
    /// Parse a query path.
    ///
    /// # Example
    ///
    /// ```
    /// use itemloader::extraction::{FieldPath, PathSegment};
    ///
    /// let path = FieldPath::parse_query("foo.bar[*].name").unwrap();
    /// assert_eq!(path.segments.len(), 4);
    /// assert_eq!(path.segments[2], PathSegment::Wildcard);
    /// ```
    pub fn parse_query(path: &str) -> Result<Self, PathError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for piece in trimmed.split('.') {
            if piece.is_empty() {
                return Err(PathError::EmptySegment(path.to_string()));
            }
            parse_piece(path, piece, &mut segments)?;
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// Resolve the path against a value.
    ///
    /// Returns `None` when a segment does not apply to the value at hand.
    /// Projections collect the non-null results of the remaining path.
    pub fn resolve(&self, value: &Value) -> Option<Value> {
        resolve_segments(value, &self.segments)
    }
}

fn parse_piece(path: &str, piece: &str, segments: &mut Vec<PathSegment>) -> Result<(), PathError> {
    let invalid = || PathError::InvalidBracket {
        path: path.to_string(),
        segment: piece.to_string(),
    };

    let (name, mut rest) = match piece.find('[') {
        Some(pos) => piece.split_at(pos),
        None => (piece, ""),
    };

    match name {
        "" => {}
        "*" => segments.push(PathSegment::Wildcard),
        _ if name.contains(']') => return Err(invalid()),
        _ => segments.push(PathSegment::Field(name.to_string())),
    }

    while !rest.is_empty() {
        let close = rest.find(']').ok_or_else(invalid)?;
        if !rest.starts_with('[') {
            return Err(invalid());
        }
        let inner = rest[1..close].trim();
        if inner == "*" {
            segments.push(PathSegment::Wildcard);
        } else {
            let index = inner.parse::<isize>().map_err(|_| invalid())?;
            segments.push(PathSegment::Index(index));
        }
        rest = &rest[close + 1..];
    }

    Ok(())
}

fn resolve_segments(value: &Value, segments: &[PathSegment]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    match head {
        PathSegment::Field(name) => value
            .as_object()?
            .get(name)
            .and_then(|v| resolve_segments(v, rest)),
        PathSegment::Index(index) => {
            let items = value.as_array()?;
            let position = if *index < 0 {
                items.len().checked_sub(index.unsigned_abs())?
            } else {
                *index as usize
            };
            items.get(position).and_then(|v| resolve_segments(v, rest))
        }
        PathSegment::Wildcard => {
            let elements: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Object(map) => map.values().collect(),
                _ => return None,
            };
            let projected = elements
                .into_iter()
                .filter_map(|v| resolve_segments(v, rest))
                .filter(|v| !v.is_null())
                .collect();
            Some(Value::Array(projected))
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse_query("user.address.city").unwrap();

        assert_eq!(path.segments.len(), 3);
        assert_eq!(path.segments[0], PathSegment::Field("user".to_string()));
        assert_eq!(path.segments[1], PathSegment::Field("address".to_string()));
        assert_eq!(path.segments[2], PathSegment::Field("city".to_string()));
    }

    #[test]
    fn test_field_path_with_index() {
        let path = FieldPath::parse_query("items[0].name").unwrap();

        assert_eq!(
            path.segments,
            vec![
                PathSegment::Field("items".to_string()),
                PathSegment::Index(0),
                PathSegment::Field("name".to_string()),
            ]
        );

        let path = FieldPath::parse_query("[-1]").unwrap();
        assert_eq!(path.segments, vec![PathSegment::Index(-1)]);
    }

    #[test]
    fn test_field_path_errors() {
        assert_eq!(FieldPath::parse_query(""), Err(PathError::Empty));
        assert!(matches!(
            FieldPath::parse_query("a..b"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            FieldPath::parse_query("a[x]"),
            Err(PathError::InvalidBracket { .. })
        ));
        assert!(matches!(
            FieldPath::parse_query("a[0"),
            Err(PathError::InvalidBracket { .. })
        ));
    }

    #[test]
    fn test_resolve() {
        let doc = json!({
            "name": "marta",
            "website": {"url": "http://www.scrapy.org", "name": "homepage"},
            "tags": ["a", "b", "c"],
            "people": [{"name": "one"}, {"other": 1}, {"name": "two"}]
        });

        let get = |p: &str| FieldPath::parse_query(p).unwrap().resolve(&doc);

        assert_eq!(get("website.url"), Some(json!("http://www.scrapy.org")));
        assert_eq!(get("tags[-1]"), Some(json!("c")));
        assert_eq!(get("tags[5]"), None);
        assert_eq!(get("tags[-4]"), None);
        assert_eq!(get("people[*].name"), Some(json!(["one", "two"])));
        assert_eq!(get("name.first"), None);
        assert_eq!(get("missing"), None);
    }

    #[test]
    fn test_display() {
        let path = FieldPath::parse_query("a.b").unwrap();
        assert_eq!(path.to_string(), "a.b");
    }
}
