//! Built-in string functions for use inside `Compose`/`MapCompose`.
//!
//! Each function takes a single string. Lists are processed element-wise so
//! the functions also work directly as input processors.

use serde_json::Value;

use crate::processor::{from_fn, Function, ProcessError};

/// Apply `func` to a string, or to every string of a list.
fn string_fn<F>(name: &'static str, func: F) -> Function
where
    F: Fn(&str) -> Result<Value, ProcessError> + 'static,
{
    from_fn(name, move |value| match value {
        Value::String(s) => func(&s).map(Some),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(func(&s)?),
                    other => return Err(not_a_string(name, &other)),
                }
            }
            Ok(Some(Value::Array(out)))
        }
        other => Err(not_a_string(name, &other)),
    })
}

fn not_a_string(name: &str, value: &Value) -> ProcessError {
    ProcessError::InvalidType(format!("{} expects a string, got {}", name, value))
}

/// Trim surrounding whitespace
pub fn strip() -> Function {
    string_fn("strip", |s| Ok(Value::String(s.trim().to_string())))
}

pub fn lower() -> Function {
    string_fn("lower", |s| Ok(Value::String(s.to_lowercase())))
}

pub fn upper() -> Function {
    string_fn("upper", |s| Ok(Value::String(s.to_uppercase())))
}

/// Title-case every word ("marta" becomes "Marta", "PEDRO" becomes "Pedro")
///
/// A word is a run of alphabetic characters: its first character is
/// uppercased and the rest lowercased. Everything else is kept as is.
pub fn title() -> Function {
    string_fn("title", |s| Ok(Value::String(title_case(s))))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Parse an integer
pub fn to_int() -> Function {
    string_fn("to_int", |s| {
        s.trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(ProcessError::from_error)
    })
}

/// Parse a float
pub fn to_float() -> Function {
    string_fn("to_float", |s| {
        s.trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(ProcessError::from_error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Args, Processor};
    use serde_json::json;

    fn call(p: &Function, value: Value) -> Result<Option<Value>, ProcessError> {
        p.call(Some(value), &Args::default())
    }

    #[test]
    fn test_title() {
        assert_eq!(call(&title(), json!("marta")).unwrap(), Some(json!("Marta")));
        assert_eq!(call(&title(), json!("PEDRO")).unwrap(), Some(json!("Pedro")));
    }

    #[test]
    fn test_title_keeps_separators() {
        assert_eq!(
            call(&title(), json!(["jean-luc picard", "route66", "snake_case", "iPhone", "a  b"])).unwrap(),
            Some(json!(["Jean-Luc Picard", "Route66", "Snake_Case", "Iphone", "A  B"]))
        );
        assert_eq!(call(&title(), json!("3rd  ave.")).unwrap(), Some(json!("3Rd  Ave.")));
    }

    #[test]
    fn test_case_functions_on_lists() {
        assert_eq!(
            call(&upper(), json!(["a", "b"])).unwrap(),
            Some(json!(["A", "B"]))
        );
        assert_eq!(call(&lower(), json!("ABC")).unwrap(), Some(json!("abc")));
        assert_eq!(call(&strip(), json!("  x \n")).unwrap(), Some(json!("x")));
    }

    #[test]
    fn test_non_string_is_type_error() {
        let err = call(&upper(), json!(1)).unwrap_err();
        assert!(err.is_type_error());

        let err = call(&upper(), json!(["a", null])).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(call(&to_int(), json!(" 42 ")).unwrap(), Some(json!(42)));
        assert_eq!(call(&to_float(), json!("0")).unwrap(), Some(json!(0.0)));

        let err = call(&to_float(), json!("$10")).unwrap_err();
        assert!(matches!(err, ProcessError::Failed { ref kind, .. } if kind == "ParseFloatError"));
    }
}
