//! Placeholder substitution for predicate templates.
//!
//! A predicate template is a jsonpath filter that may contain one `$name`
//! placeholder, e.g. `$.parent == $uuid`. The placeholder is replaced by the
//! JSON literal of the matching variable, which both fills in the value and
//! produces the normalized cache key for the predicate.

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

/// Variables available to a predicate template.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Vars {
    /// No variables: the first placeholder becomes `null`.
    #[default]
    None,
    /// A single positional value, addressable as `$0`.
    Scalar(JsonValue),
    /// Named variables, usually a document's fields.
    Named(Map<String, JsonValue>),
}

impl Vars {
    /// Look up a variable by placeholder name (without the `$`).
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        match self {
            Vars::None => None,
            Vars::Scalar(value) => (name == "0").then_some(value),
            Vars::Named(map) => map.get(name),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Vars::None)
    }
}

impl From<JsonValue> for Vars {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Vars::None,
            JsonValue::Object(map) => Vars::Named(map),
            other => Vars::Scalar(other),
        }
    }
}

impl From<&JsonValue> for Vars {
    fn from(value: &JsonValue) -> Self {
        Vars::from(value.clone())
    }
}

impl From<Map<String, JsonValue>> for Vars {
    fn from(map: Map<String, JsonValue>) -> Self {
        Vars::Named(map)
    }
}

impl From<&str> for Vars {
    fn from(value: &str) -> Self {
        Vars::Scalar(JsonValue::String(value.to_string()))
    }
}

impl From<String> for Vars {
    fn from(value: String) -> Self {
        Vars::Scalar(JsonValue::String(value))
    }
}

impl From<i64> for Vars {
    fn from(value: i64) -> Self {
        Vars::Scalar(JsonValue::from(value))
    }
}

impl From<f64> for Vars {
    fn from(value: f64) -> Self {
        Vars::Scalar(JsonValue::from(value))
    }
}

impl From<bool> for Vars {
    fn from(value: bool) -> Self {
        Vars::Scalar(JsonValue::Bool(value))
    }
}

impl<T: Into<Vars>> From<Option<T>> for Vars {
    fn from(value: Option<T>) -> Self {
        value.map_or(Vars::None, Into::into)
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$[_A-Za-z][_0-9A-Za-z]*").expect("placeholder pattern compiles")
    })
}

/// Substitute the first `$name` placeholder in `template`.
///
/// The first placeholder becomes the compact JSON encoding of the variable,
/// or `null` when there is no such variable (always the case for
/// [`Vars::None`]). Later placeholders are left as-is.
///
/// ```
/// use docbatch_loader::{Vars, interpolate};
/// use serde_json::json;
///
/// let key = interpolate("$.a == $x", &Vars::from(json!({"x": 5})));
/// assert_eq!(key, "$.a == 5");
/// ```
pub fn interpolate(template: &str, vars: &Vars) -> String {
    let Some(token) = placeholder().find(template) else {
        return template.to_string();
    };

    let name = &token.as_str()[1..];
    let literal = vars
        .get(name)
        .map_or_else(|| "null".to_string(), JsonValue::to_string);

    let mut out = String::with_capacity(template.len() + literal.len());
    out.push_str(&template[..token.start()]);
    out.push_str(&literal);
    out.push_str(&template[token.end()..]);
    out
}
