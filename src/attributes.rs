use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Enum representing possible values of a context field.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, `bool`, and `Vec`
/// types.
///
/// Examples:
/// ```
/// # use cravensworth_core::ContextValue;
/// let string_value: ContextValue = "example".into();
/// let number_value: ContextValue = 42.0.into();
/// let bool_value: ContextValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum ContextValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A null value or absence of value.
    Null,
    /// A list of values.
    List(Vec<ContextValue>),
    /// A nested mapping of string keys to values.
    Object(HashMap<String, ContextValue>),
}

impl ContextValue {
    /// Return the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        if let ContextValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Return the boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        if let ContextValue::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Return the number if this is a numeric value.
    pub fn as_number(&self) -> Option<f64> {
        if let ContextValue::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// Return `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }

    /// A short name for the value's type, used in error messages.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            ContextValue::String(_) => "string",
            ContextValue::Number(_) => "number",
            ContextValue::Boolean(_) => "boolean",
            ContextValue::Null => "null",
            ContextValue::List(_) => "list",
            ContextValue::Object(_) => "object",
        }
    }

    /// The stable string form used for identity hashing.
    ///
    /// Only scalar values have one; lists and objects have no canonical text form and cannot be
    /// used as identities.
    pub(crate) fn identity_string(&self) -> Option<String> {
        match self {
            ContextValue::String(s) => Some(s.clone()),
            ContextValue::Number(n) => Some(n.to_string()),
            ContextValue::Boolean(b) => Some(b.to_string()),
            ContextValue::Null | ContextValue::List(_) | ContextValue::Object(_) => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}
