//! Native values read from and written into a config tree.
//!
//! [`ConfigValue`] is the closed set of shapes a key can take when viewed
//! through a [`ConfigNode`]: scalars, lists, and child nodes. Raw JSON `null`
//! has no variant; the tree treats it as an absent value.

use std::fmt;

use serde_json::{Number, Value};

use crate::node::ConfigNode;

/// A dynamically typed value stored under a config key.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Bool(bool),
    Number(Number),
    Char(char),
    String(String),
    /// Elements are converted recursively; objects become nodes.
    List(Vec<ConfigValue>),
    /// A child node. Cloning the value clones the handle, not the node.
    Config(ConfigNode),
}

impl ConfigValue {
    /// Build a number value from a float. Returns `None` for NaN and infinities,
    /// which JSON cannot represent.
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(ConfigValue::Number)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigNode> {
        match self {
            ConfigValue::Config(node) => Some(node),
            _ => None,
        }
    }

    /// Convert into the JSON value stored in a document.
    ///
    /// A node is embedded as a snapshot of its current document.
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Number(n) => Value::Number(n.clone()),
            ConfigValue::Char(c) => Value::String(c.to_string()),
            ConfigValue::String(s) => Value::String(s.clone()),
            ConfigValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            ConfigValue::Config(node) => node.to_json(),
        }
    }
}

/// Textual form used when a value is spliced into a macro template.
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Number(n) => write!(f, "{n}"),
            ConfigValue::Char(c) => write!(f, "{c}"),
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            ConfigValue::Config(node) => write!(f, "{node}"),
        }
    }
}

/// Nodes compare by identity, everything else by value.
impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConfigValue::Bool(a), ConfigValue::Bool(b)) => a == b,
            (ConfigValue::Number(a), ConfigValue::Number(b)) => a == b,
            (ConfigValue::Char(a), ConfigValue::Char(b)) => a == b,
            (ConfigValue::String(a), ConfigValue::String(b)) => a == b,
            (ConfigValue::List(a), ConfigValue::List(b)) => a == b,
            (ConfigValue::Config(a), ConfigValue::Config(b)) => ConfigNode::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<char> for ConfigValue {
    fn from(value: char) -> Self {
        ConfigValue::Char(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<Number> for ConfigValue {
    fn from(value: Number) -> Self {
        ConfigValue::Number(value)
    }
}

impl From<ConfigNode> for ConfigValue {
    fn from(value: ConfigNode) -> Self {
        ConfigValue::Config(value)
    }
}

impl From<&ConfigNode> for ConfigValue {
    fn from(value: &ConfigNode) -> Self {
        ConfigValue::Config(value.clone())
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(value: Vec<T>) -> Self {
        ConfigValue::List(value.into_iter().map(Into::into).collect())
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ConfigValue {
                fn from(value: $ty) -> Self {
                    ConfigValue::Number(Number::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// Name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
