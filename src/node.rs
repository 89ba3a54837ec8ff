//! The configuration tree.
//!
//! A [`ConfigNode`] is a handle to one JSON object in a tree of objects. Each
//! key of a node holds a *slot*: either a raw JSON value, or a child node that
//! was materialized from an object value. Children are materialized lazily the
//! first time an object-valued key is read, and the same child handle is
//! returned on every later read of that key.
//!
//! Ownership runs downward only: a node is owned by the slot that holds it.
//! The link from a child to its parent is a [`Weak`] reference used purely for
//! upward navigation (`..` in macro paths).
//!
//! # Invariants
//!
//! - A node is the child of at most one parent at a time. [`set_config`]
//!   rejects a node that already has a parent.
//! - A node never becomes its own descendant. [`set_config`] walks the
//!   receiving node's ancestor chain, itself included, before attaching.
//! - Overwriting or removing a key that holds a child clears the child's
//!   parent link.
//!
//! Because materialized children live in the same slot as the raw value they
//! replaced, no write can leave a stale cached child behind.
//!
//! [`set_config`]: ConfigNode::set_config

use std::cell::RefCell;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::error::JsonfigError;
use crate::io;
use crate::value::{ConfigValue, json_kind};

/// A handle to a node in a configuration tree.
///
/// Cloning the handle does not copy the node; use [`ConfigNode::ptr_eq`] to
/// test whether two handles refer to the same node.
#[derive(Clone, Default)]
pub struct ConfigNode(Rc<RefCell<Inner>>);

#[derive(Default)]
struct Inner {
    entries: IndexMap<String, Slot>,
    parent: Weak<RefCell<Inner>>,
}

enum Slot {
    Value(Value),
    Node(ConfigNode),
}

impl ConfigNode {
    /// Create an empty root node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an in-memory JSON object as a root node.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self::with_parent(map, Weak::new())
    }

    /// Wrap an in-memory JSON value, which must be an object.
    pub fn from_json(value: Value) -> Result<Self, JsonfigError> {
        Ok(Self::from_map(io::into_object(value)?))
    }

    /// Parse JSON text into a root node.
    pub fn parse(text: &str) -> Result<Self, JsonfigError> {
        Ok(Self::from_map(io::parse_str(text)?))
    }

    /// Parse a JSON byte stream into a root node.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, JsonfigError> {
        Ok(Self::from_map(io::read_from(reader)?))
    }

    /// Load a root node from a JSON file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, JsonfigError> {
        Ok(Self::from_map(io::read_file(path.as_ref())?))
    }

    /// Load a root node from a JSON file, or start empty if the file does not exist.
    pub fn load_file_or_default(path: impl AsRef<Path>) -> Result<Self, JsonfigError> {
        Ok(Self::from_map(io::read_file_or_empty(path.as_ref())?))
    }

    /// Build a root node from any value that serializes to a map.
    pub fn from_serialize<T: Serialize>(source: &T) -> Result<Self, JsonfigError> {
        let value = serde_json::to_value(source).map_err(|e| JsonfigError::UnsupportedValue {
            key: "<root>".into(),
            reason: e.to_string(),
        })?;
        Self::from_json(value)
    }

    fn with_parent(map: Map<String, Value>, parent: Weak<RefCell<Inner>>) -> Self {
        let entries = map
            .into_iter()
            .map(|(key, value)| (key, Slot::Value(value)))
            .collect();
        ConfigNode(Rc::new(RefCell::new(Inner { entries, parent })))
    }

    fn child(&self, map: Map<String, Value>) -> Self {
        Self::with_parent(map, Rc::downgrade(&self.0))
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(a: &ConfigNode, b: &ConfigNode) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// The node holding this one, or `None` for a root or a detached node.
    pub fn parent(&self) -> Option<ConfigNode> {
        self.0.borrow().parent.upgrade().map(ConfigNode)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.borrow().entries.contains_key(name)
    }

    /// Keys at this level, in document order.
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().entries.is_empty()
    }

    // -- Reading ------------------------------------------------------------

    /// Read `name` as a native value.
    ///
    /// Returns the cached child if one exists; otherwise materializes an object
    /// value into a cached child; otherwise converts the scalar or array.
    /// Missing keys and JSON `null` yield `None`.
    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        if let Some(node) = self.get_config(name) {
            return Some(ConfigValue::Config(node));
        }
        let inner = self.0.borrow();
        match inner.entries.get(name)? {
            Slot::Value(value) => self.convert(value),
            Slot::Node(node) => Some(ConfigValue::Config(node.clone())),
        }
    }

    /// Read `name` as a child node, materializing it on first access.
    ///
    /// Returns `None` when the key is missing or does not hold an object.
    pub fn get_config(&self, name: &str) -> Option<ConfigNode> {
        let mut inner = self.0.borrow_mut();
        let slot = inner.entries.get_mut(name)?;
        let map = match slot {
            Slot::Node(node) => return Some(node.clone()),
            Slot::Value(Value::Object(map)) => std::mem::take(map),
            Slot::Value(_) => return None,
        };
        let node = self.child(map);
        *slot = Slot::Node(node.clone());
        tracing::trace!(key = name, "materialized child config");
        Some(node)
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, JsonfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(other) => Err(mismatch(name, "boolean", &other)),
        }
    }

    /// Read `name` as a JSON number. Numeric strings are accepted.
    pub fn get_number(&self, name: &str) -> Result<Option<Number>, JsonfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(n)),
            Some(value @ Value::String(_)) => parse_number(value.as_str().unwrap_or_default())
                .map(Some)
                .ok_or_else(|| mismatch(name, "number", &value)),
            Some(other) => Err(mismatch(name, "number", &other)),
        }
    }

    /// Read `name` as an `i64`, or `0` when missing. Fractions truncate toward zero.
    pub fn get_long(&self, name: &str) -> Result<i64, JsonfigError> {
        let Some(number) = self.get_number(name)? else {
            return Ok(0);
        };
        if let Some(i) = number.as_i64() {
            return Ok(i);
        }
        if number.is_u64() {
            return Err(JsonfigError::TypeMismatch {
                key: name.into(),
                expected: "i64",
                found: "out-of-range number",
            });
        }
        let truncated = number.as_f64().map_or(0.0, f64::trunc);
        // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
        if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
            return Err(JsonfigError::TypeMismatch {
                key: name.into(),
                expected: "i64",
                found: "out-of-range number",
            });
        }
        Ok(truncated as i64)
    }

    pub fn get_int(&self, name: &str) -> Result<i32, JsonfigError> {
        narrow(name, self.get_long(name)?, "i32")
    }

    pub fn get_short(&self, name: &str) -> Result<i16, JsonfigError> {
        narrow(name, self.get_long(name)?, "i16")
    }

    pub fn get_byte(&self, name: &str) -> Result<i8, JsonfigError> {
        narrow(name, self.get_long(name)?, "i8")
    }

    /// Read `name` as an `f64`, or `0.0` when missing.
    pub fn get_double(&self, name: &str) -> Result<f64, JsonfigError> {
        Ok(self
            .get_number(name)?
            .and_then(|n| n.as_f64())
            .unwrap_or_default())
    }

    pub fn get_float(&self, name: &str) -> Result<f32, JsonfigError> {
        Ok(self.get_double(name)? as f32)
    }

    /// Read `name` as a string. Numbers and booleans yield their string form.
    pub fn get_string(&self, name: &str) -> Result<Option<String>, JsonfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(value) => scalar_string(&value)
                .map(Some)
                .ok_or_else(|| mismatch(name, "string", &value)),
        }
    }

    /// Read `name` as a single character: the first character of its string form.
    pub fn get_character(&self, name: &str) -> Result<Option<char>, JsonfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(value) => scalar_string(&value)
                .and_then(|s| s.chars().next())
                .map(Some)
                .ok_or_else(|| mismatch(name, "character", &value)),
        }
    }

    /// Like [`get_character`](Self::get_character), but `'\0'` when missing.
    pub fn get_char(&self, name: &str) -> Result<char, JsonfigError> {
        Ok(self.get_character(name)?.unwrap_or('\0'))
    }

    /// Read `name` as a list. Object elements become nodes parented to `self`.
    pub fn get_list(&self, name: &str) -> Result<Option<Vec<ConfigValue>>, JsonfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(
                items.iter().filter_map(|item| self.convert(item)).collect(),
            )),
            Some(other) => Err(mismatch(name, "array", &other)),
        }
    }

    /// Read `name` as a list of strings. Numeric and boolean elements are stringified.
    pub fn get_string_list(&self, name: &str) -> Result<Option<Vec<String>>, JsonfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    scalar_string(item)
                        .ok_or_else(|| mismatch(&format!("{name}[{i}]"), "string", item))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(mismatch(name, "array", &other)),
        }
    }

    /// Every key at this level with its converted value, in document order.
    ///
    /// Object values are materialized through the child cache, so the returned
    /// nodes are the same ones [`get_config`](Self::get_config) hands out.
    /// Keys holding JSON `null` map to `None`.
    pub fn to_raw(&self) -> IndexMap<String, Option<ConfigValue>> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    /// Snapshot of this subtree as a plain JSON object.
    pub fn to_json(&self) -> Value {
        let inner = self.0.borrow();
        let map: Map<String, Value> = inner
            .entries
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Value(value) => value.clone(),
                    Slot::Node(node) => node.to_json(),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// Deserialize this subtree into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, JsonfigError> {
        serde_json::from_value(self.to_json()).map_err(JsonfigError::Deserialize)
    }

    /// Raw JSON for `name`, with `null` folded into `None`.
    fn raw(&self, name: &str) -> Option<Value> {
        let inner = self.0.borrow();
        match inner.entries.get(name)? {
            Slot::Value(Value::Null) => None,
            Slot::Value(value) => Some(value.clone()),
            Slot::Node(node) => Some(node.to_json()),
        }
    }

    fn convert(&self, value: &Value) -> Option<ConfigValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ConfigValue::Bool(*b)),
            Value::Number(n) => Some(ConfigValue::Number(n.clone())),
            Value::String(s) => Some(ConfigValue::String(s.clone())),
            Value::Array(items) => Some(ConfigValue::List(
                items.iter().filter_map(|item| self.convert(item)).collect(),
            )),
            Value::Object(map) => Some(ConfigValue::Config(self.child(map.clone()))),
        }
    }

    // -- Writing ------------------------------------------------------------

    /// Write `value` under `name`, dispatching on its variant.
    ///
    /// Only [`ConfigValue::Config`] can fail; see [`set_config`](Self::set_config).
    pub fn set(&self, name: &str, value: impl Into<ConfigValue>) -> Result<(), JsonfigError> {
        match value.into() {
            ConfigValue::Bool(b) => self.set_bool(name, b),
            ConfigValue::Number(n) => self.set_number(name, n),
            ConfigValue::Char(c) => self.set_char(name, c),
            ConfigValue::String(s) => self.set_string(name, s),
            ConfigValue::List(items) => self.set_list(name, &items),
            ConfigValue::Config(node) => return self.set_config(name, &node),
        }
        Ok(())
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.put(name, Slot::Value(Value::Bool(value)));
    }

    pub fn set_number(&self, name: &str, value: impl Into<Number>) {
        self.put(name, Slot::Value(Value::Number(value.into())));
    }

    /// Write a float. NaN and infinities have no JSON form and are rejected.
    pub fn set_double(&self, name: &str, value: f64) -> Result<(), JsonfigError> {
        let number = Number::from_f64(value).ok_or_else(|| JsonfigError::UnsupportedValue {
            key: name.into(),
            reason: format!("{value} is not a finite number"),
        })?;
        self.set_number(name, number);
        Ok(())
    }

    pub fn set_char(&self, name: &str, value: char) {
        self.put(name, Slot::Value(Value::String(value.to_string())));
    }

    pub fn set_string(&self, name: &str, value: impl Into<String>) {
        self.put(name, Slot::Value(Value::String(value.into())));
    }

    /// Write a list. Node elements are embedded as snapshots of their documents.
    pub fn set_list(&self, name: &str, values: &[ConfigValue]) {
        let array = values.iter().map(ConfigValue::to_json).collect();
        self.put(name, Slot::Value(Value::Array(array)));
    }

    pub fn set_string_list<S: AsRef<str>>(&self, name: &str, values: &[S]) {
        let array = values
            .iter()
            .map(|s| Value::String(s.as_ref().to_string()))
            .collect();
        self.put(name, Slot::Value(Value::Array(array)));
    }

    pub fn set_number_list<N: Into<Number> + Clone>(&self, name: &str, values: &[N]) {
        let array = values
            .iter()
            .map(|n| Value::Number(n.clone().into()))
            .collect();
        self.put(name, Slot::Value(Value::Array(array)));
    }

    /// Attach an existing node under `name`.
    ///
    /// Fails with [`JsonfigError::AlreadyParented`] if `config` already has a
    /// parent, and with [`JsonfigError::AncestorCycle`] if `config` is this node
    /// or one of its ancestors.
    pub fn set_config(&self, name: &str, config: &ConfigNode) -> Result<(), JsonfigError> {
        if config.parent().is_some() {
            return Err(JsonfigError::AlreadyParented { key: name.into() });
        }

        let mut current = Some(self.clone());
        while let Some(node) = current {
            if ConfigNode::ptr_eq(&node, config) {
                return Err(JsonfigError::AncestorCycle { key: name.into() });
            }
            current = node.parent();
        }

        config.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.put(name, Slot::Node(config.clone()));
        Ok(())
    }

    /// Create an empty child under `name` and return it for population.
    pub fn create_config(&self, name: &str) -> ConfigNode {
        let node = self.child(Map::new());
        self.put(name, Slot::Node(node.clone()));
        node
    }

    /// Remove `name`, detaching it if it held a child. Returns whether the key existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.0.borrow_mut().entries.shift_remove(name);
        match removed {
            Some(slot) => {
                detach(slot);
                true
            }
            None => false,
        }
    }

    fn put(&self, name: &str, slot: Slot) {
        let previous = self.0.borrow_mut().entries.insert(name.to_string(), slot);
        if let Some(previous) = previous {
            detach(previous);
        }
    }

    // -- Saving -------------------------------------------------------------

    /// Write this subtree as pretty-printed JSON.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), JsonfigError> {
        io::write_to(writer, &self.to_json())
    }

    /// Write this subtree to a file, creating parent directories as needed.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), JsonfigError> {
        io::write_file(path.as_ref(), &self.to_json())
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    pub fn to_json_string_pretty(&self) -> String {
        // Serializing a `Value` cannot fail.
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
    }
}

fn detach(slot: Slot) {
    if let Slot::Node(child) = slot {
        child.0.borrow_mut().parent = Weak::new();
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Value) -> JsonfigError {
    JsonfigError::TypeMismatch {
        key: key.into(),
        expected,
        found: json_kind(found),
    }
}

fn narrow<T: TryFrom<i64>>(
    key: &str,
    value: i64,
    expected: &'static str,
) -> Result<T, JsonfigError> {
    T::try_from(value).map_err(|_| JsonfigError::TypeMismatch {
        key: key.into(),
        expected,
        found: "out-of-range number",
    })
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl FromStr for ConfigNode {
    type Err = JsonfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compact JSON of this subtree.
impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Debug for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigNode")
            .field("document", &self.to_json())
            .field("has_parent", &self.parent().is_some())
            .finish()
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
