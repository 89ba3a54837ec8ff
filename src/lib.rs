//! Hierarchical JSON configuration trees with an embedded macro language.
//!
//! Jsonfig wraps a JSON object in a navigable, mutable tree of
//! [`ConfigNode`]s and ships a small macro language for string values:
//! references to other keys, arithmetic, and number formatting.
//!
//! ```ignore
//! let root = ConfigNode::load_file("service.json")?;
//! let db = root.get_config("database").unwrap();
//! let label = db.get_string("label")?.unwrap_or_default();
//! println!("{}", jsonfig::process(&label, &db)?);
//! ```
//!
//! # The tree
//!
//! Every JSON object in the document is a node. A node is created lazily the
//! first time its key is read through [`get`](ConfigNode::get) or
//! [`get_config`](ConfigNode::get_config), and the same node is handed back on
//! every later read, so a handle obtained once stays valid and writes through
//! it show up when the root is saved.
//!
//! - **Typed getters** (`get_int`, `get_string`, `get_list`, ...) return zero
//!   or `None` for missing keys and a [`JsonfigError::TypeMismatch`] when the
//!   stored value has an incompatible kind. Nothing is silently coerced beyond
//!   the obvious (numeric strings read as numbers, scalars read as strings).
//! - **Setters** (`set`, `set_string`, `set_list`, ...) replace the value under
//!   a key. Replacing a key that held a child detaches the child.
//! - **Structure**: [`create_config`](ConfigNode::create_config) adds an empty
//!   child; [`set_config`](ConfigNode::set_config) attaches an existing root.
//!   A node has at most one parent and can never become its own descendant;
//!   violations fail with [`JsonfigError::AlreadyParented`] and
//!   [`JsonfigError::AncestorCycle`].
//!
//! Parent links are weak. A node lives as long as some slot or handle holds
//! it, and navigating upward from a detached node simply finds no parent.
//!
//! # The macro language
//!
//! [`process`] expands a template against a context node in three passes:
//!
//! | Form                    | Meaning                                             |
//! |-------------------------|-----------------------------------------------------|
//! | `[name]`                | string form of `context.get(name)`                  |
//! | `[a/b/name]`            | `name` inside child `a`, then its child `b`         |
//! | `[../name]`             | `name` in the context's parent                      |
//! | `EVAL(expr)`            | evaluator result for `expr` (nested parens allowed) |
//! | `FORMAT(value)`         | `value` formatted with `#.##`                       |
//! | `FORMAT(value,pattern)` | `value` formatted with `pattern`                    |
//!
//! References that cannot be resolved are left exactly as written, since
//! templates may mention optional keys. Text substituted for a reference is
//! never rescanned for more references.
//!
//! `EVAL` is backed by an [`Evaluator`]; the default, [`Arithmetic`], handles
//! numeric expressions. A failed evaluation is logged through `tracing` and
//! renders as `null`. `FORMAT` is backed by a [`NumberFormatter`]; a value
//! that is not a number is a hard [`JsonfigError::NumberParse`] error.
//! Swap either collaborator through [`MacroEngine`]'s builder methods.
//!
//! # Threading
//!
//! Nodes are reference counted without atomics and are neither `Send` nor
//! `Sync`. Keep a tree on one thread; hand other threads a
//! [`to_json`](ConfigNode::to_json) snapshot instead.
//!
//! # Error handling
//!
//! All fallible operations return [`JsonfigError`]. Errors name the key,
//! file path, or pattern involved. See the [`error`] module for the full set.

pub mod error;
pub mod eval;
pub mod format;
pub mod io;

mod macros;
mod node;
mod value;

#[cfg(test)]
mod fixtures;

pub use error::JsonfigError;
pub use eval::{Arithmetic, EvalError, Evaluator};
pub use format::{DEFAULT_PATTERN, DecimalFormat, DecimalPattern, NumberFormatter};
pub use macros::{MacroEngine, process, process_all};
pub use node::ConfigNode;
pub use value::ConfigValue;
