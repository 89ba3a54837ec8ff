use std::num::ParseFloatError;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonfigError {
    #[error("Failed to parse JSON: {source}")]
    Parse { source: serde_json::Error },

    #[error("Failed to parse {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to access {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected a JSON object at the document root, found {found}")]
    NotAnObject { found: &'static str },

    #[error("Type mismatch for '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cannot attach config under '{key}': it already has a parent")]
    AlreadyParented { key: String },

    #[error("Cannot attach config under '{key}': it is an ancestor of the target")]
    AncestorCycle { key: String },

    #[error("Unsupported value for '{key}': {reason}")]
    UnsupportedValue { key: String, reason: String },

    #[error("Cannot parse '{input}' as a number: {source}")]
    NumberParse {
        input: String,
        source: ParseFloatError,
    },

    #[error("Invalid number pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to deserialize config: {0}")]
    Deserialize(#[source] serde_json::Error),
}
