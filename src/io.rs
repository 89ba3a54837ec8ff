//! JSON document I/O: parse and serialize the object behind a config tree.
//!
//! Everything here works on plain `serde_json` maps; [`ConfigNode`] wraps the
//! results. Reads distinguish parse errors from I/O errors, and file errors
//! carry the offending path. Writes create parent directories as needed.
//!
//! [`ConfigNode`]: crate::ConfigNode

use std::io::{Read, Write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::JsonfigError;
use crate::value::json_kind;

/// Parse JSON text into an object document.
pub fn parse_str(text: &str) -> Result<Map<String, Value>, JsonfigError> {
    let value: Value =
        serde_json::from_str(text).map_err(|source| JsonfigError::Parse { source })?;
    into_object(value)
}

/// Parse a JSON byte stream into an object document.
///
/// The stream is read to the end. Read failures surface as [`JsonfigError::Io`].
pub fn read_from<R: Read>(mut reader: R) -> Result<Map<String, Value>, JsonfigError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_str(&text)
}

/// Load an object document from a file.
pub fn read_file(path: &Path) -> Result<Map<String, Value>, JsonfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| JsonfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "loaded config file");
    let value: Value =
        serde_json::from_str(&content).map_err(|source| JsonfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
    into_object(value)
}

/// Like [`read_file`], but a missing file yields an empty document.
///
/// Other I/O errors (permissions, etc.) are still propagated.
pub fn read_file_or_empty(path: &Path) -> Result<Map<String, Value>, JsonfigError> {
    match read_file(path) {
        Err(JsonfigError::IoError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(Map::new())
        }
        other => other,
    }
}

/// Serialize a document as pretty-printed JSON into a writer.
pub fn write_to<W: Write>(mut writer: W, document: &Value) -> Result<(), JsonfigError> {
    serde_json::to_writer_pretty(&mut writer, document).map_err(std::io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write a document to a file, creating parent directories if needed.
pub fn write_file(path: &Path, document: &Value) -> Result<(), JsonfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| JsonfigError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut content = serde_json::to_string_pretty(document).map_err(std::io::Error::from)?;
    content.push('\n');

    std::fs::write(path, content).map_err(|e| JsonfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "saved config file");
    Ok(())
}

/// Unwrap a top-level JSON value that must be an object.
pub fn into_object(value: Value) -> Result<Map<String, Value>, JsonfigError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(JsonfigError::NotAnObject {
            found: json_kind(&other),
        }),
    }
}
