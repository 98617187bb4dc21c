use regex::{NoExpand, Regex};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors from loading or rewriting a metadata document.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Outcome of a `delete_key` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRemoval {
    Removed,
    Absent,
}

/// Parse a JSON document from disk.
pub fn load_document(path: &Path) -> Result<Value, MetadataError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            MetadataError::NotFound(path.to_path_buf())
        } else {
            MetadataError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| MetadataError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a document back with 4-space indentation, keys in their current
/// order.
fn save_document(path: &Path, document: &Value) -> Result<(), MetadataError> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buf, formatter);
    document
        .serialize(&mut serializer)
        .map_err(|source| MetadataError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    fs::write(path, buf).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove a top-level key, reporting whether it was present.
pub fn delete_key(path: &Path, key: &str) -> Result<KeyRemoval, MetadataError> {
    let mut document = load_document(path)?;
    // shift_remove keeps the remaining keys in their original order.
    let removed = match document.as_object_mut() {
        Some(map) => map.shift_remove(key).is_some(),
        None => false,
    };

    if removed {
        save_document(path, &document)?;
        Ok(KeyRemoval::Removed)
    } else {
        Ok(KeyRemoval::Absent)
    }
}

/// Literal substring replacement over every string value in the document.
///
/// The document is rewritten whenever the load succeeded, matched or not.
pub fn substitute_literal(
    path: &Path,
    needle: &str,
    replacement: &str,
) -> Result<(), MetadataError> {
    let mut document = load_document(path)?;
    rewrite_string_values(&mut document, &|text| {
        if text.contains(needle) {
            Some(text.replace(needle, replacement))
        } else {
            None
        }
    });
    save_document(path, &document)
}

/// Pattern replacement over every string value in the document. The
/// replacement is spliced verbatim; capture groups are not expanded.
pub fn substitute_with_pattern(
    path: &Path,
    pattern: &Regex,
    replacement: &str,
) -> Result<(), MetadataError> {
    let mut document = load_document(path)?;
    rewrite_string_values(&mut document, &|text| {
        match pattern.replace_all(text, NoExpand(replacement)) {
            Cow::Owned(next) => Some(next),
            Cow::Borrowed(_) => None,
        }
    });
    save_document(path, &document)
}

/// Rename keys containing `find` at every nesting depth, by literal
/// substring replacement. Values keep their shape; key order is preserved.
pub fn rename_keys_containing(
    path: &Path,
    find: &str,
    replace: &str,
) -> Result<(), MetadataError> {
    let mut document = load_document(path)?;
    rename_keys(&mut document, find, replace);
    save_document(path, &document)
}

/// First depth-first file match by exact name under `root_dir`.
pub fn locate_document(root_dir: &Path, filename: &str) -> Option<PathBuf> {
    WalkDir::new(root_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == filename)
        .map(|entry| entry.into_path())
}

fn rewrite_string_values<F>(value: &mut Value, rewrite: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(text) => {
            if let Some(next) = rewrite(text) {
                *text = next;
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_string_values(item, rewrite);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                rewrite_string_values(item, rewrite);
            }
        }
        _ => {}
    }
}

fn rename_keys(value: &mut Value, find: &str, replace: &str) {
    match value {
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut item) in entries {
                rename_keys(&mut item, find, replace);
                map.insert(key.replace(find, replace), item);
            }
        }
        Value::Array(items) => {
            for item in items {
                rename_keys(item, find, replace);
            }
        }
        _ => {}
    }
}
