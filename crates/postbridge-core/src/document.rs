//! Schemaless document helpers shared by both stores.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// A JSON object as stored in MongoDB and serialized into Cassandra blobs.
pub type Document = Map<String, Value>;

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";

/// Maximum length of a Cassandra table name.
pub const MAX_TABLE_NAME_LEN: usize = 48;

/// Returns the stringified `_id` of a document.
///
/// Accepts a plain string, a number, or an extended-JSON `{"$oid": "..."}`.
#[must_use]
pub fn document_id(document: &Document) -> Option<String> {
    match document.get(ID_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => match obj.get("$oid") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Re-serializes a value with object keys sorted at every level.
///
/// Key order in the input does not affect the output, so two documents with
/// the same content always canonicalize to the same bytes.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 hex digest of the canonical form of a document.
#[must_use]
pub fn content_digest(document: &Document) -> String {
    let canonical = canonical_json(&Value::Object(document.clone()));
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Parses a stored blob and returns its content digest.
///
/// # Errors
///
/// Returns `Serialization` when the blob is not a JSON object.
pub fn blob_digest(blob: &str) -> CoreResult<String> {
    match serde_json::from_str::<Value>(blob)? {
        Value::Object(document) => Ok(content_digest(&document)),
        other => Err(CoreError::Serialization(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validates a collection name as a CQL identifier and returns the table name.
///
/// # Errors
///
/// Returns `Validation` unless the name matches `[A-Za-z_][A-Za-z0-9_]*` and is
/// at most 48 characters long.
pub fn table_name_for(collection: &str) -> CoreResult<String> {
    let mut chars = collection.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_head || !valid_tail || collection.len() > MAX_TABLE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "collection `{collection}` is not a valid Cassandra table name"
        )));
    }
    Ok(collection.to_ascii_lowercase())
}

/// A Cassandra row: the stringified id and the document as compact JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRow {
    /// Row key.
    pub id: String,
    /// Compact JSON of the full document, `_id` included.
    pub data: String,
}

impl BlobRow {
    /// Transforms a source document into a row.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the document has no usable `_id`.
    pub fn from_document(document: &Document) -> CoreResult<Self> {
        let id = document_id(document)
            .ok_or_else(|| CoreError::Validation("document has no usable `_id`".into()))?;
        let mut normalized = document.clone();
        normalized.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        let data = serde_json::to_string(&Value::Object(normalized))?;
        Ok(Self { id, data })
    }

    /// Parses the blob back into a document.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when the blob is not a JSON object.
    pub fn to_document(&self) -> CoreResult<Document> {
        match serde_json::from_str::<Value>(&self.data)? {
            Value::Object(document) => Ok(document),
            other => Err(CoreError::Serialization(format!(
                "row `{}` holds {} instead of an object",
                self.id,
                json_kind(&other)
            ))),
        }
    }
}
