//! # Query & Projection Filters
//!
//! Equality queries and field projections over documents, for sources that
//! evaluate a scope themselves.
//!
//! Query: a JSON object of field equalities (dotted paths reach into nested
//! objects); `{}` matches every document. Projection: `{field: 1, ...}` keeps
//! the named fields, `{field: 0, ...}` drops them. `_id` survives an inclusion
//! projection unless excluded explicitly.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::domain::{AnchorError, Document};

const ID_FIELD: &str = "_id";

/// Parse a serialized filter. Empty and `undefined` mean "no filter".
pub fn parse_filter(raw: &str) -> Result<Document, AnchorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "undefined" {
        return Ok(Document::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AnchorError::InvalidScope(format!(
            "filter must be a JSON object, got {}",
            other
        ))),
        Err(e) => Err(AnchorError::InvalidScope(format!("{}: {}", trimmed, e))),
    }
}

/// Whether `document` satisfies every equality in `query`.
pub fn matches_query(document: &Document, query: &Document) -> bool {
    query
        .iter()
        .all(|(path, expected)| lookup_path(document, path) == Some(expected))
}

fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Parsed projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Whole documents.
    All,
    /// Keep only these fields (plus `_id` when `keep_id`).
    Include {
        /// Fields to keep
        fields: BTreeSet<String>,
        /// Whether `_id` is kept
        keep_id: bool,
    },
    /// Drop these fields.
    Exclude(BTreeSet<String>),
}

impl Projection {
    /// Parse a serialized projection.
    pub fn parse(raw: &str) -> Result<Self, AnchorError> {
        let spec = parse_filter(raw)?;
        if spec.is_empty() {
            return Ok(Projection::All);
        }

        let mut include = BTreeSet::new();
        let mut exclude = BTreeSet::new();
        for (field, flag) in &spec {
            if projection_flag(flag)? {
                include.insert(field.clone());
            } else {
                exclude.insert(field.clone());
            }
        }

        if include.is_empty() {
            return Ok(Projection::Exclude(exclude));
        }

        // only `_id` may be excluded alongside inclusions
        let keep_id = !exclude.contains(ID_FIELD);
        exclude.remove(ID_FIELD);
        if !exclude.is_empty() {
            return Err(AnchorError::InvalidScope(
                "projection cannot mix inclusion and exclusion".to_string(),
            ));
        }
        Ok(Projection::Include {
            fields: include,
            keep_id,
        })
    }

    /// Apply to a document.
    pub fn apply(&self, mut document: Document) -> Document {
        match self {
            Projection::All => document,
            Projection::Exclude(fields) => {
                document.retain(|k, _| !fields.contains(k));
                document
            }
            Projection::Include { fields, keep_id } => {
                document.retain(|k, _| fields.contains(k) || (*keep_id && k == ID_FIELD));
                document
            }
        }
    }
}

fn projection_flag(flag: &Value) -> Result<bool, AnchorError> {
    match flag {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        other => Err(AnchorError::InvalidScope(format!(
            "projection flag must be 0/1 or a boolean, got {}",
            other
        ))),
    }
}
