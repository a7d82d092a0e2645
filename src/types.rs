//! Core types for schema resolution.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::arena::{SchemaArena, Slot};

/// Keywords whose value is a single subschema.
pub const SINGLE_SCHEMA_KEYWORDS: &[&str] = &[
    "items",
    "additionalProperties",
    "not",
    "contains",
    "propertyNames",
    "if",
    "then",
    "else",
];

/// Keywords whose value maps names to subschemas.
pub const MAP_SCHEMA_KEYWORDS: &[&str] = &[
    "definitions",
    "$defs",
    "properties",
    "patternProperties",
    "dependencies",
    "dependentSchemas",
];

/// Keywords whose value is a list of subschemas.
///
/// `items` also appears here: the array form is a tuple of schemas.
pub const ARRAY_SCHEMA_KEYWORDS: &[&str] = &["anyOf", "allOf", "oneOf", "items", "schemaSequence"];

/// Keyword carrying one schema per document of a multi-document stream.
pub const SCHEMA_SEQUENCE: &str = "schemaSequence";

/// Keys that are never copied onto a node when a referenced section is merged.
pub const MERGE_EXCLUDED_KEYS: &[&str] = &["id", "$id"];

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Raw schema content as fetched from a source, before any `$ref` expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSchema {
    pub schema: Value,
    /// Problems hit while fetching or parsing the content.
    pub errors: Vec<String>,
}

impl UnresolvedSchema {
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(schema: Value, errors: Vec<String>) -> Self {
        Self { schema, errors }
    }
}

/// A schema with every reachable `$ref` merged in.
///
/// The resolved graph may share subtrees and may be recursive, so it is kept
/// in an arena and exported to JSON on demand with [`ResolvedSchema::schema`].
/// Cloning is cheap: clones share the arena.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub(crate) arena: Arc<SchemaArena>,
    pub(crate) root: Slot,
    pub(crate) errors: Vec<String>,
    pub(crate) url: Option<String>,
}

impl ResolvedSchema {
    /// Wrap an already-resolved JSON value.
    pub fn from_value(schema: &Value) -> Self {
        let mut arena = SchemaArena::new();
        let root = arena.load(schema);
        Self {
            arena: Arc::new(arena),
            root,
            errors: Vec::new(),
            url: None,
        }
    }

    /// The resolved schema as JSON.
    ///
    /// A node that contains itself is written as a local `$ref` to its
    /// enclosing occurrence. Any other node that several references share is
    /// written out in full at each place it appears, so the output of a
    /// schema whose definitions each use the previous one more than once
    /// grows exponentially with the length of that chain. Build the value
    /// once and keep it rather than calling this repeatedly.
    pub fn schema(&self) -> Value {
        self.arena.export(&self.root)
    }

    /// Messages collected while loading and resolving, in discovery order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Identifier of the schema this was resolved from, if known.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

/// Set of schema identifiers touched while resolving a schema.
///
/// Clones share the same underlying set, so a set handed to a resolution
/// collects every identifier recorded anywhere in that resolution.
#[derive(Debug, Clone, Default)]
pub struct Dependencies(Arc<Mutex<BTreeSet<String>>>);

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier. Returns false if it was already present.
    pub fn insert(&self, id: impl Into<String>) -> bool {
        self.lock().insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the recorded identifiers, sorted.
    pub fn to_vec(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
