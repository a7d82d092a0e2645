//! Positional schema selection for multi-document streams.
//!
//! A single schema file can describe a stream of documents (e.g. the
//! `---`-separated documents of a YAML file) by listing one schema per
//! position under `schemaSequence`.

use std::sync::Arc;

use crate::arena::Slot;
use crate::types::{ResolvedSchema, SCHEMA_SEQUENCE};

/// Pick the schema that applies to the document at `position` (0-based).
///
/// If the root of `resolved` has a `schemaSequence` entry at `position`,
/// that entry becomes the schema, with no errors carried over. Otherwise
/// `resolved` is returned unchanged.
pub fn select_schema_for_document(resolved: ResolvedSchema, position: usize) -> ResolvedSchema {
    let Some(entry) = sequence_entry(&resolved, position) else {
        return resolved;
    };

    tracing::trace!(position, "selected schemaSequence entry");
    ResolvedSchema {
        arena: Arc::clone(&resolved.arena),
        root: entry,
        errors: Vec::new(),
        url: None,
    }
}

fn sequence_entry(resolved: &ResolvedSchema, position: usize) -> Option<Slot> {
    let Slot::Node(root) = &resolved.root else {
        return None;
    };
    match resolved.arena.node(*root).get(SCHEMA_SEQUENCE) {
        Some(Slot::Array(entries)) => entries.get(position).cloned(),
        _ => None,
    }
}
