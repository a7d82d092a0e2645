//! Index-addressed storage for schema graphs.
//!
//! Resolution turns a schema tree into a graph: merging a referenced section
//! copies its entries onto the referring node, so subschemas end up shared
//! between several parents and recursive definitions become cycles. Nodes
//! live in a [`SchemaArena`] and refer to each other by [`NodeId`]; sharing is
//! a copied id, never a deep clone.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};

use crate::types::{
    ARRAY_SCHEMA_KEYWORDS, MAP_SCHEMA_KEYWORDS, MERGE_EXCLUDED_KEYS, SINGLE_SCHEMA_KEYWORDS,
};

/// Stable index of a node within one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A value held by a node entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Null, boolean, number or string.
    Value(Value),
    Array(Vec<Slot>),
    /// A JSON object, stored as a node.
    Node(NodeId),
}

impl Slot {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Slot::Node(id) => Some(*id),
            _ => None,
        }
    }
}

/// A JSON object whose object-valued entries point at other nodes.
///
/// Entries keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct SchemaNode {
    entries: Vec<(String, Slot)>,
}

impl SchemaNode {
    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace an entry.
    #[cfg(test)]
    pub fn insert(&mut self, key: impl Into<String>, slot: Slot) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = slot,
            None => self.entries.push((key, slot)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Slot> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Owner of every node of one resolution.
#[derive(Debug, Default)]
pub struct SchemaArena {
    nodes: Vec<SchemaNode>,
}

impl SchemaArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes allocated so far.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    #[cfg(test)]
    pub fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    /// Copy a JSON value into the arena, allocating one node per object.
    pub fn load(&mut self, value: &Value) -> Slot {
        match value {
            Value::Object(map) => {
                let id = NodeId(self.nodes.len());
                self.nodes.push(SchemaNode::default());
                let entries = map
                    .iter()
                    .map(|(key, child)| (key.clone(), self.load(child)))
                    .collect();
                self.nodes[id.0].entries = entries;
                Slot::Node(id)
            }
            Value::Array(items) => Slot::Array(items.iter().map(|item| self.load(item)).collect()),
            other => Slot::Value(other.clone()),
        }
    }

    /// Build the JSON value rooted at `slot`.
    ///
    /// Shared nodes are written out once per occurrence. A node reached again
    /// while it is still being written is emitted as `{"$ref": "#<pointer>"}`
    /// to that enclosing occurrence.
    pub fn export(&self, slot: &Slot) -> Value {
        let mut pointer = String::new();
        let mut open = HashMap::new();
        self.export_slot(slot, &mut pointer, &mut open)
    }

    fn export_slot(
        &self,
        slot: &Slot,
        pointer: &mut String,
        open: &mut HashMap<NodeId, String>,
    ) -> Value {
        match slot {
            Slot::Value(value) => value.clone(),
            Slot::Array(items) => {
                let mut result = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&index.to_string());
                    result.push(self.export_slot(item, pointer, open));
                    pointer.truncate(len);
                }
                Value::Array(result)
            }
            Slot::Node(id) => {
                if let Some(target) = open.get(id) {
                    return json!({ "$ref": format!("#{}", target) });
                }
                open.insert(*id, pointer.clone());

                let mut map = Map::new();
                for (key, child) in &self.nodes[id.0].entries {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&escape_pointer_segment(key));
                    map.insert(key.clone(), self.export_slot(child, pointer, open));
                    pointer.truncate(len);
                }

                open.remove(id);
                Value::Object(map)
            }
        }
    }

    /// Find the section addressed by a fragment (the part after `#`).
    ///
    /// An empty fragment addresses `root`. Otherwise the fragment is
    /// percent-decoded, one leading `/` is dropped and each segment selects an
    /// object key or an array index. Returns `None` on the first missing
    /// segment.
    pub fn lookup(&self, root: &Slot, fragment: &str) -> Option<Slot> {
        if fragment.is_empty() {
            return Some(root.clone());
        }

        let decoded = percent_decode_str(fragment).decode_utf8_lossy();
        let path = decoded.strip_prefix('/').unwrap_or(decoded.as_ref());

        let mut current = root;
        for segment in path.split('/') {
            // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
            let key = segment.replace("~1", "/").replace("~0", "~");
            current = match current {
                Slot::Node(id) => self.nodes[id.0].get(&key)?,
                Slot::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                Slot::Value(_) => return None,
            };
        }
        Some(current.clone())
    }

    /// Copy the entries of `section` that `target` does not already have.
    ///
    /// Existing keys on the target always win, and `id`/`$id` are never
    /// copied. Values are shared, not cloned: a copied object entry points at
    /// the same node as in the section.
    pub fn merge(&mut self, target: NodeId, section: NodeId) {
        let incoming: Vec<(String, Slot)> = self.nodes[section.0]
            .entries
            .iter()
            .filter(|(key, _)| !MERGE_EXCLUDED_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();

        let node = &mut self.nodes[target.0];
        for (key, slot) in incoming {
            if !node.contains_key(&key) {
                node.entries.push((key, slot));
            }
        }
    }

    /// Remove and return the node's `$ref` if it is a string.
    ///
    /// A non-string `$ref` is not a reference and stays in place.
    pub fn take_ref(&mut self, id: NodeId) -> Option<String> {
        let node = &mut self.nodes[id.0];
        if !matches!(node.get("$ref"), Some(Slot::Value(Value::String(_)))) {
            return None;
        }
        match node.remove("$ref") {
            Some(Slot::Value(Value::String(reference))) => Some(reference),
            _ => None,
        }
    }

    /// Subschemas nested directly under the composition keywords of a node.
    pub fn schema_children(&self, id: NodeId) -> Vec<NodeId> {
        let node = &self.nodes[id.0];
        let mut children = Vec::new();

        for key in SINGLE_SCHEMA_KEYWORDS {
            if let Some(Slot::Node(child)) = node.get(key) {
                children.push(*child);
            }
        }
        for key in MAP_SCHEMA_KEYWORDS {
            if let Some(Slot::Node(map)) = node.get(key) {
                children.extend(self.nodes[map.0].entries.iter().filter_map(|(_, s)| s.as_node()));
            }
        }
        for key in ARRAY_SCHEMA_KEYWORDS {
            if let Some(Slot::Array(items)) = node.get(key) {
                children.extend(items.iter().filter_map(Slot::as_node));
            }
        }

        children
    }
}

fn escape_pointer_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
