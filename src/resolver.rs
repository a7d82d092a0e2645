//! Reference resolution - expands `$ref` pointers in place.
//!
//! The schema is loaded into a [`SchemaArena`] and walked from its root. A
//! local reference (`#/definitions/x`) merges the addressed section into the
//! referring node; an external one (`other.json#/x`) is fetched through the
//! registry, merged the same way, and then walked with the external document
//! as the new fragment root. Fetches run concurrently; their results are
//! applied one at a time by the resolution that owns the arena.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::arena::{NodeId, SchemaArena, Slot};
use crate::loader::is_absolute_reference;
use crate::registry::{SchemaHandle, SchemaRegistry};
use crate::types::{Dependencies, ResolvedSchema, UnresolvedSchema};

/// Resolves `$ref` pointers, fetching external documents from a registry.
pub struct RefResolver<'a> {
    registry: &'a dyn SchemaRegistry,
}

/// The document that fragments are resolved against.
#[derive(Clone)]
struct Scope {
    root: Slot,
    base: String,
    dependencies: Dependencies,
}

/// An external reference waiting for its document.
struct PendingLink {
    node: NodeId,
    document: String,
    fragment: String,
    scope: Scope,
}

/// A fetched external document, ready to be merged.
struct FetchedLink {
    link: PendingLink,
    id: String,
    handle: Arc<SchemaHandle>,
    unresolved: Arc<UnresolvedSchema>,
}

impl<'a> RefResolver<'a> {
    pub fn new(registry: &'a dyn SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Resolve every reachable `$ref` in `unresolved`.
    ///
    /// `base_document_id` is the identifier fragments and relative references
    /// are resolved against. Every external document fetched directly from
    /// this schema is recorded in `dependencies`; documents fetched while
    /// resolving an external document are recorded on that document's handle.
    ///
    /// Never fails. Problems are reported in [`ResolvedSchema::errors`],
    /// after any errors already carried by `unresolved`. When several
    /// external references are pending, their messages appear in fetch
    /// completion order.
    pub async fn resolve_schema_content(
        &self,
        unresolved: &UnresolvedSchema,
        base_document_id: &str,
        dependencies: &Dependencies,
    ) -> ResolvedSchema {
        let mut resolution = Resolution::new(unresolved.errors.clone());
        let root = resolution.arena.load(&unresolved.schema);
        let scope = Scope {
            root: root.clone(),
            base: base_document_id.to_string(),
            dependencies: dependencies.clone(),
        };

        let mut pending = FuturesUnordered::new();
        if let Slot::Node(id) = root {
            for link in resolution.walk(id, &scope, false) {
                pending.push(self.fetch(link));
            }
        }

        while let Some(fetched) = pending.next().await {
            for link in resolution.apply(fetched) {
                pending.push(self.fetch(link));
            }
        }

        ResolvedSchema {
            arena: Arc::new(resolution.arena),
            root,
            errors: resolution.errors,
            url: Some(base_document_id.to_string()),
        }
    }

    fn fetch(&self, link: PendingLink) -> BoxFuture<'a, FetchedLink> {
        let registry = self.registry;
        Box::pin(async move {
            let target = if is_absolute_reference(&link.document) {
                link.document.clone()
            } else {
                registry
                    .resolve_relative_path(&link.document, &link.scope.base)
                    .unwrap_or_else(|| link.document.clone())
            };
            let id = registry.normalize_id(&target);
            let handle = registry.get_or_add_schema_handle(&id);
            tracing::debug!(reference = %id, from = %link.scope.base, "loading external reference");
            let unresolved = handle.get_unresolved_schema().await;
            FetchedLink {
                link,
                id,
                handle,
                unresolved,
            }
        })
    }
}

/// Mutable state of one top-level resolution.
struct Resolution {
    arena: SchemaArena,
    errors: Vec<String>,
    /// Nodes already walked, across every walk of this resolution.
    seen: HashSet<NodeId>,
    /// External documents already loaded into the arena, by identifier.
    documents: HashMap<String, Slot>,
    /// External references (`<id>#<fragment>`) already merged into each node.
    merged: HashMap<NodeId, HashSet<String>>,
}

impl Resolution {
    fn new(errors: Vec<String>) -> Self {
        Self {
            arena: SchemaArena::new(),
            errors,
            seen: HashSet::new(),
            documents: HashMap::new(),
            merged: HashMap::new(),
        }
    }

    /// Walk the subschemas reachable from `start`, expanding local references.
    ///
    /// With `revisit_start` the start node is processed even if an earlier
    /// walk already saw it; that is how a node continues once its external
    /// content has arrived.
    fn walk(&mut self, start: NodeId, scope: &Scope, revisit_start: bool) -> Vec<PendingLink> {
        if revisit_start {
            self.seen.remove(&start);
        }

        let mut links = Vec::new();
        let mut to_walk = vec![start];
        while let Some(next) = to_walk.pop() {
            if !self.seen.insert(next) {
                continue;
            }
            tracing::trace!(node = ?next, base = %scope.base, "walking node");
            if let Some(link) = self.follow_refs(next, scope) {
                links.push(link);
            }
            to_walk.extend(self.arena.schema_children(next));
        }
        links
    }

    /// Follow the `$ref` chain of one node.
    ///
    /// Local references are merged immediately and may bring in a further
    /// `$ref`; the chain stops at an external reference, at a fragment that
    /// does not resolve, or at a reference already followed for this node.
    fn follow_refs(&mut self, node: NodeId, scope: &Scope) -> Option<PendingLink> {
        let mut followed = HashSet::new();
        while let Some(reference) = self.arena.take_ref(node) {
            let (document, fragment) = split_reference(&reference);
            if !document.is_empty() {
                return Some(PendingLink {
                    node,
                    document: document.to_string(),
                    fragment: fragment.to_string(),
                    scope: scope.clone(),
                });
            }

            if followed.contains(&reference) {
                break;
            }
            if !self.merge_fragment(node, scope, fragment) {
                break;
            }
            followed.insert(reference);
        }
        None
    }

    /// Merge the section addressed by `fragment` within `scope` into `node`.
    fn merge_fragment(&mut self, node: NodeId, scope: &Scope, fragment: &str) -> bool {
        match self.arena.lookup(&scope.root, fragment) {
            Some(Slot::Node(section)) => {
                self.arena.merge(node, section);
                true
            }
            _ => {
                tracing::debug!(fragment, base = %scope.base, "unresolvable reference");
                self.errors.push(format!(
                    "$ref '{}' in '{}' can not be resolved.",
                    fragment, scope.base
                ));
                false
            }
        }
    }

    /// Apply a fetched external document and walk what it brought in.
    fn apply(&mut self, fetched: FetchedLink) -> Vec<PendingLink> {
        let FetchedLink {
            link,
            id,
            handle,
            unresolved,
        } = fetched;

        link.scope.dependencies.insert(id.as_str());
        let location = if link.fragment.is_empty() {
            id.clone()
        } else {
            format!("{}#{}", id, link.fragment)
        };

        // A chain that comes back to a reference this node already took in
        if !self.merged.entry(link.node).or_default().insert(location.clone()) {
            tracing::trace!(node = ?link.node, reference = %location, "external reference cycle");
            return Vec::new();
        }
        if let Some(first) = unresolved.errors.first() {
            self.errors
                .push(format!("Problems loading reference '{}': {}", location, first));
        }

        let root = match self.documents.get(&id) {
            Some(root) => root.clone(),
            None => {
                let root = self.arena.load(&unresolved.schema);
                self.documents.insert(id.clone(), root.clone());
                root
            }
        };
        let external = Scope {
            root,
            base: id,
            dependencies: handle.dependencies().clone(),
        };

        self.merge_fragment(link.node, &external, &link.fragment);
        self.walk(link.node, &external, true)
    }
}

/// Split a reference at its first `#` into document and fragment parts.
fn split_reference(reference: &str) -> (&str, &str) {
    reference.split_once('#').unwrap_or((reference, ""))
}
