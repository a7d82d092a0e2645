//! Schema service: pattern associations, resolution and caching.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};

use crate::pattern::FilePatternAssociation;
use crate::registry::{SchemaRegistry, SchemaStore};
use crate::resolver::RefResolver;
use crate::types::{Dependencies, ResolvedSchema, UnresolvedSchema};

/// Prefix of the identifiers given to synthesized combined schemas.
pub const COMBINED_SCHEMA_PREFIX: &str = "schemaservice://combinedSchema/";

/// Finds and resolves the schemas that apply to a resource.
///
/// Knows nothing about multi-document streams; see
/// [`StreamSchemaService`](crate::StreamSchemaService) for that.
pub struct SchemaService {
    registry: Arc<dyn SchemaRegistry>,
    associations: RwLock<Vec<FilePatternAssociation>>,
    /// Member ids of each combined schema registered so far.
    combined: RwLock<HashMap<String, Vec<String>>>,
}

impl Default for SchemaService {
    fn default() -> Self {
        Self::new(Arc::new(SchemaStore::new()))
    }
}

impl SchemaService {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            registry,
            associations: RwLock::new(Vec::new()),
            combined: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &dyn SchemaRegistry {
        self.registry.as_ref()
    }

    /// Associate `pattern` with `schemas`. Schema ids are normalized.
    pub fn register_association<I, S>(&self, pattern: &str, schemas: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = schemas
            .into_iter()
            .map(|id| self.registry.normalize_id(id.as_ref()))
            .collect();
        self.associations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FilePatternAssociation::new(pattern, ids));
    }

    /// Snapshot of the registered associations, in registration order.
    pub fn associations(&self) -> Vec<FilePatternAssociation> {
        self.associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_associations(&self) {
        self.associations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Schema ids of every association matching `resource`.
    ///
    /// Associations are scanned in registration order; the result keeps the
    /// first occurrence of each id.
    pub fn schema_ids_for_resource(&self, resource: &str) -> Vec<String> {
        let associations = self
            .associations
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut ids: Vec<String> = Vec::new();
        for association in associations.iter().filter(|a| a.matches_pattern(resource)) {
            for id in association.schemas() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Resolve `$ref`s in raw schema content.
    pub async fn resolve_schema_content(
        &self,
        unresolved: &UnresolvedSchema,
        base_document_id: &str,
        dependencies: &Dependencies,
    ) -> ResolvedSchema {
        RefResolver::new(self.registry.as_ref())
            .resolve_schema_content(unresolved, base_document_id, dependencies)
            .await
    }

    /// Fetch and resolve the schema with the given id.
    ///
    /// The result is cached on the schema's handle until
    /// [`SchemaService::on_resource_change`] invalidates it. Load failures
    /// show up as errors on the returned schema.
    pub async fn get_resolved_schema(&self, id: &str) -> ResolvedSchema {
        let id = self.registry.normalize_id(id);
        let handle = self.registry.get_or_add_schema_handle(&id);
        if let Some(resolved) = handle.resolved_schema() {
            return resolved;
        }

        let unresolved = handle.get_unresolved_schema().await;
        let resolved = self
            .resolve_schema_content(&unresolved, handle.id(), handle.dependencies())
            .await;
        handle.store_resolved_schema(resolved.clone());
        resolved
    }

    /// The resolved schema for `resource`, or `None` if no pattern matches.
    ///
    /// Several matching schemas are combined with `allOf`.
    pub async fn get_schema_for_resource(&self, resource: &str) -> Option<ResolvedSchema> {
        let ids = self.schema_ids_for_resource(resource);
        if ids.is_empty() {
            tracing::debug!(resource, "no schema associated");
            return None;
        }

        let id = self.create_combined_schema(resource, &ids);
        Some(self.get_resolved_schema(&id).await)
    }

    /// Id of a schema standing for all of `ids`.
    ///
    /// A single id is returned as is. Several ids are combined into
    /// `{"allOf": [{"$ref": id}, ...]}`, registered under an id derived from
    /// `resource`. The registration is reused while the member ids stay the
    /// same, so its resolved form stays cached.
    pub fn create_combined_schema(&self, resource: &str, ids: &[String]) -> String {
        if let [single] = ids {
            return single.clone();
        }

        let combined_id = self.registry.normalize_id(&format!(
            "{}{}",
            COMBINED_SCHEMA_PREFIX,
            utf8_percent_encode(resource, NON_ALPHANUMERIC)
        ));

        let mut combined = self.combined.write().unwrap_or_else(PoisonError::into_inner);
        if combined.get(&combined_id).is_some_and(|members| members == ids) {
            return combined_id;
        }

        let all_of: Vec<Value> = ids.iter().map(|id| json!({ "$ref": id })).collect();
        self.registry
            .add_schema(&combined_id, json!({ "allOf": all_of }));
        combined.insert(combined_id.clone(), ids.to_vec());
        combined_id
    }

    /// Invalidate cached schemas after `uri` changed.
    ///
    /// Clears the handle for `uri` and, transitively, every handle whose
    /// dependencies include an invalidated one. Returns true if any cached
    /// content was dropped.
    pub async fn on_resource_change(&self, uri: &str) -> bool {
        let mut remaining = self.registry.handles();
        let mut to_walk = vec![self.registry.normalize_id(uri)];
        let mut changed = false;

        while let Some(current) = to_walk.pop() {
            let (affected, rest): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|handle| {
                handle.id() == current || handle.dependencies().contains(&current)
            });
            remaining = rest;

            for handle in affected {
                if handle.id() != current {
                    to_walk.push(handle.id().to_string());
                }
                if handle.clear().await {
                    tracing::debug!(id = handle.id(), changed = %current, "invalidated schema");
                    changed = true;
                }
            }
        }
        changed
    }
}
