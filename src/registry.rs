//! Schema registry: identifiers, handles and cached content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use url::Url;

use crate::loader::{load_schema_str, DefaultSource, SchemaSource};
use crate::types::{Dependencies, ResolvedSchema, UnresolvedSchema};

/// Where schemas come from, as seen by the resolver.
pub trait SchemaRegistry: Send + Sync {
    /// Canonical form of a schema identifier.
    fn normalize_id(&self, id: &str) -> String;

    /// The handle for `id`, created on first use.
    fn get_or_add_schema_handle(&self, id: &str) -> Arc<SchemaHandle>;

    /// Resolve a relative reference against the document it appears in.
    ///
    /// `None` means no resolution is possible and the reference is used as
    /// written.
    fn resolve_relative_path(&self, reference: &str, base: &str) -> Option<String> {
        let _ = (reference, base);
        None
    }

    /// Register in-memory content under `id`, replacing any existing handle.
    fn add_schema(&self, id: &str, content: Value) -> Arc<SchemaHandle>;

    /// All handles created so far.
    fn handles(&self) -> Vec<Arc<SchemaHandle>>;
}

/// One schema document known to a registry.
///
/// Content is fetched on first request and cached until [`SchemaHandle::clear`].
pub struct SchemaHandle {
    id: String,
    source: Arc<dyn SchemaSource>,
    preset: Option<Value>,
    dependencies: Dependencies,
    unresolved: tokio::sync::Mutex<Option<Arc<UnresolvedSchema>>>,
    resolved: Mutex<Option<ResolvedSchema>>,
}

impl std::fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaHandle")
            .field("id", &self.id)
            .field("preset", &self.preset.is_some())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl SchemaHandle {
    /// A handle whose content is fetched from `source`.
    pub fn new(id: impl Into<String>, source: Arc<dyn SchemaSource>) -> Self {
        Self {
            id: id.into(),
            source,
            preset: None,
            dependencies: Dependencies::new(),
            unresolved: tokio::sync::Mutex::new(None),
            resolved: Mutex::new(None),
        }
    }

    /// A handle with fixed in-memory content.
    pub fn with_content(id: impl Into<String>, source: Arc<dyn SchemaSource>, content: Value) -> Self {
        Self {
            preset: Some(content),
            ..Self::new(id, source)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifiers of the external documents this schema's resolution touched.
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// The raw content, fetched once and then served from cache.
    ///
    /// Never fails: fetch and parse problems come back as errors on an
    /// empty schema. Concurrent callers share one fetch.
    pub async fn get_unresolved_schema(&self) -> Arc<UnresolvedSchema> {
        let mut cached = self.unresolved.lock().await;
        if let Some(schema) = cached.as_ref() {
            return Arc::clone(schema);
        }

        let schema = Arc::new(match &self.preset {
            Some(content) => UnresolvedSchema::new(content.clone()),
            None => self.fetch().await,
        });
        *cached = Some(Arc::clone(&schema));
        schema
    }

    async fn fetch(&self) -> UnresolvedSchema {
        match self.source.load(&self.id).await {
            Ok(text) => match load_schema_str(&text) {
                Ok(schema) => UnresolvedSchema::new(schema),
                Err(e) => {
                    tracing::debug!(id = %self.id, error = %e, "schema content does not parse");
                    UnresolvedSchema::with_errors(
                        json!({}),
                        vec![format!("Unable to parse content from '{}': {}.", self.id, e)],
                    )
                }
            },
            Err(e) => {
                tracing::debug!(id = %self.id, error = %e, "schema could not be loaded");
                UnresolvedSchema::with_errors(
                    json!({}),
                    vec![format!("Unable to load schema from '{}': {}.", self.id, e)],
                )
            }
        }
    }

    /// Previously stored resolution result.
    pub fn resolved_schema(&self) -> Option<ResolvedSchema> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store_resolved_schema(&self, resolved: ResolvedSchema) {
        *self.resolved.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolved);
    }

    /// Drop cached content and dependencies. Returns true if anything was cached.
    pub async fn clear(&self) -> bool {
        let had_unresolved = self.unresolved.lock().await.take().is_some();
        let had_resolved = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        self.dependencies.clear();
        had_unresolved || had_resolved
    }
}

/// Default registry keyed by normalized identifier.
pub struct SchemaStore {
    source: Arc<dyn SchemaSource>,
    handles: Mutex<HashMap<String, Arc<SchemaHandle>>>,
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore {
    /// A store that loads from files and, with the `remote` feature, HTTP.
    pub fn new() -> Self {
        Self::with_source(DefaultSource::new())
    }

    pub fn with_source(source: impl SchemaSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an existing handle without creating one.
    pub fn get_handle(&self, id: &str) -> Option<Arc<SchemaHandle>> {
        let id = self.normalize_id(id);
        self.lock().get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SchemaHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SchemaRegistry for SchemaStore {
    fn normalize_id(&self, id: &str) -> String {
        match Url::parse(id) {
            Ok(url) => url.to_string(),
            Err(_) => id.to_string(),
        }
    }

    fn get_or_add_schema_handle(&self, id: &str) -> Arc<SchemaHandle> {
        let id = self.normalize_id(id);
        let mut handles = self.lock();
        let handle = handles
            .entry(id.clone())
            .or_insert_with(|| Arc::new(SchemaHandle::new(id, Arc::clone(&self.source))));
        Arc::clone(handle)
    }

    fn resolve_relative_path(&self, reference: &str, base: &str) -> Option<String> {
        let base = Url::parse(base).ok()?;
        base.join(reference).ok().map(String::from)
    }

    fn add_schema(&self, id: &str, content: Value) -> Arc<SchemaHandle> {
        let id = self.normalize_id(id);
        let handle = Arc::new(SchemaHandle::with_content(
            id.clone(),
            Arc::clone(&self.source),
            content,
        ));
        self.lock().insert(id, Arc::clone(&handle));
        handle
    }

    fn handles(&self) -> Vec<Arc<SchemaHandle>> {
        self.lock().values().cloned().collect()
    }
}
