//! Schema selection for multi-document streams.
//!
//! [`StreamSchemaService`] wraps a [`SchemaService`] and adds the two things
//! a stream of documents needs: a per-resource override hook and the
//! positional `schemaSequence` pick.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::selector::select_schema_for_document;
use crate::service::SchemaService;
use crate::types::ResolvedSchema;

/// Per-resource schema override.
///
/// Returning `Ok(None)` or an error defers to the pattern associations.
#[async_trait]
pub trait CustomSchemaProvider: Send + Sync {
    async fn schema_for(&self, resource: &str) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
impl<F, Fut> CustomSchemaProvider for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>, ProviderError>> + Send + 'static,
{
    async fn schema_for(&self, resource: &str) -> Result<Option<String>, ProviderError> {
        self(resource.to_string()).await
    }
}

/// Chooses the resolved schema for one document of a stream.
pub struct StreamSchemaService {
    inner: Arc<SchemaService>,
    custom_provider: RwLock<Option<Arc<dyn CustomSchemaProvider>>>,
}

impl StreamSchemaService {
    pub fn new(inner: Arc<SchemaService>) -> Self {
        Self {
            inner,
            custom_provider: RwLock::new(None),
        }
    }

    /// The wrapped service.
    pub fn inner(&self) -> &SchemaService {
        &self.inner
    }

    /// Install the override hook, replacing any previous one.
    pub fn register_custom_schema_provider(&self, provider: impl CustomSchemaProvider + 'static) {
        *self
            .custom_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(provider));
    }

    pub fn register_association<I, S>(&self, pattern: &str, schemas: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.register_association(pattern, schemas);
    }

    /// The schema for the document at `document_position` of `resource`.
    ///
    /// The custom provider, if any, is asked first; its schema is used alone.
    /// Otherwise every matching pattern association contributes. `None`
    /// means no schema applies.
    pub async fn get_schema_for_resource(
        &self,
        resource: &str,
        document_position: usize,
    ) -> Option<ResolvedSchema> {
        if let Some(reference) = self.custom_schema(resource).await {
            let resolved = self.inner.get_resolved_schema(&reference).await;
            return Some(select_schema_for_document(resolved, document_position));
        }

        let resolved = self.inner.get_schema_for_resource(resource).await?;
        Some(select_schema_for_document(resolved, document_position))
    }

    async fn custom_schema(&self, resource: &str) -> Option<String> {
        let provider = self
            .custom_provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;

        match provider.schema_for(resource).await {
            Ok(Some(reference)) => Some(reference),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(resource, error = %e, "custom schema provider failed, using associations");
                None
            }
        }
    }
}
