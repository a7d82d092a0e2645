//! Schema Resolve
//!
//! Expansion of JSON Schema `$ref` pointers across documents, and selection
//! of the schema that applies to a resource.
//!
//! Referenced sections are merged into the node holding the `$ref`, keys
//! already present on the node taking precedence. External documents are
//! fetched through a [`SchemaRegistry`] and resolved against their own
//! contents. Resolution never fails: problems are collected on the
//! [`ResolvedSchema`].
//!
//! # Example
//!
//! ```
//! use schema_resolve::{Dependencies, RefResolver, SchemaStore, UnresolvedSchema};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = SchemaStore::new();
//! let schema = UnresolvedSchema::new(json!({
//!     "definitions": { "name": { "type": "string", "minLength": 1 } },
//!     "properties": {
//!         "first": { "$ref": "#/definitions/name", "minLength": 2 }
//!     }
//! }));
//!
//! let resolved = RefResolver::new(&store)
//!     .resolve_schema_content(&schema, "file:///schemas/person.json", &Dependencies::new())
//!     .await;
//!
//! // The node's own keys win over the referenced section
//! let first = &resolved.schema()["properties"]["first"];
//! assert_eq!(first["type"], "string");
//! assert_eq!(first["minLength"], 2);
//! assert!(first.get("$ref").is_none());
//! assert!(resolved.errors().is_empty());
//! # }
//! ```
//!
//! # Multi-document streams
//!
//! A schema may list one schema per document under `schemaSequence`.
//! [`StreamSchemaService`] picks the entry for a document position:
//!
//! ```json
//! { "schemaSequence": [ { "$ref": "header.json" }, { "$ref": "body.json" } ] }
//! ```

mod arena;
mod error;
mod loader;
mod pattern;
mod registry;
mod resolver;
mod selector;
mod service;
mod settings;
mod stream;
mod types;

pub use error::{LoadError, ProviderError, SettingsError};
pub use loader::{
    is_absolute_reference, is_url, load_schema_str, path_to_id, DefaultSource, FileSource,
    SchemaSource,
};
pub use pattern::FilePatternAssociation;
pub use registry::{SchemaHandle, SchemaRegistry, SchemaStore};
pub use resolver::RefResolver;
pub use selector::select_schema_for_document;
pub use service::{SchemaService, COMBINED_SCHEMA_PREFIX};
pub use settings::{SchemaAssociation, Settings};
pub use stream::{CustomSchemaProvider, StreamSchemaService};
pub use types::{Dependencies, ResolvedSchema, UnresolvedSchema};

#[cfg(feature = "remote")]
pub use loader::HttpSource;
