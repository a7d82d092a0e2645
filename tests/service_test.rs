//! Integration tests for schema association, selection and invalidation.

use std::fs;
use std::sync::Arc;

use schema_resolve::{
    path_to_id, FilePatternAssociation, ProviderError, SchemaRegistry, SchemaService,
    SchemaStore, Settings, StreamSchemaService, COMBINED_SCHEMA_PREFIX,
};
use serde_json::json;
use tempfile::TempDir;

fn write_schema(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path_to_id(&path)
}

fn service() -> (Arc<SchemaStore>, Arc<SchemaService>) {
    let store = Arc::new(SchemaStore::new());
    let service = Arc::new(SchemaService::new(store.clone()));
    (store, service)
}

// === Pattern Matching ===

mod patterns {
    use super::*;

    #[test]
    fn wildcard_matches_suffix() {
        let association = FilePatternAssociation::new("*.yaml", ["mem://a"]);
        assert!(association.matches_pattern("file:///work/app.yaml"));
        assert!(association.matches_pattern("app.yaml"));
        assert!(!association.matches_pattern("file:///work/app.yaml.bak"));
        assert!(!association.matches_pattern("file:///work/app.yml"));
    }

    #[test]
    fn directory_patterns() {
        let association = FilePatternAssociation::new(".github/workflows/*", ["mem://gh"]);
        assert!(association.matches_pattern("file:///repo/.github/workflows/ci.yml"));
        assert!(!association.matches_pattern("file:///repo/.github/ci.yml"));
    }

    #[test]
    fn regex_characters_are_literal() {
        let association = FilePatternAssociation::new("config(1).json", ["mem://c"]);
        assert!(association.matches_pattern("/w/config(1).json"));
        assert!(!association.matches_pattern("/w/config1.json"));

        let association = FilePatternAssociation::new("a.json", ["mem://c"]);
        assert!(!association.matches_pattern("/w/a_json"));
    }

    #[test]
    fn schemas_accumulate() {
        let mut association = FilePatternAssociation::new("*.json", ["mem://a"]);
        association.add_schema("mem://b");
        assert_eq!(association.schemas(), ["mem://a", "mem://b"]);
        assert_eq!(association.pattern(), "*.json");
        assert!(!association.is_inert());
    }
}

// === Schema Service ===

mod schema_service {
    use super::*;

    #[tokio::test]
    async fn resource_gets_associated_schema() {
        let (store, service) = service();
        store.add_schema("mem://app", json!({ "type": "object" }));
        service.register_association("*.app.json", ["mem://app"]);

        let resolved = service
            .get_schema_for_resource("file:///w/main.app.json")
            .await
            .unwrap();
        assert_eq!(resolved.schema(), json!({ "type": "object" }));
        assert_eq!(resolved.url(), Some("mem://app"));
        assert!(service.get_schema_for_resource("file:///w/main.json").await.is_none());
    }

    #[tokio::test]
    async fn several_schemas_are_combined() {
        let (store, service) = service();
        store.add_schema("mem://a", json!({ "required": ["a"] }));
        store.add_schema("mem://b", json!({ "required": ["b"] }));
        service.register_association("*.json", ["mem://a"]);
        service.register_association("special.json", ["mem://b", "mem://a"]);

        let resolved = service
            .get_schema_for_resource("file:///w/special.json")
            .await
            .unwrap();
        assert_eq!(
            resolved.schema(),
            json!({ "allOf": [{ "required": ["a"] }, { "required": ["b"] }] })
        );
        assert!(resolved
            .url()
            .is_some_and(|url| url.starts_with(COMBINED_SCHEMA_PREFIX)));
    }

    #[tokio::test]
    async fn combined_schema_is_cached() {
        let (store, service) = service();
        store.add_schema("mem://a", json!({ "title": "a" }));
        store.add_schema("mem://b", json!({ "title": "b" }));
        service.register_association("*.json", ["mem://a", "mem://b"]);

        service.get_schema_for_resource("file:///w/x.json").await.unwrap();
        let combined = service
            .create_combined_schema("file:///w/x.json", &["mem://a".into(), "mem://b".into()]);
        let handle = store.get_handle(&combined).unwrap();
        assert!(handle.resolved_schema().is_some());

        service.get_schema_for_resource("file:///w/x.json").await.unwrap();
        assert!(Arc::ptr_eq(&handle, &store.get_handle(&combined).unwrap()));
    }

    #[tokio::test]
    async fn missing_schema_reports_load_error() {
        let (_, service) = service();
        let dir = TempDir::new().unwrap();
        let missing = path_to_id(&dir.path().canonicalize().unwrap().join("nope.json"));
        service.register_association("*.yaml", [&missing]);

        let resolved = service
            .get_schema_for_resource("file:///w/a.yaml")
            .await
            .unwrap();
        assert_eq!(resolved.schema(), json!({}));
        assert_eq!(resolved.errors().len(), 1);
        assert!(resolved.errors()[0].starts_with(&format!("Unable to load schema from '{missing}'")));
    }

    #[tokio::test]
    async fn change_invalidates_dependents() {
        let dir = TempDir::new().unwrap();
        let leaf = write_schema(&dir, "leaf.json", r#"{"type":"string"}"#);
        let middle = write_schema(&dir, "middle.json", r#"{"items":{"$ref":"leaf.json"}}"#);
        let root = write_schema(&dir, "root.json", r#"{"properties":{"list":{"$ref":"middle.json"}}}"#);

        let (store, service) = service();
        let first = service.get_resolved_schema(&root).await;
        assert_eq!(first.schema()["properties"]["list"]["items"]["type"], "string");

        fs::write(dir.path().join("leaf.json"), r#"{"type":"integer"}"#).unwrap();

        // still cached
        let cached = service.get_resolved_schema(&root).await;
        assert_eq!(cached.schema()["properties"]["list"]["items"]["type"], "string");

        assert!(service.on_resource_change(&leaf).await);
        assert!(store.get_handle(&middle).unwrap().resolved_schema().is_none());
        assert!(store.get_handle(&root).unwrap().resolved_schema().is_none());

        let fresh = service.get_resolved_schema(&root).await;
        assert_eq!(fresh.schema()["properties"]["list"]["items"]["type"], "integer");
    }

    #[tokio::test]
    async fn unrelated_change_keeps_cache() {
        let dir = TempDir::new().unwrap();
        let root = write_schema(&dir, "root.json", r#"{"type":"object"}"#);
        let other = write_schema(&dir, "other.json", r#"{"type":"object"}"#);

        let (store, service) = service();
        service.get_resolved_schema(&root).await;
        service.get_resolved_schema(&other).await;

        assert!(service.on_resource_change(&other).await);
        assert!(store.get_handle(&root).unwrap().resolved_schema().is_some());
        assert!(!service.on_resource_change("file:///never/loaded.json").await);
    }
}

// === Multi-document Streams ===

mod streams {
    use super::*;

    const SEQUENCE: &str = r##"{
        "definitions": {
            "header": { "properties": { "version": { "type": "integer" } } },
            "body": { "properties": { "items": { "type": "array" } } }
        },
        "schemaSequence": [
            { "$ref": "#/definitions/header" },
            { "$ref": "#/definitions/body" }
        ]
    }"##;

    #[tokio::test]
    async fn document_position_selects_sequence_entry() {
        let dir = TempDir::new().unwrap();
        let schema = write_schema(&dir, "stream.json", SEQUENCE);

        let (_, service) = service();
        service.register_association("*.stream.yaml", [&schema]);
        let stream = StreamSchemaService::new(service);

        let header = stream
            .get_schema_for_resource("file:///w/a.stream.yaml", 0)
            .await
            .unwrap();
        assert_eq!(header.schema()["properties"]["version"]["type"], "integer");
        assert_eq!(header.url(), None);
        assert!(header.errors().is_empty());

        let body = stream
            .get_schema_for_resource("file:///w/a.stream.yaml", 1)
            .await
            .unwrap();
        assert_eq!(body.schema()["properties"]["items"]["type"], "array");

        let past_end = stream
            .get_schema_for_resource("file:///w/a.stream.yaml", 2)
            .await
            .unwrap();
        assert!(past_end.schema().get("schemaSequence").is_some());
        assert_eq!(past_end.url(), Some(schema.as_str()));
    }

    #[tokio::test]
    async fn custom_provider_overrides_patterns() {
        let dir = TempDir::new().unwrap();
        let pattern_schema = write_schema(&dir, "pattern.json", r#"{"title":"pattern"}"#);
        let custom_schema = write_schema(&dir, "custom.json", r#"{"title":"custom"}"#);

        let (_, service) = service();
        service.register_association("*.yaml", [&pattern_schema]);
        let stream = StreamSchemaService::new(service);

        let custom = custom_schema.clone();
        stream.register_custom_schema_provider(move |resource: String| {
            let custom = custom.clone();
            async move {
                Ok::<_, ProviderError>(resource.contains("/custom/").then_some(custom))
            }
        });

        let resolved = stream
            .get_schema_for_resource("file:///w/custom/a.yaml", 0)
            .await
            .unwrap();
        assert_eq!(resolved.schema()["title"], "custom");

        let resolved = stream
            .get_schema_for_resource("file:///w/plain/a.yaml", 0)
            .await
            .unwrap();
        assert_eq!(resolved.schema()["title"], "pattern");
    }

    #[tokio::test]
    async fn failing_provider_falls_back() {
        let (store, service) = service();
        store.add_schema("mem://fallback", json!({ "title": "fallback" }));
        service.register_association("*.yaml", ["mem://fallback"]);
        let stream = StreamSchemaService::new(service);
        stream.register_custom_schema_provider(|_resource: String| async move {
            Err::<Option<String>, ProviderError>("lookup failed".into())
        });

        let resolved = stream
            .get_schema_for_resource("file:///w/a.yaml", 0)
            .await
            .unwrap();
        assert_eq!(resolved.schema()["title"], "fallback");
        assert!(stream.get_schema_for_resource("file:///w/a.json", 0).await.is_none());
    }
}

// === Settings ===

mod settings {
    use super::*;

    #[tokio::test]
    async fn settings_file_drives_association() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("schemas")).unwrap();
        fs::write(
            dir.path().join("schemas/app.json"),
            r##"{"definitions":{"port":{"type":"integer"}},"properties":{"port":{"$ref":"#/definitions/port"}}}"##,
        )
        .unwrap();
        let settings_path = dir.path().join("settings.json");
        fs::write(
            &settings_path,
            r#"{"schemas":{"schemas/app.json":["app.yaml","*.app.yaml"]}}"#,
        )
        .unwrap();

        let settings = Settings::load(&settings_path).unwrap();
        let (store, service) = service();
        settings.apply_to(&service);

        let resolved = service
            .get_schema_for_resource("file:///w/prod.app.yaml")
            .await
            .unwrap();
        assert!(resolved.errors().is_empty(), "{:?}", resolved.errors());
        assert_eq!(resolved.schema()["properties"]["port"]["type"], "integer");

        let schema_id = settings.associations[0].schema.clone();
        assert_eq!(store.normalize_id(&schema_id), schema_id);
        assert!(schema_id.ends_with("/schemas/app.json"));
    }
}
