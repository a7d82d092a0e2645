//! Schema Resolve CLI
//!
//! Command-line interface for expanding `$ref` pointers and finding the
//! schema associated with a file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use schema_resolve::{
    is_absolute_reference, load_schema_str, path_to_id, select_schema_for_document, DefaultSource,
    ResolvedSchema, SchemaRegistry, SchemaService, SchemaSource, SchemaStore, Settings,
    StreamSchemaService,
};

#[derive(Parser)]
#[command(name = "schema-resolve")]
#[command(about = "Expand JSON Schema $ref pointers and find the schema for a file")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every $ref in a schema
    Resolve {
        /// Schema source: file path or URL
        schema: String,

        /// Select the schemaSequence entry for this document position
        #[arg(long)]
        index: Option<usize>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Exit with status 1 if any reference could not be resolved
        #[arg(long)]
        strict: bool,

        /// Local directory serving URLs under --schema-remote-base
        #[arg(long, requires = "schema_remote_base")]
        schema_local_base: Option<PathBuf>,

        /// URL prefix served from the local base (e.g., https://example.com/schemas)
        #[arg(long, requires = "schema_local_base")]
        schema_remote_base: Option<String>,
    },

    /// Find and resolve the schema associated with a file
    Match {
        /// File path or URI of the resource
        resource: String,

        /// Settings file with schema associations
        #[arg(long)]
        settings: PathBuf,

        /// Select the schemaSequence entry for this document position
        #[arg(long)]
        index: Option<usize>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Exit with status 1 if any reference could not be resolved
        #[arg(long)]
        strict: bool,
    },
}

struct ResolveArgs {
    schema: String,
    index: Option<usize>,
    output: Option<PathBuf>,
    pretty: bool,
    strict: bool,
    schema_local_base: Option<PathBuf>,
    schema_remote_base: Option<String>,
}

struct MatchArgs {
    resource: String,
    settings: PathBuf,
    index: Option<usize>,
    pretty: bool,
    strict: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Resolve {
            schema,
            index,
            output,
            pretty,
            strict,
            schema_local_base,
            schema_remote_base,
        } => {
            run_resolve(ResolveArgs {
                schema,
                index,
                output,
                pretty,
                strict,
                schema_local_base,
                schema_remote_base,
            })
            .await
        }

        Commands::Match {
            resource,
            settings,
            index,
            pretty,
            strict,
        } => {
            run_match(MatchArgs {
                resource,
                settings,
                index,
                pretty,
                strict,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn run_resolve(args: ResolveArgs) -> Result<(), u8> {
    let ResolveArgs {
        schema,
        index,
        output,
        pretty,
        strict,
        schema_local_base,
        schema_remote_base,
    } = args;

    let mut source = DefaultSource::new();
    if let (Some(local_base), Some(remote_base)) = (schema_local_base, schema_remote_base) {
        source = source.with_url_mapping(remote_base, local_base);
    }

    let id = resource_id(&schema);

    // The root is loaded up front so a missing or broken file is a hard error
    let text = source.load(&id).await.map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let content = load_schema_str(&text).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let store = Arc::new(SchemaStore::with_source(source));
    store.add_schema(&id, content);
    let service = SchemaService::new(store);

    let resolved = service.get_resolved_schema(&id).await;
    let resolved = match index {
        Some(position) => select_schema_for_document(resolved, position),
        None => resolved,
    };

    emit(Some(&resolved), pretty, output.as_deref(), strict)
}

async fn run_match(args: MatchArgs) -> Result<(), u8> {
    let MatchArgs {
        resource,
        settings,
        index,
        pretty,
        strict,
    } = args;

    let settings = Settings::load(&settings).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let service = Arc::new(SchemaService::default());
    settings.apply_to(&service);

    let resource = resource_id(&resource);
    let resolved = match index {
        Some(position) => {
            StreamSchemaService::new(service)
                .get_schema_for_resource(&resource, position)
                .await
        }
        None => service.get_schema_for_resource(&resource).await,
    };

    emit(resolved.as_ref(), pretty, None, strict)
}

/// URLs are used as given; anything else is a local path.
fn resource_id(source: &str) -> String {
    if is_absolute_reference(source) {
        SchemaStore::new().normalize_id(source)
    } else {
        path_to_id(Path::new(source))
    }
}

/// Write the schema (or `null`), then report collected errors on stderr.
fn emit(
    resolved: Option<&ResolvedSchema>,
    pretty: bool,
    output: Option<&Path>,
    strict: bool,
) -> Result<(), u8> {
    let value = resolved.map(ResolvedSchema::schema).unwrap_or(Value::Null);

    let json_output = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    let errors = resolved.map(ResolvedSchema::errors).unwrap_or_default();
    for error in errors {
        eprintln!("warning: {}", error);
    }

    if strict && !errors.is_empty() {
        return Err(1);
    }
    Ok(())
}
