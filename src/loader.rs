//! Schema loading from various sources.
//!
//! A [`SchemaSource`] turns a schema identifier into raw text. Identifiers
//! are URLs (`file://`, `http://`, `https://`) or plain file paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::LoadError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches raw schema text by identifier.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn load(&self, id: &str) -> Result<String, LoadError>;
}

/// Parse schema text.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_schema_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Check if a reference is absolute, i.e. starts with `scheme://`.
///
/// Anything else is resolved against the referring document.
pub fn is_absolute_reference(s: &str) -> bool {
    let Some((scheme, _)) = s.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Turn a file path into a `file://` identifier.
///
/// Relative paths are taken from the current directory. Returns the path
/// unchanged if it cannot be expressed as a URL.
pub fn path_to_id(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let absolute = absolute.canonicalize().unwrap_or(absolute);
    Url::from_file_path(&absolute)
        .map(String::from)
        .unwrap_or_else(|_| path.display().to_string())
}

/// Loads schemas from the local file system.
///
/// Accepts `file://` URLs and plain paths.
#[derive(Debug, Clone, Default)]
pub struct FileSource;

impl FileSource {
    fn path_for(id: &str) -> Result<PathBuf, LoadError> {
        if id.starts_with("file:") {
            Url::parse(id)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| LoadError::UnsupportedScheme { id: id.to_string() })
        } else if is_absolute_reference(id) {
            Err(LoadError::UnsupportedScheme { id: id.to_string() })
        } else {
            Ok(PathBuf::from(id))
        }
    }
}

#[async_trait]
impl SchemaSource for FileSource {
    async fn load(&self, id: &str) -> Result<String, LoadError> {
        let path = Self::path_for(id)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LoadError::FileNotFound { path });
        }

        tracing::debug!(path = %path.display(), "reading schema file");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| LoadError::ReadError { path, source })
    }
}

/// Loads schemas over HTTP/HTTPS.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

#[cfg(feature = "remote")]
impl HttpSource {
    /// # Errors
    ///
    /// Returns `LoadError::NetworkError` if the HTTP client can't be built.
    pub fn new() -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| LoadError::NetworkError {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl SchemaSource for HttpSource {
    async fn load(&self, id: &str) -> Result<String, LoadError> {
        let network_error = |source| LoadError::NetworkError {
            url: id.to_string(),
            source,
        };

        tracing::debug!(url = id, "fetching schema");
        let response = self.client.get(id).send().await.map_err(network_error)?;

        // Check for HTTP errors before reading the body
        let response = response.error_for_status().map_err(network_error)?;

        response.text().await.map_err(network_error)
    }
}

/// Dispatches on the identifier: HTTP(S) URLs go to the network (with the
/// `remote` feature), everything else to the file system.
///
/// An optional URL mapping serves URLs under a remote prefix from a local
/// directory instead, e.g. `https://example.com/schemas/a.json` from
/// `./mirror/a.json`.
#[derive(Debug, Clone, Default)]
pub struct DefaultSource {
    files: FileSource,
    #[cfg(feature = "remote")]
    http: Option<HttpSource>,
    mapping: Option<UrlMapping>,
}

#[derive(Debug, Clone)]
struct UrlMapping {
    remote_base: String,
    local_base: PathBuf,
}

impl DefaultSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve identifiers starting with `remote_base` from `local_base`.
    pub fn with_url_mapping(mut self, remote_base: impl Into<String>, local_base: impl Into<PathBuf>) -> Self {
        self.mapping = Some(UrlMapping {
            remote_base: remote_base.into(),
            local_base: local_base.into(),
        });
        self
    }

    #[cfg(feature = "remote")]
    pub fn with_http(mut self, http: HttpSource) -> Self {
        self.http = Some(http);
        self
    }

    fn mapped_path(&self, id: &str) -> Option<PathBuf> {
        let mapping = self.mapping.as_ref()?;
        let remainder = id.strip_prefix(&mapping.remote_base)?;
        Some(mapping.local_base.join(remainder.trim_start_matches('/')))
    }
}

#[async_trait]
impl SchemaSource for DefaultSource {
    async fn load(&self, id: &str) -> Result<String, LoadError> {
        if let Some(path) = self.mapped_path(id) {
            return self.files.load(&path.display().to_string()).await;
        }

        if is_url(id) {
            #[cfg(feature = "remote")]
            {
                let http = match &self.http {
                    Some(http) => http.clone(),
                    None => HttpSource::new()?,
                };
                return http.load(id).await;
            }
            #[cfg(not(feature = "remote"))]
            {
                return Err(LoadError::UnsupportedScheme { id: id.to_string() });
            }
        }

        self.files.load(id).await
    }
}
