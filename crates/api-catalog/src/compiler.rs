//! Compiles API documents into a catalog of operations

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::operation::Operation;
use crate::postman;
use crate::resolver::Dereferencer;
use crate::security::SecurityScheme;
use crate::types::*;

/// Where a spec document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    /// Local file (JSON or YAML)
    Path(PathBuf),
    /// Remote document fetched over HTTP(S)
    Url(String),
    /// Document text held in memory
    Inline(String),
}

impl From<&str> for SpecSource {
    fn from(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            SpecSource::Url(source.to_string())
        } else {
            SpecSource::Path(PathBuf::from(source))
        }
    }
}

impl std::fmt::Display for SpecSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecSource::Path(path) => write!(f, "{}", path.display()),
            SpecSource::Url(url) => write!(f, "{}", url),
            SpecSource::Inline(_) => write!(f, "<inline>"),
        }
    }
}

/// Min/max bounds too large for serde_yaml's number handling
static LARGE_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\s*(?:minimum|maximum|exclusiveMinimum|exclusiveMaximum):\s*)(-?\d{16,})")
        .expect("large number regex should be valid")
});

/// Security schemes by declared name
type SecurityRegistry = HashMap<String, Arc<SecurityScheme>>;

/// Spec-to-operation compiler
pub struct SpecCompiler;

impl SpecCompiler {
    /// Load, convert if needed, dereference and compile a spec
    pub async fn parse(
        source: &SpecSource,
        auth: Option<Credentials>,
    ) -> CatalogResult<Vec<Operation>> {
        let mut document = Self::load(source).await?;

        if postman::is_collection(&document) {
            info!("Converting Postman collection from {}", source);
            document = postman::convert(&document)?;
        }

        let document = Dereferencer::dereference(&document);
        Self::compile(SpecDocument::new(document), auth)
    }

    /// Read a spec document from its source
    pub async fn load(source: &SpecSource) -> CatalogResult<Value> {
        match source {
            SpecSource::Path(path) => {
                debug!("Reading spec from {}", path.display());
                let content = tokio::fs::read_to_string(path).await?;
                Self::parse_str(&content)
            }
            SpecSource::Url(url) => Self::fetch(url).await,
            SpecSource::Inline(content) => Self::parse_str(content),
        }
    }

    /// Parse document text (auto-detects JSON/YAML)
    pub fn parse_str(content: &str) -> CatalogResult<Value> {
        let content = Self::sanitize_large_numbers(content);

        let value: Value = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        if !value.is_object() {
            return Err(CatalogError::InvalidFormat(
                "document root must be a mapping".to_string(),
            ));
        }

        Ok(value)
    }

    /// Sanitize large numbers that may cause parsing issues
    /// Some specs use very large numbers for min/max values
    /// which can cause serde_yaml to fail with "JSON number out of range"
    fn sanitize_large_numbers(content: &str) -> String {
        LARGE_NUMBER_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let prefix = &caps[1];
                if caps[2].starts_with('-') {
                    format!("{}-2147483648", prefix)
                } else {
                    format!("{}2147483647", prefix)
                }
            })
            .into_owned()
    }

    /// Fetch and parse a spec from a URL
    async fn fetch(url: &str) -> CatalogResult<Value> {
        info!("Fetching API spec from: {}", url);

        let response = reqwest::Client::new()
            .get(url)
            .header("Accept", "application/json, application/yaml, text/yaml")
            .send()
            .await
            .map_err(|e| CatalogError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::FetchError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| CatalogError::FetchError(e.to_string()))?;

        Self::parse_str(&content)
    }

    /// Compile a dereferenced document into operations, in declaration order.
    ///
    /// Any configuration error aborts the whole compilation.
    pub fn compile(
        document: SpecDocument,
        auth: Option<Credentials>,
    ) -> CatalogResult<Vec<Operation>> {
        let version = document.openapi_version().unwrap_or_default();
        if !version.starts_with("3.") {
            return Err(CatalogError::UnsupportedVersion(version.to_string()));
        }

        let group = document.title().unwrap_or_default().to_string();
        debug!("Compiling OpenAPI {} spec: {}", version, group);

        let registry = Self::build_security_registry(&document)?;
        let base_url = document
            .server_urls()
            .first()
            .map(|url| url.to_string())
            .ok_or_else(|| CatalogError::MissingField("servers".to_string()))?;

        let mut operations = Vec::new();

        for (path, path_item) in document.paths() {
            let path_params = path_item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for (key, details) in path_item {
                let Some(method) = HttpMethod::parse(key) else {
                    continue;
                };
                let Some(details) = details.as_object() else {
                    continue;
                };

                let securities = Self::select_securities(details, &document, &registry)?;
                let details = Self::normalize_details(path, method, details, &path_params);

                let operation = Operation::new(group.clone(), method, base_url.clone(), path, details)
                    .with_securities(securities)
                    .with_static_auth(auth.clone());
                operation.validate()?;

                debug!(
                    "Compiled {} {} -> {}",
                    method,
                    path,
                    operation.operation_id()
                );
                operations.push(operation);
            }
        }

        info!("Compiled {} operations from '{}'", operations.len(), group);
        Ok(operations)
    }

    /// Build the security scheme registry from `components.securitySchemes`
    fn build_security_registry(document: &SpecDocument) -> CatalogResult<SecurityRegistry> {
        let Some(schemes) = document.security_schemes() else {
            warn!("No `securitySchemes` found in this API spec.");
            return Ok(SecurityRegistry::new());
        };

        schemes
            .iter()
            .map(|(name, raw)| {
                let raw: RawSecurityScheme = serde_json::from_value(raw.clone()).map_err(|e| {
                    CatalogError::Configuration(format!(
                        "Invalid security scheme '{}': {}",
                        name, e
                    ))
                })?;
                Ok((name.clone(), Arc::new(SecurityScheme::from_raw(&raw)?)))
            })
            .collect()
    }

    /// Resolve an operation's security requirements.
    ///
    /// The operation-level list overrides the document default; neither means no auth.
    fn select_securities(
        details: &Map<String, Value>,
        document: &SpecDocument,
        registry: &SecurityRegistry,
    ) -> CatalogResult<Vec<Arc<SecurityScheme>>> {
        let requirements = details
            .get("security")
            .and_then(Value::as_array)
            .or_else(|| document.security())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut securities = Vec::new();
        for requirement in requirements {
            let Some(name) = requirement.as_object().and_then(|req| req.keys().next()) else {
                // `{}` marks the operation as optionally anonymous
                continue;
            };
            let scheme = registry.get(name).ok_or_else(|| {
                CatalogError::Configuration(format!("Invalid security '{}' reference.", name))
            })?;
            securities.push(Arc::clone(scheme));
        }

        Ok(securities)
    }

    /// Merge path-level parameters and fill in a missing operation ID
    fn normalize_details(
        path: &str,
        method: HttpMethod,
        details: &Map<String, Value>,
        path_params: &[Value],
    ) -> Value {
        let mut details = details.clone();

        if !path_params.is_empty() {
            let own_params = details
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut merged: Vec<Value> = path_params
                .iter()
                .filter(|inherited| {
                    !own_params
                        .iter()
                        .any(|own| same_parameter(own, inherited))
                })
                .cloned()
                .collect();
            merged.extend(own_params);
            details.insert("parameters".to_string(), Value::Array(merged));
        }

        let has_id = details
            .get("operationId")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            details.insert(
                "operationId".to_string(),
                Value::String(Self::generate_operation_id(path, method)),
            );
        }

        Value::Object(details)
    }

    /// Generate an operation ID from path and method
    fn generate_operation_id(path: &str, method: HttpMethod) -> String {
        // Convert path to operation ID: /users/{id}/posts -> users_id_posts
        let path_part = path
            .trim_start_matches('/')
            .replace('/', "_")
            .replace(['{', '}'], "");

        format!("{}_{}", method.as_str().to_lowercase(), path_part)
    }
}

fn same_parameter(a: &Value, b: &Value) -> bool {
    a.get("name") == b.get("name") && a.get("in") == b.get("in")
}
