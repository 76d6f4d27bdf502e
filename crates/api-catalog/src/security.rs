//! Security scheme validation and auth header computation

use base64::{engine::general_purpose, Engine as _};
use tracing::warn;

use crate::error::{CatalogError, CatalogResult};
use crate::types::*;

/// A named authentication method declared by a spec.
///
/// The set of kinds is closed: anything other than HTTP basic, HTTP bearer
/// or an API key is rejected when the scheme is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    /// `Authorization: Basic base64(username:password)`
    Basic,
    /// `Authorization: Bearer <token>`
    Bearer { format: Option<String> },
    /// `<name>: <value>`, always sent as a header. A declared `query` or
    /// `cookie` location is recorded but not honored.
    ApiKey {
        name: String,
        location: ApiKeyLocation,
    },
}

impl SecurityScheme {
    /// Validate a scheme declaration
    pub fn new(
        scheme_type: &str,
        scheme: Option<&str>,
        name: Option<&str>,
    ) -> CatalogResult<Self> {
        match scheme_type {
            "http" => match scheme.map(str::to_ascii_lowercase).as_deref() {
                Some("basic") => Ok(SecurityScheme::Basic),
                Some("bearer") => Ok(SecurityScheme::Bearer { format: None }),
                other => Err(CatalogError::Configuration(format!(
                    "Security scheme '{}' is not supported.",
                    other.unwrap_or_default()
                ))),
            },
            "apiKey" => match name {
                Some(name) if !name.is_empty() => Ok(SecurityScheme::ApiKey {
                    name: name.to_string(),
                    location: ApiKeyLocation::Header,
                }),
                _ => Err(CatalogError::Configuration(
                    "Security type apiKey requires `name`.".to_string(),
                )),
            },
            other => Err(CatalogError::Configuration(format!(
                "Security type '{}' is not supported.",
                other
            ))),
        }
    }

    /// Build a scheme from a `components.securitySchemes` entry
    pub fn from_raw(raw: &RawSecurityScheme) -> CatalogResult<Self> {
        let mut scheme = Self::new(
            &raw.scheme_type,
            raw.scheme.as_deref(),
            raw.name.as_deref(),
        )?;

        match &mut scheme {
            SecurityScheme::Bearer { format } => *format = raw.bearer_format.clone(),
            SecurityScheme::ApiKey { name, location } => {
                *location = match raw.location.as_deref() {
                    Some("query") => ApiKeyLocation::Query,
                    Some("cookie") => ApiKeyLocation::Cookie,
                    _ => ApiKeyLocation::Header,
                };
                if *location != ApiKeyLocation::Header {
                    warn!(
                        "API key '{}' is declared in {:?} but will be sent as a header",
                        name, location
                    );
                }
            }
            SecurityScheme::Basic => {}
        }

        Ok(scheme)
    }

    /// The OpenAPI `type` of this scheme
    pub fn scheme_type(&self) -> &'static str {
        match self {
            SecurityScheme::Basic | SecurityScheme::Bearer { .. } => "http",
            SecurityScheme::ApiKey { .. } => "apiKey",
        }
    }

    /// The HTTP auth scheme name, for `http` schemes only
    pub fn http_scheme(&self) -> Option<&'static str> {
        match self {
            SecurityScheme::Basic => Some("basic"),
            SecurityScheme::Bearer { .. } => Some("bearer"),
            SecurityScheme::ApiKey { .. } => None,
        }
    }

    /// Get the header name for this scheme
    pub fn header_name(&self) -> &str {
        match self {
            SecurityScheme::Basic | SecurityScheme::Bearer { .. } => "Authorization",
            SecurityScheme::ApiKey { name, .. } => name,
        }
    }

    /// Compute the auth headers for the given credentials.
    ///
    /// API keys always land in a header, whatever their declared location.
    ///
    /// Fails with [`CatalogError::Auth`] when a field this scheme needs is missing.
    pub fn auth_headers(&self, credentials: &Credentials) -> CatalogResult<Headers> {
        let mut headers = Headers::new();

        match self {
            SecurityScheme::Basic => {
                let (Some(username), Some(password)) =
                    (credentials.get("username"), credentials.get("password"))
                else {
                    return Err(CatalogError::Auth(
                        "`username` and `password` are required for basic auth".to_string(),
                    ));
                };
                let encoded = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
                headers.insert(self.header_name().to_string(), format!("Basic {}", encoded));
            }
            SecurityScheme::Bearer { .. } => {
                let token = credentials.get("token").ok_or_else(|| {
                    CatalogError::Auth("`token` is required for bearer auth".to_string())
                })?;
                headers.insert(self.header_name().to_string(), format!("Bearer {}", token));
            }
            SecurityScheme::ApiKey { name, .. } => {
                let value = credentials.get(name).ok_or_else(|| {
                    CatalogError::Auth(format!("\"{}\" is required for API key auth", name))
                })?;
                headers.insert(name.clone(), value.to_string());
            }
        }

        Ok(headers)
    }
}
