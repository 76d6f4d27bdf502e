//! Compiled API operations: schema derivation, URL building and execution

use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{CatalogError, CatalogResult};
use crate::http::{merge_headers, Exchange, HttpRequest, HttpTransport};
use crate::security::SecurityScheme;
use crate::types::*;

const JSON_MEDIA_TYPE: &str = "application/json";

/// One (path, method) endpoint compiled from a spec.
///
/// Immutable once built; a catalog of these is shared by every resolution.
#[derive(Debug, Clone)]
pub struct Operation {
    group: String,
    method: HttpMethod,
    base_url: String,
    path: String,
    details: Value,
    securities: Vec<Arc<SecurityScheme>>,
    static_auth: Option<Credentials>,
}

impl Operation {
    /// Create an operation with no security requirements
    pub fn new(
        group: impl Into<String>,
        method: HttpMethod,
        base_url: impl Into<String>,
        path: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            group: group.into(),
            method,
            base_url: base_url.into(),
            path: path.into(),
            details,
            securities: Vec::new(),
            static_auth: None,
        }
    }

    /// Set the security schemes, tried in the given order
    pub fn with_securities(mut self, securities: Vec<Arc<SecurityScheme>>) -> Self {
        self.securities = securities;
        self
    }

    /// Set credentials used when the caller supplies none for a field
    pub fn with_static_auth(mut self, auth: Option<Credentials>) -> Self {
        self.static_auth = auth;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw operation object from the spec
    pub fn details(&self) -> &Value {
        &self.details
    }

    pub fn securities(&self) -> &[Arc<SecurityScheme>] {
        &self.securities
    }

    pub fn static_auth(&self) -> Option<&Credentials> {
        self.static_auth.as_ref()
    }

    pub fn operation_id(&self) -> &str {
        self.details
            .get("operationId")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Summary with one trailing period removed; the key used to match
    /// oracle answers against the catalog.
    pub fn summary(&self) -> String {
        let summary = self
            .details
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.operation_id());
        strip_trailing_period(summary).to_string()
    }

    pub fn description(&self) -> Option<&str> {
        self.details.get("description").and_then(Value::as_str)
    }

    /// Full URL with declared path parameters substituted from `params`.
    ///
    /// Placeholders without a usable value are left as-is.
    pub fn url(&self, params: Option<&Map<String, Value>>) -> String {
        let mut url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );

        let Some(params) = params else {
            return url;
        };

        for param in self.declared_parameters() {
            if param.location() != Some(ParameterLocation::Path) {
                continue;
            }
            match params.get(&param.name) {
                Some(Value::Null) | None => {}
                Some(value) => {
                    let encoded = percent_encode_path_param(&value_to_string(value));
                    url = url.replace(&format!("{{{}}}", param.name), &encoded);
                }
            }
        }

        url
    }

    /// Describe this operation for a tool-calling oracle.
    ///
    /// `parameters` is `None` when the operation takes no arguments.
    pub fn to_function_spec(&self) -> CatalogResult<FunctionSpec> {
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();

        if let Some(url_params) = self.url_params() {
            properties.extend(url_params.properties);
            push_unique(&mut required, url_params.required);
        }

        if let Some(body_params) = self.body_params()? {
            properties.extend(body_params.properties);
            push_unique(&mut required, body_params.required);
        }

        let parameters = if properties.is_empty() {
            None
        } else {
            Some(ParameterSchema {
                schema_type: "object".to_string(),
                properties,
                required,
            })
        };

        Ok(FunctionSpec {
            name: sanitize_function_name(self.operation_id()),
            description: self.summary(),
            parameters,
        })
    }

    /// Check the parts of the operation that can make it unusable
    pub fn validate(&self) -> CatalogResult<()> {
        self.body_schema().map(|_| ())
    }

    /// Compute auth headers by trying each scheme in order.
    ///
    /// The first scheme producing headers wins. When every scheme fails the
    /// first error is returned.
    pub fn compute_auth(&self, credentials: &Credentials) -> CatalogResult<Headers> {
        let mut first_error = None;
        let mut succeeded = false;

        for scheme in &self.securities {
            match scheme.auth_headers(credentials) {
                Ok(headers) if !headers.is_empty() => return Ok(headers),
                Ok(_) => succeeded = true,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) if !succeeded => Err(e),
            _ => Ok(Headers::new()),
        }
    }

    /// Build the request for the given arguments without sending it
    pub fn prepare_request(
        &self,
        args: &Map<String, Value>,
        headers: &Headers,
        credentials: Option<&Credentials>,
    ) -> CatalogResult<HttpRequest> {
        let credentials = match credentials {
            Some(creds) => creds.merged_over(self.static_auth.as_ref()),
            None => self.static_auth.clone().unwrap_or_default(),
        };

        let mut request_headers = self.content_type_header()?;
        merge_headers(&mut request_headers, &self.compute_auth(&credentials)?);
        merge_headers(&mut request_headers, headers);

        let body = if self.method.allows_body() {
            Some(Value::Object(self.select_body(args)?))
        } else {
            None
        };

        Ok(HttpRequest {
            url: self.url(Some(args)),
            method: self.method,
            headers: request_headers,
            body,
        })
    }

    /// Run the operation against the target API
    pub async fn execute(
        &self,
        transport: &dyn HttpTransport,
        args: &Map<String, Value>,
        headers: &Headers,
        credentials: Option<&Credentials>,
    ) -> CatalogResult<Exchange> {
        let request = self.prepare_request(args, headers, credentials)?;

        let body_keys = request
            .body
            .as_ref()
            .and_then(Value::as_object)
            .map(|b| b.keys().collect::<Vec<_>>());
        info!(
            "Executing {} {} with body: {:?}",
            request.method, request.url, body_keys
        );

        let response = transport.send(&request).await?;
        debug!("{} answered with status {}", self.operation_id(), response.status);

        Ok(Exchange { request, response })
    }

    /// Parameters declared on the operation (path-level ones are merged in at compile time)
    fn declared_parameters(&self) -> Vec<RawParameter> {
        self.details
            .get("parameters")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|p| serde_json::from_value::<RawParameter>(p.clone()).ok())
                    .filter(|p| !p.name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parameters carried in the URL (path and query)
    fn url_params(&self) -> Option<ParameterSchema> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in self.declared_parameters() {
            if !matches!(
                param.location(),
                Some(ParameterLocation::Path | ParameterLocation::Query)
            ) {
                continue;
            }

            let mut prop = Map::new();
            if let Some(schema_type) = param.schema.as_ref().and_then(|s| s.get("type")) {
                prop.insert("type".to_string(), schema_type.clone());
            }
            if let Some(description) = &param.description {
                prop.insert("description".to_string(), Value::String(description.clone()));
            }

            if param.required {
                required.push(param.name.clone());
            }
            properties.insert(param.name, Value::Object(prop));
        }

        if properties.is_empty() {
            None
        } else {
            Some(ParameterSchema {
                schema_type: "object".to_string(),
                properties,
                required,
            })
        }
    }

    /// The `application/json` request body schema, if there is a non-empty one
    fn body_schema(&self) -> CatalogResult<Option<&Map<String, Value>>> {
        let Some(content) = self
            .details
            .pointer("/requestBody/content")
            .and_then(Value::as_object)
        else {
            return Ok(None);
        };

        if content.is_empty() {
            return Ok(None);
        }

        match content.get(JSON_MEDIA_TYPE) {
            Some(media) => Ok(media
                .get("schema")
                .and_then(Value::as_object)
                .filter(|schema| !schema.is_empty())),
            None => Err(unsupported_media_type()),
        }
    }

    /// Body properties with per-property `required: true` markers promoted
    /// into the schema-level required list
    fn body_params(&self) -> CatalogResult<Option<ParameterSchema>> {
        let Some(schema) = self.body_schema()? else {
            return Ok(None);
        };

        let mut properties = Map::new();
        let mut required = Vec::new();

        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                let mut prop = prop.clone();
                if let Some(obj) = prop.as_object_mut() {
                    // Only the boolean marker; a nested object's `required` list stays
                    if let Some(marker) = obj.get("required").and_then(Value::as_bool) {
                        obj.remove("required");
                        if marker {
                            required.push(name.clone());
                        }
                    }
                }
                properties.insert(name.clone(), prop);
            }
        }

        if let Some(schema_required) = schema.get("required").and_then(Value::as_array) {
            let names = schema_required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            push_unique(&mut required, names);
        }

        Ok(Some(ParameterSchema {
            schema_type: "object".to_string(),
            properties,
            required,
        }))
    }

    /// Keep only arguments that belong in the body
    fn select_body(&self, args: &Map<String, Value>) -> CatalogResult<Map<String, Value>> {
        let Some(body_params) = self.body_params()? else {
            return Ok(Map::new());
        };

        Ok(args
            .iter()
            .filter(|(key, value)| !value.is_null() && body_params.properties.contains_key(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn content_type_header(&self) -> CatalogResult<Headers> {
        let request_body = self.details.get("requestBody");
        let is_json = request_body
            .and_then(|body| body.get("content"))
            .and_then(Value::as_object)
            .map_or(true, |content| content.is_empty() || content.contains_key(JSON_MEDIA_TYPE));

        if request_body.is_none() || is_json {
            let mut headers = Headers::new();
            headers.insert("Content-Type".to_string(), JSON_MEDIA_TYPE.to_string());
            Ok(headers)
        } else {
            Err(unsupported_media_type())
        }
    }
}

fn unsupported_media_type() -> CatalogError {
    CatalogError::UnsupportedMediaType(
        "Only \"application/json\" requestBody type is currently supported.".to_string(),
    )
}

fn strip_trailing_period(text: &str) -> &str {
    text.strip_suffix('.').unwrap_or(text)
}

fn push_unique(target: &mut Vec<String>, names: Vec<String>) {
    for name in names {
        if !target.contains(&name) {
            target.push(name);
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with an underscore
fn sanitize_function_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn percent_encode_path_param(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    let _ = write!(&mut encoded, "%{byte:02X}");
                }
            }
        }
    }
    encoded
}
