//! Postman collection (v2.0/v2.1) to OpenAPI 3.0 conversion

use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CatalogError, CatalogResult};
use crate::types::HttpMethod;

const POSTMAN_SCHEMA_HOST: &str = "schema.getpostman.com";
const OPENAPI_VERSION: &str = "3.0.3";

/// True when the document root carries a Postman collection identifier
pub fn is_collection(document: &Value) -> bool {
    let Some(info) = document.get("info") else {
        return false;
    };

    info.get("_postman_id").is_some()
        || info
            .get("schema")
            .and_then(Value::as_str)
            .is_some_and(|schema| schema.contains(POSTMAN_SCHEMA_HOST))
}

/// Convert a Postman collection into an equivalent OpenAPI document
pub fn convert(collection: &Value) -> CatalogResult<Value> {
    let info = collection
        .get("info")
        .ok_or_else(|| CatalogError::MissingField("info".to_string()))?;
    let title = info
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CatalogError::MissingField("info.name".to_string()))?;

    let mut converter = Converter {
        variables: collection_variables(collection),
        server: None,
        paths: Map::new(),
        security_schemes: Map::new(),
        operation_ids: HashSet::new(),
    };

    let security = collection
        .get("auth")
        .and_then(|auth| converter.convert_auth(auth));

    let mut requests = Vec::new();
    flatten_items(collection.get("item"), &mut requests);
    for item in requests {
        converter.add_request(item);
    }

    let mut openapi_info = json!({"title": title, "version": "1.0.0"});
    if let Some(description) = description_text(info.get("description")) {
        openapi_info["description"] = Value::String(description);
    }

    let mut document = json!({
        "openapi": OPENAPI_VERSION,
        "info": openapi_info,
        "paths": Value::Object(converter.paths),
    });

    if let Some(server) = converter.server {
        document["servers"] = json!([{"url": server}]);
    }
    if !converter.security_schemes.is_empty() {
        document["components"] = json!({"securitySchemes": Value::Object(converter.security_schemes)});
    }
    if let Some(requirement) = security {
        document["security"] = requirement;
    }

    Ok(document)
}

struct Converter {
    variables: Map<String, Value>,
    server: Option<String>,
    paths: Map<String, Value>,
    security_schemes: Map<String, Value>,
    operation_ids: HashSet<String>,
}

impl Converter {
    fn add_request(&mut self, item: &Value) {
        let Some(request) = item.get("request") else {
            return;
        };
        let name = item.get("name").and_then(Value::as_str).unwrap_or("request");

        // A request may be a bare URL string, which implies GET
        let (method, url) = match request {
            Value::String(url) => (HttpMethod::Get, Value::String(url.clone())),
            _ => {
                let method = request
                    .get("method")
                    .and_then(Value::as_str)
                    .and_then(HttpMethod::parse)
                    .unwrap_or(HttpMethod::Get);
                (method, request.get("url").cloned().unwrap_or(Value::Null))
            }
        };

        let Some(raw_url) = raw_url(&url) else {
            warn!("Skipping Postman request '{}' without a URL", name);
            return;
        };

        let (server, raw_path) = self.split_url(&raw_url);
        if self.server.is_none() {
            self.server = server;
        }
        let (path, path_params) = normalize_path(&raw_path);

        let mut operation = Map::new();
        operation.insert("summary".to_string(), Value::String(name.to_string()));
        operation.insert(
            "operationId".to_string(),
            Value::String(self.unique_operation_id(name)),
        );
        if let Some(description) = description_text(request.get("description")) {
            operation.insert("description".to_string(), Value::String(description));
        }

        if !path_params.is_empty() {
            let params: Vec<Value> = path_params
                .iter()
                .map(|param| {
                    let mut value = json!({
                        "name": param,
                        "in": "path",
                        "required": true,
                        "schema": {"type": "string"}
                    });
                    if let Some(description) = variable_description(&url, param) {
                        value["description"] = Value::String(description);
                    }
                    value
                })
                .collect();
            operation.insert("parameters".to_string(), Value::Array(params));
        }

        if let Some(body) = request.get("body").and_then(|body| json_body(name, body)) {
            operation.insert(
                "requestBody".to_string(),
                json!({"content": {"application/json": {"schema": infer_schema(&body)}}}),
            );
        }

        if let Some(auth) = request.get("auth") {
            if let Some(requirement) = self.convert_auth(auth) {
                operation.insert("security".to_string(), requirement);
            }
        }

        operation.insert(
            "responses".to_string(),
            json!({"default": {"description": "Response"}}),
        );

        let path_item = self
            .paths
            .entry(path.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let method_key = method.as_str().to_lowercase();
        if let Some(path_item) = path_item.as_object_mut() {
            if path_item.contains_key(&method_key) {
                warn!("Duplicate Postman request {} {}; keeping the first", method, path);
            } else {
                path_item.insert(method_key, Value::Object(operation));
            }
        }
    }

    /// Split a raw Postman URL into an optional server and the path part
    fn split_url(&self, raw: &str) -> (Option<String>, String) {
        let raw = raw.split(['?', '#']).next().unwrap_or_default();

        if let Some(rest) = raw.strip_prefix("{{") {
            if let Some((variable, path)) = rest.split_once("}}") {
                let server = self
                    .variables
                    .get(variable)
                    .and_then(Value::as_str)
                    .filter(|value| !value.is_empty())
                    .map(|value| value.trim_end_matches('/').to_string());
                return (server, path.to_string());
            }
        }

        if let Ok(url) = Url::parse(raw) {
            if url.has_host() {
                let server = url.origin().ascii_serialization();
                let path = raw
                    .split_once("://")
                    .and_then(|(_, rest)| rest.find('/').map(|idx| rest[idx..].to_string()))
                    .unwrap_or_default();
                return (Some(server), path);
            }
        }

        // Host without scheme, e.g. "api.example.com/pets"
        match raw.find('/') {
            Some(idx) if idx > 0 => (Some(format!("https://{}", &raw[..idx])), raw[idx..].to_string()),
            _ => (None, raw.to_string()),
        }
    }

    /// Register the scheme behind a Postman auth block and return its requirement list
    fn convert_auth(&mut self, auth: &Value) -> Option<Value> {
        let auth_type = auth.get("type").and_then(Value::as_str)?;

        let (name, scheme) = match auth_type {
            "noauth" => return Some(json!([])),
            "bearer" => ("bearerAuth", json!({"type": "http", "scheme": "bearer"})),
            "basic" => ("basicAuth", json!({"type": "http", "scheme": "basic"})),
            "apikey" => {
                let fields = auth.get("apikey");
                let header = auth_field(fields, "key").unwrap_or_else(|| "X-Api-Key".to_string());
                let location = auth_field(fields, "in").unwrap_or_else(|| "header".to_string());
                ("apiKeyAuth", json!({"type": "apiKey", "in": location, "name": header}))
            }
            other => {
                warn!("Postman auth type '{}' has no OpenAPI equivalent; ignoring", other);
                return None;
            }
        };

        self.security_schemes.insert(name.to_string(), scheme);

        let mut requirement = Map::new();
        requirement.insert(name.to_string(), json!([]));
        Some(Value::Array(vec![Value::Object(requirement)]))
    }

    fn unique_operation_id(&mut self, name: &str) -> String {
        let base: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let base = if base.is_empty() { "request".to_string() } else { base };

        let mut candidate = base.clone();
        let mut suffix = 2;
        while !self.operation_ids.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        candidate
    }
}

/// Collect request items depth-first, flattening folders
fn flatten_items<'a>(items: Option<&'a Value>, out: &mut Vec<&'a Value>) {
    let Some(items) = items.and_then(Value::as_array) else {
        return;
    };

    for item in items {
        if item.get("request").is_some() {
            out.push(item);
        } else {
            flatten_items(item.get("item"), out);
        }
    }
}

fn collection_variables(collection: &Value) -> Map<String, Value> {
    collection
        .get("variable")
        .and_then(Value::as_array)
        .map(|vars| {
            vars.iter()
                .filter_map(|var| {
                    let key = var.get("key").and_then(Value::as_str)?;
                    Some((key.to_string(), var.get("value").cloned().unwrap_or(Value::Null)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Postman descriptions are either plain strings or `{content, type}` objects
fn description_text(description: Option<&Value>) -> Option<String> {
    match description? {
        Value::String(text) => Some(text.clone()),
        other => other.get("content").and_then(Value::as_str).map(str::to_string),
    }
}

fn raw_url(url: &Value) -> Option<String> {
    match url {
        Value::String(raw) if !raw.is_empty() => Some(raw.clone()),
        Value::Object(obj) => {
            if let Some(raw) = obj.get("raw").and_then(Value::as_str) {
                return Some(raw.to_string());
            }

            let host = join_parts(obj.get("host"), ".")?;
            let path = join_parts(obj.get("path"), "/").unwrap_or_default();
            let protocol = obj.get("protocol").and_then(Value::as_str);
            Some(match protocol {
                Some(protocol) => format!("{}://{}/{}", protocol, host, path),
                None => format!("{}/{}", host, path),
            })
        }
        _ => None,
    }
}

fn join_parts(parts: Option<&Value>, separator: &str) -> Option<String> {
    match parts? {
        Value::String(part) => Some(part.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.clone()),
                    other => other.get("value").and_then(Value::as_str).map(str::to_string),
                })
                .collect::<Vec<_>>()
                .join(separator),
        ),
        _ => None,
    }
}

/// Turn `:id` and `{{id}}` segments into OpenAPI `{id}` placeholders
fn normalize_path(raw_path: &str) -> (String, Vec<String>) {
    let mut params = Vec::new();

    let segments: Vec<String> = raw_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let variable = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")));
            match variable {
                Some(name) if !name.is_empty() => {
                    params.push(name.to_string());
                    format!("{{{}}}", name)
                }
                _ => segment.to_string(),
            }
        })
        .collect();

    (format!("/{}", segments.join("/")), params)
}

fn variable_description(url: &Value, param: &str) -> Option<String> {
    url.get("variable")
        .and_then(Value::as_array)?
        .iter()
        .find(|var| var.get("key").and_then(Value::as_str) == Some(param))
        .and_then(|var| description_text(var.get("description")))
}

fn auth_field(fields: Option<&Value>, key: &str) -> Option<String> {
    fields
        .and_then(Value::as_array)?
        .iter()
        .find(|field| field.get("key").and_then(Value::as_str) == Some(key))
        .and_then(|field| field.get("value").and_then(Value::as_str))
        .map(str::to_string)
}

/// Parse a raw JSON body; other body modes are not representable
fn json_body(name: &str, body: &Value) -> Option<Value> {
    let mode = body.get("mode").and_then(Value::as_str).unwrap_or_default();
    if mode != "raw" {
        debug!("Dropping '{}' body of Postman request '{}'", mode, name);
        return None;
    }

    let raw = body.get("raw").and_then(Value::as_str)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => {
            debug!("Raw body of Postman request '{}' is not a JSON object", name);
            None
        }
    }
}

/// Infer a JSON schema from an example value
fn infer_schema(example: &Value) -> Value {
    match example {
        Value::Object(obj) => {
            let properties: Map<String, Value> = obj
                .iter()
                .map(|(key, value)| (key.clone(), infer_schema(value)))
                .collect();
            json!({"type": "object", "properties": properties})
        }
        Value::Array(items) => match items.first() {
            Some(first) => json!({"type": "array", "items": infer_schema(first)}),
            None => json!({"type": "array", "items": {}}),
        },
        Value::String(_) => json!({"type": "string"}),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({"type": "integer"}),
        Value::Number(_) => json!({"type": "number"}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Null => json!({}),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn petstore_collection() -> Value {
        json!({
            "info": {
                "_postman_id": "8b3c5a8e-1f0e-4c5e-9d61-2b7f4f0d5c11",
                "name": "Petstore",
                "description": "Pets as a collection",
                "schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"
            },
            "auth": {"type": "bearer", "bearer": [{"key": "token", "value": "{{token}}", "type": "string"}]},
            "variable": [{"key": "baseUrl", "value": "http://petstore.swagger.io/v1/"}],
            "item": [
                {
                    "name": "pets",
                    "item": [
                        {
                            "name": "List all pets",
                            "request": {"method": "GET", "url": {
                                "raw": "{{baseUrl}}/pets?limit=10",
                                "host": ["{{baseUrl}}"],
                                "path": ["pets"]
                            }}
                        },
                        {
                            "name": "Create a pet",
                            "request": {
                                "method": "POST",
                                "url": "{{baseUrl}}/pets",
                                "body": {"mode": "raw", "raw": "{\"name\": \"Sticky\", \"age\": 2, \"tags\": [\"a\"]}"}
                            }
                        }
                    ]
                },
                {
                    "name": "Info for a specific pet",
                    "request": {
                        "method": "GET",
                        "auth": {"type": "apikey", "apikey": [
                            {"key": "key", "value": "X-Api-Key"},
                            {"key": "in", "value": "header"}
                        ]},
                        "url": {
                            "raw": "{{baseUrl}}/pets/:petId",
                            "variable": [{"key": "petId", "description": "The id of the pet"}]
                        }
                    }
                }
            ]
        })
    }

    #[test]
    fn test_detects_collections() {
        assert!(is_collection(&petstore_collection()));
        assert!(is_collection(&json!({"info": {
            "name": "x",
            "schema": "https://schema.getpostman.com/json/collection/v2.0.0/collection.json"
        }})));
        assert!(!is_collection(&json!({"openapi": "3.0.0", "info": {"title": "x"}})));
    }

    #[test]
    fn test_converts_requests_in_order() {
        let doc = convert(&petstore_collection()).unwrap();

        assert_eq!(doc["openapi"], OPENAPI_VERSION);
        assert_eq!(doc["info"]["title"], "Petstore");
        assert_eq!(doc["info"]["description"], "Pets as a collection");
        assert_eq!(doc["servers"][0]["url"], "http://petstore.swagger.io/v1");

        let paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
        assert_eq!(paths, vec!["/pets", "/pets/{petId}"]);

        assert_eq!(doc["paths"]["/pets"]["get"]["summary"], "List all pets");
        assert_eq!(doc["paths"]["/pets"]["get"]["operationId"], "List_all_pets");
        assert_eq!(doc["paths"]["/pets"]["post"]["summary"], "Create a pet");
    }

    #[test]
    fn test_infers_body_schema() {
        let doc = convert(&petstore_collection()).unwrap();
        let schema = &doc["paths"]["/pets"]["post"]["requestBody"]["content"]["application/json"]["schema"];

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["name"]["type"], "string");
        assert_eq!(schema["properties"]["age"]["type"], "integer");
        assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
    }

    #[test]
    fn test_path_variables_and_auth() {
        let doc = convert(&petstore_collection()).unwrap();
        let show = &doc["paths"]["/pets/{petId}"]["get"];

        assert_eq!(show["parameters"][0]["name"], "petId");
        assert_eq!(show["parameters"][0]["in"], "path");
        assert_eq!(show["parameters"][0]["description"], "The id of the pet");
        assert_eq!(show["security"], json!([{"apiKeyAuth": []}]));

        assert_eq!(doc["security"], json!([{"bearerAuth": []}]));
        assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
        assert_eq!(doc["components"]["securitySchemes"]["apiKeyAuth"]["name"], "X-Api-Key");
    }

    #[test]
    fn test_absolute_urls_and_duplicate_names() {
        let collection = json!({
            "info": {"_postman_id": "1", "name": "Users"},
            "item": [
                {"name": "Get user", "request": {"method": "GET", "url": "https://api.example.com/users/{{userId}}?x=1"}},
                {"name": "Get user", "request": {"method": "DELETE", "url": "https://api.example.com/users/{{userId}}"}},
                {"name": "No auth", "request": {"method": "GET", "auth": {"type": "noauth"}, "url": "https://api.example.com/health"}}
            ]
        });

        let doc = convert(&collection).unwrap();
        assert_eq!(doc["servers"][0]["url"], "https://api.example.com");

        let user = &doc["paths"]["/users/{userId}"];
        assert_eq!(user["get"]["operationId"], "Get_user");
        assert_eq!(user["delete"]["operationId"], "Get_user_2");
        assert_eq!(user["get"]["parameters"][0]["name"], "userId");

        assert_eq!(doc["paths"]["/health"]["get"]["security"], json!([]));
        assert!(doc.get("components").is_none());
    }

    #[test]
    fn test_missing_name_is_an_error() {
        let err = convert(&json!({"info": {"_postman_id": "1"}})).unwrap_err();
        assert!(matches!(err, CatalogError::MissingField(_)));
    }
}
