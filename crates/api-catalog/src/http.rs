//! HTTP transport for executing operations

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::types::{Headers, HttpMethod};

/// A fully prepared request for one operation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Response returned by the target API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    pub headers: Headers,
    pub status: u16,
    pub body: Value,
}

/// Request/response pair produced by [`crate::Operation::execute`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

/// Sends prepared requests to the target API
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Transport failures are returned as [`CatalogError::Transport`].
    async fn send(&self, request: &HttpRequest) -> CatalogResult<HttpResponse>;
}

/// Overlay `overlay` onto `target`. Header names compare case-insensitively
/// and the overlay wins on conflict.
pub fn merge_headers(target: &mut Headers, overlay: &Headers) {
    for (name, value) in overlay {
        target.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        target.insert(name.clone(), value.clone());
    }
}

/// [`HttpTransport`] backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with no request timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that aborts requests after `timeout`
    pub fn with_timeout(timeout: Duration) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Transport(Box::new(e)))?;
        Ok(Self { client })
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Trace => reqwest::Method::TRACE,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> CatalogResult<HttpResponse> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CatalogError::Transport(Box::new(e)))?;

        let status = response.status().as_u16();
        let headers = response_headers(response.headers());

        let text = response
            .text()
            .await
            .map_err(|e| CatalogError::Transport(Box::new(e)))?;

        debug!("Response status: {}", status);

        Ok(HttpResponse {
            headers,
            status,
            body: response_body(text),
        })
    }
}

/// Fold response headers; repeated names are joined with `", "`
fn response_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let Ok(value) = value.to_str() else { continue };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}

/// JSON when it parses, the raw text otherwise, `null` when empty
fn response_body(text: String) -> Value {
    if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port and return its base URL
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn get(url: String) -> HttpRequest {
        HttpRequest {
            url,
            method: HttpMethod::Get,
            headers: Headers::new(),
            body: None,
        }
    }

    #[test]
    fn test_response_body_fallbacks() {
        assert_eq!(response_body(r#"{"id": 1}"#.to_string()), json!({"id": 1}));
        assert_eq!(response_body("[1, 2]".to_string()), json!([1, 2]));
        assert_eq!(response_body("pong".to_string()), json!("pong"));
        assert_eq!(response_body("{broken".to_string()), json!("{broken"));
        assert_eq!(response_body(String::new()), Value::Null);
        assert_eq!(response_body(" \n".to_string()), Value::Null);
    }

    #[test]
    fn test_repeated_response_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));
        map.insert("content-type", HeaderValue::from_static("text/plain"));

        let headers = response_headers(&map);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["set-cookie"], "a=1, b=2");
        assert_eq!(headers["content-type"], "text/plain");
    }

    #[tokio::test]
    async fn test_reqwest_transport_maps_json_response() {
        let base = serve_once(
            "HTTP/1.1 201 Created\r\n\
             Content-Type: application/json\r\n\
             X-Tag: one\r\n\
             X-Tag: two\r\n\
             Content-Length: 24\r\n\
             Connection: close\r\n\r\n\
             {\"id\": 1, \"name\": \"Sky\"}",
        )
        .await;

        let response = ReqwestTransport::new()
            .send(&get(format!("{}/pets", base)))
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, json!({"id": 1, "name": "Sky"}));
        assert_eq!(response.headers["x-tag"], "one, two");
    }

    #[tokio::test]
    async fn test_reqwest_transport_keeps_text_and_empty_bodies() {
        let base = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: 4\r\n\
             Connection: close\r\n\r\n\
             oops",
        )
        .await;
        let response = ReqwestTransport::new().send(&get(base)).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.body, json!("oops"));

        let base = serve_once(
            "HTTP/1.1 204 No Content\r\n\
             Connection: close\r\n\r\n",
        )
        .await;
        let response = ReqwestTransport::new().send(&get(base)).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ReqwestTransport::new()
            .send(&get(format!("http://{}/", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Transport(_)));
    }

    #[test]
    fn test_merge_headers_overlay_wins_case_insensitively() {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Authorization".to_string(), "Bearer a".to_string());

        let mut overlay = Headers::new();
        overlay.insert("authorization".to_string(), "Bearer b".to_string());
        overlay.insert("X-Trace".to_string(), "1".to_string());

        merge_headers(&mut headers, &overlay);

        assert_eq!(headers.len(), 3);
        assert_eq!(headers["authorization"], "Bearer b");
        assert!(!headers.contains_key("Authorization"));
        assert_eq!(headers["X-Trace"], "1");
    }

    #[test]
    fn test_request_serializes_without_absent_body() {
        let request = HttpRequest {
            url: "http://petstore.swagger.io/v1/pets".to_string(),
            method: HttpMethod::Get,
            headers: Headers::new(),
            body: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "get");
        assert!(value.get("body").is_none());
    }
}
