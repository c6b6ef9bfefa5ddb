// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outbound HTTP service.
//!
//! The request starts out as the service settings (`url`, `method`, `path`,
//! `headers`) and steps overlay `pathParams`, `queryParams`, `headers` and `body`.
//! Path segments of the form `:name` are substituted from `pathParams`.
//!
//! ```text
//! url  = http://petstore.example/v2
//! path = /pet/:petId            pathParams = { petId: 8 }
//!   →  GET http://petstore.example/v2/pet/8
//! ```

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, CONTENT_ENCODING};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::backends::{merge_request, parse_settings, value_to_text};
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::service::HttpRequestCompleted;
use crate::observability::messages::StructuredLog;
use crate::traits::Service;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpSettings {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    pub path_params: Map<String, Value>,
    pub query_params: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub body: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Map<String, Value>,
    pub body: Value,
}

pub struct HttpService {
    name: String,
    settings: Arc<HttpSettings>,
    client: reqwest::Client,
    request: HttpRequest,
    response: Option<HttpResponse>,
}

impl HttpService {
    pub fn from_config(definition: &ServiceConfig, client: &reqwest::Client) -> Result<Self, ConfigError> {
        let settings: HttpSettings = parse_settings(definition)?;
        let invalid = |reason: String| {
            ConfigError::invalid_settings(&definition.name, definition.service_type, reason)
        };

        Url::parse(&settings.url).map_err(|e| invalid(format!("url '{}': {}", settings.url, e)))?;
        if let Some(method) = &settings.method {
            parse_method(method).ok_or_else(|| invalid(format!("unsupported method '{}'", method)))?;
        }

        Ok(Self::with_settings(
            definition.name.clone(),
            Arc::new(settings),
            client.clone(),
        ))
    }

    fn with_settings(name: String, settings: Arc<HttpSettings>, client: reqwest::Client) -> Self {
        let request = HttpRequest {
            method: settings.method.clone().unwrap_or_else(|| "GET".to_string()),
            url: settings.url.clone(),
            path: settings.path.clone(),
            headers: settings.headers.clone(),
            ..Default::default()
        };

        Self {
            name,
            settings,
            client,
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Http
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let url = build_url(&self.name, &self.request)?;
        let method = parse_method(&self.request.method).ok_or_else(|| {
            ServiceError::invalid_request(&self.name, format!("unsupported method '{}'", self.request.method))
        })?;

        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in &self.request.headers {
            builder = builder.header(name.as_str(), value_to_text(value));
        }
        if let Some(ms) = self.settings.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        builder = match &self.request.body {
            Value::Null => builder,
            Value::String(text) => builder.body(text.clone()),
            other => builder.json(other),
        };

        let start = Instant::now();
        let http_error = |source| ServiceError::Http {
            url: url.to_string(),
            source,
        };
        let response = builder.send().await.map_err(http_error)?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let gzipped = is_gzipped(response.headers());
        let bytes = response.bytes().await.map_err(http_error)?;

        let raw = if gzipped {
            gunzip(&bytes).map_err(|source| ServiceError::Decompress {
                url: url.to_string(),
                source,
            })?
        } else {
            bytes.to_vec()
        };

        HttpRequestCompleted {
            service: &self.name,
            method: method.as_str(),
            url: url.as_str(),
            status,
            duration: start.elapsed(),
        }
        .log();

        self.response = Some(HttpResponse {
            status,
            headers,
            body: decode_body(&raw),
        });
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({
            "request": serde_json::to_value(&self.request).unwrap_or(Value::Null),
            "response": self.response.as_ref().map_or(Value::Null, |r| {
                serde_json::to_value(r).unwrap_or(Value::Null)
            }),
        })
    }

    fn fork(&self) -> Box<dyn Service> {
        Box::new(Self::with_settings(
            self.name.clone(),
            self.settings.clone(),
            self.client.clone(),
        ))
    }
}

fn parse_method(method: &str) -> Option<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).ok()
}

/// Join the base url and the substituted path, then append the query parameters.
fn build_url(service: &str, request: &HttpRequest) -> Result<Url, ServiceError> {
    let path = substitute_path(service, &request.path, &request.path_params)?;

    let joined = if path.is_empty() {
        request.url.clone()
    } else {
        format!(
            "{}/{}",
            request.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    let mut url = Url::parse(&joined)
        .map_err(|e| ServiceError::invalid_request(service, format!("url '{}': {}", joined, e)))?;

    if !request.query_params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &request.query_params {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.append_pair(name, &value_to_text(item));
                    }
                }
                other => {
                    pairs.append_pair(name, &value_to_text(other));
                }
            }
        }
    }

    Ok(url)
}

fn substitute_path(service: &str, path: &str, params: &Map<String, Value>) -> Result<String, ServiceError> {
    let segments = path
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => params
                .get(name)
                .filter(|value| !value.is_null())
                .map(value_to_text)
                .ok_or_else(|| {
                    ServiceError::invalid_request(service, format!("missing path parameter '{}'", name))
                }),
            None => Ok(segment.to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(segments.join("/"))
}

/// Response headers keyed by name; a header sent once is a string, repeated headers
/// are an array.
fn collect_headers(headers: &HeaderMap) -> Map<String, Value> {
    let mut collected = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| Value::String(v.to_string()))
            .collect();

        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        collected.insert(name.as_str().to_string(), value);
    }
    collected
}

fn is_gzipped(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false)
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// JSON when the body parses as JSON, otherwise the body as text. Empty is null.
fn decode_body(raw: &[u8]) -> Value {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Null;
    }
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::header;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::HashMap;
    use std::io::Write;

    fn service(settings: Value) -> HttpService {
        let definition = ServiceConfig {
            name: "Pets".to_string(),
            service_type: ServiceType::Http,
            description: None,
            settings: settings.as_object().cloned().unwrap(),
        };
        HttpService::from_config(&definition, &reqwest::Client::new()).unwrap()
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_build_url_substitutes_and_appends_query() {
        let request = HttpRequest {
            url: "http://petstore.example/v2/".to_string(),
            path: "/pet/:petId/tags/:tag".to_string(),
            path_params: json!({"petId": 8, "tag": "good dog"}).as_object().cloned().unwrap(),
            query_params: json!({"limit": 5, "status": ["a", "b"]}).as_object().cloned().unwrap(),
            ..Default::default()
        };

        let url = build_url("Pets", &request).unwrap();

        assert_eq!(url.path(), "/v2/pet/8/tags/good%20dog");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "5".to_string()),
                ("status".to_string(), "a".to_string()),
                ("status".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_path_param_is_invalid_request() {
        let request = HttpRequest {
            url: "http://petstore.example".to_string(),
            path: "/pet/:petId".to_string(),
            ..Default::default()
        };

        let err = build_url("Pets", &request).unwrap_err();
        assert!(err.to_string().contains("petId"), "{}", err);
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(b"{\"ok\":true}"), json!({"ok": true}));
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
    }

    #[test]
    fn test_settings_are_validated() {
        let definition = ServiceConfig {
            name: "Bad".to_string(),
            service_type: ServiceType::Http,
            description: None,
            settings: json!({"url": "not a url"}).as_object().cloned().unwrap(),
        };
        assert!(HttpService::from_config(&definition, &reqwest::Client::new()).is_err());
    }

    #[test]
    fn test_update_request_keeps_settings_defaults() {
        let mut svc = service(json!({"url": "http://localhost:1", "method": "post", "path": "/a/:id"}));
        svc.update_request(json!({"pathParams": {"id": 3}}).as_object().unwrap())
            .unwrap();

        assert_eq!(svc.request().method, "post");
        assert_eq!(svc.request().path, "/a/:id");
        assert_eq!(svc.request().path_params["id"], json!(3));
        assert_eq!(svc.snapshot()["response"], Value::Null);
    }

    #[tokio::test]
    async fn test_execute_against_stub_server() {
        let app = Router::new()
            .route(
                "/pet/{id}",
                get(|Path(id): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({"id": id, "q": q.get("q").cloned()}))
                }),
            )
            .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }));
        let base = serve(app).await;

        let mut svc = service(json!({"url": base, "path": "/pet/:id"}));
        svc.update_request(json!({"pathParams": {"id": 42}, "queryParams": {"q": "x"}}).as_object().unwrap())
            .unwrap();
        svc.execute().await.unwrap();

        let response = svc.response().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"id": "42", "q": "x"}));
        assert_eq!(response.headers["content-type"], json!("application/json"));

        let mut echo = service(json!({"url": base, "method": "POST", "path": "/echo"}));
        echo.update_request(json!({"body": {"name": "rex"}}).as_object().unwrap())
            .unwrap();
        echo.execute().await.unwrap();
        assert_eq!(echo.snapshot()["response"]["body"], json!({"name": "rex"}));
    }

    #[tokio::test]
    async fn test_gzip_body_is_decompressed() {
        let app = Router::new().route(
            "/zipped",
            get(|| async {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(br#"{"zipped":true}"#).unwrap();
                let bytes = encoder.finish().unwrap();
                (
                    [
                        (header::CONTENT_ENCODING, "gzip"),
                        (header::CONTENT_TYPE, "application/json"),
                    ],
                    bytes,
                )
            }),
        );
        let base = serve(app).await;

        let mut svc = service(json!({"url": base, "path": "/zipped"}));
        svc.execute().await.unwrap();

        assert_eq!(svc.response().unwrap().body, json!({"zipped": true}));
    }

    #[test]
    fn test_fork_starts_from_settings() {
        let mut svc = service(json!({"url": "http://localhost:1", "headers": {"x-api-key": "k"}}));
        svc.update_request(json!({"method": "DELETE"}).as_object().unwrap())
            .unwrap();

        let fork = svc.fork();
        assert_eq!(fork.snapshot()["request"]["method"], json!("GET"));
        assert_eq!(fork.snapshot()["request"]["headers"]["x-api-key"], json!("k"));
    }
}
