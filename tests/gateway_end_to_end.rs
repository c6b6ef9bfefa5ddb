// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Gateways warmed up from documents, run against stub backends.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use microgateway::backends::Collaborators;
use microgateway::config::{load_and_validate_config, parse_config, ConfigFormat};
use microgateway::state::{ManualClock, SharedState};
use microgateway::{GatewayRegistry, Reply, WarmGateway};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn warm(document: Value, collaborators: Collaborators) -> Arc<WarmGateway> {
    let cfg = parse_config(&document.to_string(), ConfigFormat::Json).unwrap();
    GatewayRegistry::new(collaborators).warm_up("test", &cfg).unwrap()
}

fn manual_state() -> (Arc<ManualClock>, Collaborators) {
    let clock = Arc::new(ManualClock::new());
    let state = Arc::new(SharedState::new(clock.clone()).with_seed(7));
    (clock, Collaborators::default().with_state(state))
}

#[tokio::test]
async fn test_http_step_body_becomes_reply() {
    let base = serve(Router::new().route("/ok", get(|| async { Json(json!({"ok": true})) }))).await;

    let document = format!(
        r#"
gateway:
  name: Single
  dispatches:
    - name: Call
      routes:
        - steps:
            - service: Backend
          responses:
            - output:
                code: 200
                data: "${{Backend.response.body}}"
  services:
    - name: Backend
      type: http
      settings:
        url: "{}"
        path: /ok
"#,
        base
    );
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("single.yaml");
    std::fs::write(&path, document).unwrap();

    let cfg = load_and_validate_config(&path).unwrap();
    let gateway = GatewayRegistry::new(Collaborators::default())
        .warm_up("single", &cfg)
        .unwrap();

    let reply = gateway.dispatch("Call", Value::Null).await.unwrap();

    assert_eq!(
        reply,
        Some(Reply {
            code: 200,
            data: json!({"ok": true}),
            error: false,
        })
    );
}

async fn gzipped_pet(Path(id): Path<u32>) -> impl IntoResponse {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(json!({"id": id, "name": "rex"}).to_string().as_bytes())
        .unwrap();
    (
        [
            (header::CONTENT_ENCODING, "gzip"),
            (header::CONTENT_TYPE, "application/json"),
        ],
        encoder.finish().unwrap(),
    )
}

#[tokio::test]
async fn test_gzipped_backend_with_path_params() {
    let base = serve(Router::new().route("/pet/{id}", get(gzipped_pet))).await;

    let gateway = warm(
        json!({"gateway": {
            "name": "Pets",
            "dispatches": [{
                "name": "Pet",
                "routes": [{
                    "steps": [{"service": "Store", "input": {"pathParams.id": "${payload.pathParams.petId}"}}],
                    "responses": [{"output": {
                        "code": "${Store.response.status}",
                        "data": {"pet": "${Store.response.body}", "encoding": "${Store.response.headers.content-encoding}"}
                    }}]
                }]
            }],
            "services": [{"name": "Store", "type": "http", "settings": {"url": base, "path": "/pet/:id"}}]
        }}),
        Collaborators::default(),
    );

    let reply = gateway
        .dispatch("Pet", json!({"pathParams": {"petId": 12}}))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reply.code, 200);
    assert_eq!(reply.data["pet"], json!({"id": 12, "name": "rex"}));
    assert_eq!(reply.data["encoding"], json!("gzip"));
}

async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "down"})))
}

#[tokio::test]
async fn test_breaker_opens_after_consecutive_failures() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(Router::new().route("/flaky", get(flaky)).with_state(hits.clone())).await;
    let (clock, collaborators) = manual_state();

    let gateway = warm(
        json!({"gateway": {
            "name": "Breaking",
            "dispatches": [{
                "name": "Call",
                "routes": [{
                    "steps": [
                        {"service": "Breaker", "input": {"operation": ""}},
                        {"service": "Backend"},
                        {"if": "${Backend.response.status >= 500}", "service": "Breaker", "input": {"operation": "counter"}}
                    ],
                    "responses": [
                        {"if": "${Breaker.response.tripped}", "error": true, "output": {"code": 503, "data": "circuit open"}},
                        {"output": {"code": "${Backend.response.status}", "data": "${Backend.response.body}"}}
                    ]
                }]
            }],
            "services": [
                {"name": "Breaker", "type": "circuitBreaker", "settings": {"mode": "a", "threshold": 2, "timeout": 1000}},
                {"name": "Backend", "type": "http", "settings": {"url": base, "path": "/flaky"}}
            ]
        }}),
        collaborators,
    );

    let mut codes = Vec::new();
    for _ in 0..3 {
        codes.push(gateway.dispatch("Call", Value::Null).await.unwrap().unwrap().code);
    }
    // The third event is refused before the backend is called.
    assert_eq!(codes, vec![500, 503, 503]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    clock.advance(Duration::from_millis(1001));
    let reply = gateway.dispatch("Call", Value::Null).await.unwrap().unwrap();
    assert_eq!(reply.code, 500);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rate_limit_per_token() {
    let (clock, collaborators) = manual_state();
    let gateway = warm(
        json!({"gateway": {
            "name": "Limited",
            "dispatches": [{
                "name": "Call",
                "routes": [{
                    "steps": [{"service": "Quota", "input": {"token": "${payload.user}"}}],
                    "responses": [
                        {"if": "${Quota.response.quotaExceeded}", "error": true, "output": {"code": 429}},
                        {"output": {"code": 200, "data": "${Quota.response.remaining}"}}
                    ]
                }]
            }],
            "services": [{"name": "Quota", "type": "rateLimiter", "settings": {"limit": "2-S"}}]
        }}),
        collaborators,
    );

    let mut codes = Vec::new();
    for user in ["a", "a", "a", "b"] {
        codes.push(gateway.dispatch("Call", json!({"user": user})).await.unwrap().unwrap().code);
    }
    assert_eq!(codes, vec![200, 200, 429, 200]);

    clock.advance(Duration::from_secs(1));
    let reply = gateway.dispatch("Call", json!({"user": "a"})).await.unwrap().unwrap();
    assert_eq!(reply.code, 200);
    assert_eq!(reply.data, json!(1));
}

#[tokio::test]
async fn test_jwt_guard() {
    let gateway = warm(
        json!({"gateway": {
            "name": "Tokens",
            "dispatches": [{
                "name": "Call",
                "routes": [{
                    "steps": [{"service": "Auth", "input": {"token": "${payload.authorization}"}}],
                    "responses": [
                        {"if": "${Auth.response.valid}", "output": {"code": 200, "data": "${Auth.response.claims.sub}"}},
                        {"error": true, "output": {"code": 401, "data": "${Auth.response.validationMessage}"}}
                    ]
                }]
            }],
            "services": [{"name": "Auth", "type": "jwt", "settings": {"signingMethod": "HMAC", "key": "s3cret", "aud": "pets"}}]
        }}),
        Collaborators::default(),
    );

    let sign = |claims: Value, secret: &str| {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    };
    let exp = 4_102_444_800u64; // 2100-01-01

    let good = sign(json!({"sub": "alice", "aud": "pets", "exp": exp}), "s3cret");
    let reply = gateway
        .dispatch("Call", json!({"authorization": format!("Bearer {}", good)}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((reply.code, reply.data), (200, json!("alice")));

    let bad = vec![
        sign(json!({"sub": "alice", "aud": "pets", "exp": exp}), "other"),
        sign(json!({"sub": "alice", "aud": "cats", "exp": exp}), "s3cret"),
        sign(json!({"sub": "alice", "aud": "pets", "exp": 1_000_000}), "s3cret"),
    ];
    for token in bad {
        let reply = gateway
            .dispatch("Call", json!({"authorization": token}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.code, 401);
        assert!(reply.error);
    }
}
