use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backends::circuit_breaker::CircuitBreakerService;
use crate::backends::stub::{CountingService, FailingService};
use crate::config::{Route, ServiceConfig, ServiceMap, ServiceType};
use crate::engine::{Engine, Reply};
use crate::errors::{EngineError, ServiceError};
use crate::state::{ManualClock, SharedState};

/// Integration tests for the dispatch engine using stub and built-in services
#[cfg(test)]
mod tests {
    use super::*;

    fn routes(value: Value) -> Vec<Route> {
        serde_json::from_value(value).unwrap()
    }

    struct Fixture {
        services: Arc<ServiceMap>,
        counters: Vec<(String, Arc<AtomicUsize>)>,
    }

    impl Fixture {
        fn calls(&self, name: &str) -> usize {
            self.counters
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, c)| c.load(Ordering::SeqCst))
                .unwrap()
        }
    }

    fn fixture(counting: &[&str]) -> Fixture {
        let mut services = ServiceMap::new();
        let mut counters = Vec::new();
        for name in counting {
            let svc = CountingService::new(*name);
            counters.push((name.to_string(), svc.counter()));
            services.insert(name.to_string(), Box::new(svc));
        }
        services.insert("Broken".to_string(), Box::new(FailingService::new("Broken")));
        Fixture {
            services: Arc::new(services),
            counters,
        }
    }

    fn engine() -> Engine {
        let mut env = Map::new();
        env.insert("STAGE".to_string(), json!("test"));
        Engine::new(env)
    }

    #[tokio::test]
    async fn test_first_matching_route_wins() {
        let fx = fixture(&["A", "B", "C"]);
        let routes = routes(json!([
            {"if": "${payload.kind == 'x'}", "steps": [{"service": "A"}], "responses": [{"output": {"code": 201, "data": "x"}}]},
            {"if": "${payload.kind == 'y'}", "steps": [{"service": "B"}], "responses": [{"output": {"code": 202, "data": "y"}}]},
            {"steps": [{"service": "C"}], "responses": [{"output": {"code": 203, "data": "fallback"}}]}
        ]));

        let reply = engine()
            .execute(json!({"kind": "y"}), &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.code, 202);
        assert_eq!(reply.data, json!("y"));
        assert_eq!((fx.calls("A"), fx.calls("B"), fx.calls("C")), (0, 1, 0));

        let reply = engine()
            .execute(json!({"kind": "z"}), &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.data, json!("fallback"));
        assert_eq!(fx.calls("C"), 1);
    }

    #[tokio::test]
    async fn test_route_with_failing_condition_is_skipped() {
        let fx = fixture(&["A", "B"]);
        let routes = routes(json!([
            {"if": "${payload.missing.deeper == 1}", "steps": [{"service": "A"}]},
            {"if": "${payload.count}", "steps": [{"service": "A"}]},
            {"steps": [{"service": "B"}], "responses": [{"output": {"code": 200, "data": "${env.STAGE}"}}]}
        ]));

        let reply = engine()
            .execute(json!({"count": 3}), &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.data, json!("test"));
        assert_eq!((fx.calls("A"), fx.calls("B")), (0, 1));
    }

    #[tokio::test]
    async fn test_no_matching_route_means_no_reply() {
        let fx = fixture(&["A"]);
        let routes = routes(json!([
            {"if": "${payload.go}", "steps": [{"service": "A"}], "responses": [{"output": {"code": 200}}]}
        ]));

        let reply = engine()
            .execute(json!({"go": false}), &routes, &fx.services)
            .await
            .unwrap();

        assert_eq!(reply, None);
        assert_eq!(fx.calls("A"), 0);

        let reply = engine().execute(Value::Null, &[], &fx.services).await.unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_skipped_steps_are_not_invoked() {
        let fx = fixture(&["A", "B", "C"]);
        let routes = routes(json!([{
            "steps": [
                {"service": "A"},
                {"if": "${payload.flag}", "service": "B"},
                {"if": "${!payload.flag}", "service": "C"}
            ],
            "responses": [{"output": {"code": 200}}]
        }]));

        engine()
            .execute(json!({"flag": false}), &routes, &fx.services)
            .await
            .unwrap();

        assert_eq!((fx.calls("A"), fx.calls("B"), fx.calls("C")), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_step_outputs_feed_later_steps_and_responses() {
        let fx = fixture(&["A", "B"]);
        let routes = routes(json!([{
            "steps": [
                {"service": "A", "input": {"user.name": "${payload.name}", "source": "gateway"}},
                {"if": "${A.response.calls == 1}", "service": "B", "input": {"greeting": "${A.response.echo.user.name}"}}
            ],
            "responses": [
                {"if": "${B.response == null}", "output": {"code": 500, "data": "B skipped"}},
                {"output": {"code": "${payload.code}", "data": {"first": "${A.response.echo}", "second.greeting": "${B.response.echo.greeting}"}}}
            ]
        }]));

        let reply = engine()
            .execute(json!({"name": "rex", "code": "201"}), &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            reply,
            Reply {
                code: 201,
                data: json!({
                    "first": {"user": {"name": "rex"}, "source": "gateway"},
                    "second": {"greeting": "rex"}
                }),
                error: false,
            }
        );
    }

    #[tokio::test]
    async fn test_repeated_service_accumulates_its_request() {
        let fx = fixture(&["A"]);
        let routes = routes(json!([{
            "steps": [
                {"service": "A", "input": {"a": 1}},
                {"service": "A", "input": {"b": 2}}
            ],
            "responses": [{"output": {"data": "${A.response}"}}]
        }]));

        let reply = engine()
            .execute(Value::Null, &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.data, json!({"calls": 2, "echo": {"a": 1, "b": 2}}));

        // The next event starts from a fresh fork.
        let reply = engine()
            .execute(Value::Null, &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.data["echo"], json!({"a": 1, "b": 2}));
        assert_eq!(reply.data["calls"], json!(4));
    }

    #[tokio::test]
    async fn test_output_code_defaults_to_200() {
        let fx = fixture(&[]);
        let cases = vec![
            (json!({}), 200),
            (json!({"code": 0}), 200),
            (json!({"code": "teapot"}), 200),
            (json!({"code": 418}), 418),
            (json!({"code": "${payload.status}"}), 404),
            (json!({"code": "${payload.nothing}"}), 200),
        ];

        for (output, expected) in cases {
            let routes = routes(json!([{"responses": [{"output": output.clone()}]}]));
            let reply = engine()
                .execute(json!({"status": 404}), &routes, &fx.services)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reply.code, expected, "{}", output);
        }
    }

    #[tokio::test]
    async fn test_step_error_with_matching_response_replies() {
        let fx = fixture(&["A", "B"]);
        let routes = routes(json!([{
            "steps": [{"service": "A"}, {"service": "Broken"}, {"service": "B"}],
            "responses": [{"error": true, "output": {"code": 502, "data": "upstream failed"}}]
        }]));

        let reply = engine()
            .execute(Value::Null, &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.code, 502);
        assert!(reply.error);
        assert_eq!((fx.calls("A"), fx.calls("B")), (1, 0));
    }

    #[tokio::test]
    async fn test_step_error_without_response_is_returned() {
        let fx = fixture(&["A"]);
        let routes = routes(json!([{
            "steps": [{"service": "Broken"}, {"service": "A"}],
            "responses": [{"if": "${false}", "output": {"code": 200}}]
        }]));

        let result = engine().execute(Value::Null, &routes, &fx.services).await;

        match result {
            Err(EngineError::StepFailed { step, service, source }) => {
                assert_eq!(step, 0);
                assert_eq!(service, "Broken");
                assert!(matches!(source, ServiceError::Flow { .. }));
            }
            other => panic!("expected a step failure, got {:?}", other),
        }
        assert_eq!(fx.calls("A"), 0);
    }

    #[tokio::test]
    async fn test_no_matching_response_means_no_reply() {
        let fx = fixture(&["A"]);
        let routes = routes(json!([{
            "steps": [{"service": "A"}],
            "responses": [{"if": "${payload.never}", "output": {"code": 200}}]
        }]));

        let reply = engine()
            .execute(json!({"never": false}), &routes, &fx.services)
            .await
            .unwrap();

        assert_eq!(reply, None);
        assert_eq!(fx.calls("A"), 1);
    }

    #[tokio::test]
    async fn test_mapping_errors_are_hard() {
        let fx = fixture(&["A"]);
        let step_input = routes(json!([{
            "steps": [{"service": "A", "input": {"x": "${payload.name.first}"}}],
            "responses": [{"output": {"code": 200}}]
        }]));
        let response_output = routes(json!([{
            "responses": [{"output": {"code": 200, "data": "${payload.name.first}"}}]
        }]));

        for routes in [step_input, response_output] {
            let result = engine()
                .execute(json!({"name": "rex"}), &routes, &fx.services)
                .await;
            assert!(matches!(result, Err(EngineError::Mapping(_))), "{:?}", result);
        }
        assert_eq!(fx.calls("A"), 0);
    }

    #[tokio::test]
    async fn test_unknown_service_is_reported() {
        let fx = fixture(&[]);
        let routes = routes(json!([{"steps": [{"service": "Ghost"}], "responses": [{"output": {}}]}]));

        let result = engine().execute(Value::Null, &routes, &fx.services).await;

        assert!(matches!(
            result,
            Err(EngineError::ServiceNotFound { step: 0, ref service }) if service == "Ghost"
        ));
    }

    #[tokio::test]
    async fn test_async_route_replies_before_steps_finish() {
        let mut services = ServiceMap::new();
        let slow = CountingService::new("Slow").with_delay(Duration::from_millis(50));
        let calls = slow.counter();
        services.insert("Slow".to_string(), Box::new(slow));
        let services = Arc::new(services);

        let routes = routes(json!([{
            "async": true,
            "steps": [{"service": "Slow", "input": {"id": "${payload.id}"}}],
            "responses": [
                {"if": "${async}", "output": {"code": 202, "data": {"accepted": "${payload.id}"}}},
                {"output": {"code": 200}}
            ]
        }]));

        let engine = engine();
        let reply = engine
            .execute(json!({"id": 9}), &routes, &services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.code, 202);
        assert_eq!(reply.data, json!({"accepted": 9}));

        engine.wait_detached().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.detached_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_route_sees_async_false() {
        let fx = fixture(&[]);
        let routes = routes(json!([{
            "responses": [
                {"if": "${async}", "output": {"code": 202}},
                {"if": "${async === false}", "output": {"code": 200}}
            ]
        }]));

        let reply = engine()
            .execute(Value::Null, &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.code, 200);
    }

    #[tokio::test]
    async fn test_detached_failure_is_only_logged() {
        let fx = fixture(&["A"]);
        let routes = routes(json!([{
            "async": true,
            "steps": [{"service": "Broken"}, {"service": "A"}],
            "responses": [{"output": {"code": 202}}]
        }]));

        let engine = engine();
        let reply = engine
            .execute(Value::Null, &routes, &fx.services)
            .await
            .unwrap()
            .unwrap();
        engine.wait_detached().await;

        assert_eq!(reply.code, 202);
        assert_eq!(fx.calls("A"), 0);

        // The tracker accepts new work after a wait.
        let reply = engine.execute(Value::Null, &routes, &fx.services).await.unwrap();
        engine.wait_detached().await;
        assert!(reply.is_some());
    }

    #[tokio::test]
    async fn test_tripped_breaker_selects_error_response() {
        let clock = Arc::new(ManualClock::new());
        let state = Arc::new(SharedState::new(clock.clone()).with_seed(7));
        let definition = ServiceConfig {
            name: "Breaker".to_string(),
            service_type: ServiceType::CircuitBreaker,
            description: None,
            settings: json!({"mode": "a", "threshold": 2, "timeout": 1000})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let mut services = ServiceMap::new();
        services.insert(
            "Breaker".to_string(),
            Box::new(CircuitBreakerService::from_config(&definition, state).unwrap()),
        );
        let services = Arc::new(services);

        let routes = routes(json!([{
            "steps": [{"service": "Breaker", "input": {"operation": "${payload.op}"}}],
            "responses": [
                {"if": "${Breaker.response.tripped}", "error": true, "output": {"code": 503, "data": "circuit open"}},
                {"output": {"code": 200, "data": "ok"}}
            ]
        }]));
        let engine = engine();

        let mut codes = Vec::new();
        for op in ["", "counter", "counter", ""] {
            let reply = engine
                .execute(json!({"op": op}), &routes, &services)
                .await
                .unwrap()
                .unwrap();
            codes.push(reply.code);
        }
        assert_eq!(codes, vec![200, 200, 503, 503]);

        clock.advance(Duration::from_millis(1001));
        let reply = engine
            .execute(json!({"op": ""}), &routes, &services)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.code, 200);
    }
}
