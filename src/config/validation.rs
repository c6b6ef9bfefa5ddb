// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural validation for gateway documents.
//!
//! Checks run in one pass and every problem is collected, so an author sees the
//! whole list at once:
//!
//! 1. **Uniqueness**: service, dispatch and trigger names are unique, and no service
//!    takes the name of a context binding (`payload`, `env`, `async`).
//! 2. **References**: every step names a defined service and every trigger handler
//!    names a defined dispatch.
//! 3. **Expressions**: every `${...}` in step inputs and response outputs parses,
//!    and every condition has balanced `${` / `}` markers.
//!
//! Unknown service types never reach this point; `ServiceType` is a closed enum and
//! such documents fail to parse.

use serde_json::Value;
use std::collections::HashSet;

use crate::config::consts::RESERVED_BINDINGS;
use crate::config::GatewayConfig;
use crate::errors::ValidationError;
use crate::mapping::{check_condition, parse_expression};

/// Validate a gateway document.
///
/// # Returns
///
/// * `Ok(())` - the document can be warmed up
/// * `Err(Vec<ValidationError>)` - every problem found
pub fn validate_gateway(cfg: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    errors.extend(validate_unique_names(cfg));
    errors.extend(validate_service_references(cfg));
    errors.extend(validate_dispatch_references(cfg));
    errors.extend(validate_expressions(cfg));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_unique_names(cfg: &GatewayConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for service in &cfg.services {
        if RESERVED_BINDINGS.contains(&service.name.as_str()) {
            errors.push(ValidationError::ReservedServiceName {
                name: service.name.clone(),
            });
        }
        if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService {
                name: service.name.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for dispatch in &cfg.dispatches {
        if !seen.insert(dispatch.name.as_str()) {
            errors.push(ValidationError::DuplicateDispatch {
                name: dispatch.name.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for trigger in &cfg.triggers {
        if !seen.insert(trigger.name.as_str()) {
            errors.push(ValidationError::DuplicateTrigger {
                name: trigger.name.clone(),
            });
        }
    }

    errors
}

fn validate_service_references(cfg: &GatewayConfig) -> Vec<ValidationError> {
    let services: HashSet<&str> = cfg.services.iter().map(|s| s.name.as_str()).collect();
    let mut errors = Vec::new();

    for dispatch in &cfg.dispatches {
        for (route_idx, route) in dispatch.routes.iter().enumerate() {
            for (step_idx, step) in route.steps.iter().enumerate() {
                if !services.contains(step.service.as_str()) {
                    errors.push(ValidationError::UnknownService {
                        dispatch: dispatch.name.clone(),
                        route: route_idx,
                        step: step_idx,
                        service: step.service.clone(),
                    });
                }
            }
        }
    }

    errors
}

fn validate_dispatch_references(cfg: &GatewayConfig) -> Vec<ValidationError> {
    let dispatches: HashSet<&str> = cfg.dispatches.iter().map(|d| d.name.as_str()).collect();
    let mut errors = Vec::new();

    for trigger in &cfg.triggers {
        for (handler_idx, handler) in trigger.handlers.iter().enumerate() {
            if !dispatches.contains(handler.dispatch.as_str()) {
                errors.push(ValidationError::UnknownDispatch {
                    trigger: trigger.name.clone(),
                    handler: handler_idx,
                    dispatch: handler.dispatch.clone(),
                });
            }
        }
    }

    errors
}

fn validate_expressions(cfg: &GatewayConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for dispatch in &cfg.dispatches {
        for (r, route) in dispatch.routes.iter().enumerate() {
            let at = |what: String| format!("dispatch '{}' route {} {}", dispatch.name, r, what);

            check_guard(&route.condition, at("if".into()), &mut errors);

            for (s, step) in route.steps.iter().enumerate() {
                check_guard(&step.condition, at(format!("step {} if", s)), &mut errors);
                for (key, value) in &step.input {
                    check_value(value, &at(format!("step {} input '{}'", s, key)), &mut errors);
                }
            }

            for (p, response) in route.responses.iter().enumerate() {
                check_guard(&response.condition, at(format!("response {} if", p)), &mut errors);
                check_value(
                    &response.output.code,
                    &at(format!("response {} output.code", p)),
                    &mut errors,
                );
                check_value(
                    &response.output.data,
                    &at(format!("response {} output.data", p)),
                    &mut errors,
                );
            }
        }
    }

    errors
}

fn check_guard(condition: &str, location: String, errors: &mut Vec<ValidationError>) {
    if let Err(e) = check_condition(condition) {
        errors.push(ValidationError::MalformedExpression {
            location,
            reason: e.to_string(),
        });
    }
}

fn check_value(value: &Value, location: &str, errors: &mut Vec<ValidationError>) {
    match value {
        Value::String(s) => {
            if let Err(e) = parse_expression(s) {
                errors.push(ValidationError::MalformedExpression {
                    location: location.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                check_value(nested, &format!("{}.{}", location, key), errors);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                check_value(nested, &format!("{}[{}]", location, i), errors);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DispatchConfig, HandlerConfig, Output, Response, Route, ServiceConfig, ServiceType, Step,
        TriggerConfig,
    };
    use serde_json::{json, Map};

    fn service(name: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            service_type: ServiceType::Http,
            description: None,
            settings: Map::new(),
        }
    }

    fn step(service: &str, input: Value) -> Step {
        Step {
            condition: String::new(),
            service: service.to_string(),
            input: input.as_object().cloned().unwrap_or_default(),
        }
    }

    fn dispatch(name: &str, steps: Vec<Step>) -> DispatchConfig {
        DispatchConfig {
            name: name.to_string(),
            routes: vec![Route {
                steps,
                responses: vec![Response {
                    output: Output {
                        code: json!(200),
                        data: json!("${payload}"),
                    },
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    fn trigger(name: &str, dispatch: &str) -> TriggerConfig {
        TriggerConfig {
            name: name.to_string(),
            trigger_type: "rest".to_string(),
            settings: Map::new(),
            handlers: vec![HandlerConfig {
                settings: Map::new(),
                dispatch: dispatch.to_string(),
            }],
        }
    }

    fn gateway(
        services: Vec<ServiceConfig>,
        dispatches: Vec<DispatchConfig>,
        triggers: Vec<TriggerConfig>,
    ) -> GatewayConfig {
        GatewayConfig {
            name: "test".to_string(),
            services,
            dispatches,
            triggers,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_empty_gateway() {
        assert!(validate_gateway(&gateway(vec![], vec![], vec![])).is_ok());
    }

    #[test]
    fn test_valid_gateway() {
        let cfg = gateway(
            vec![service("a")],
            vec![dispatch("main", vec![step("a", json!({"body.id": "${payload.id}"}))])],
            vec![trigger("rest", "main")],
        );

        assert!(validate_gateway(&cfg).is_ok());
    }

    #[test]
    fn test_duplicate_names() {
        let cfg = gateway(
            vec![service("a"), service("a")],
            vec![dispatch("d", vec![]), dispatch("d", vec![])],
            vec![trigger("t", "d"), trigger("t", "d")],
        );

        let errors = validate_gateway(&cfg).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::DuplicateService { name: "a".into() }));
        assert!(errors.contains(&ValidationError::DuplicateDispatch { name: "d".into() }));
        assert!(errors.contains(&ValidationError::DuplicateTrigger { name: "t".into() }));
    }

    #[test]
    fn test_reserved_service_names() {
        let cfg = gateway(
            vec![service("payload"), service("env"), service("async"), service("Payload")],
            vec![],
            vec![],
        );

        let errors = validate_gateway(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ReservedServiceName { name: "payload".into() },
                ValidationError::ReservedServiceName { name: "env".into() },
                ValidationError::ReservedServiceName { name: "async".into() },
            ]
        );
    }

    #[test]
    fn test_unknown_references() {
        let cfg = gateway(
            vec![service("a")],
            vec![dispatch("d", vec![step("a", json!({})), step("b", json!({}))])],
            vec![trigger("t", "nope")],
        );

        let errors = validate_gateway(&cfg).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::UnknownService {
            dispatch: "d".into(),
            route: 0,
            step: 1,
            service: "b".into(),
        }));
        assert!(matches!(errors[1], ValidationError::UnknownDispatch { handler: 0, .. }));
    }

    #[test]
    fn test_malformed_expressions() {
        let table = vec![
            (json!({"x": "${payload.id"}), 1),
            (json!({"x": "${}"}), 1),
            (json!({"x": "${payload..id}"}), 1),
            (json!({"x": {"nested": "${payload. id}"}}), 1),
            (json!({"x": ["${ok}", "${bad"]}), 1),
            (json!({"x": "plain ${text} is literal"}), 0),
            (json!({"x": 5, "y": "${payload.id}"}), 0),
        ];

        for (input, expected) in table {
            let cfg = gateway(vec![service("a")], vec![dispatch("d", vec![step("a", input.clone())])], vec![]);
            let count = validate_gateway(&cfg).err().map(|e| e.len()).unwrap_or(0);
            assert_eq!(count, expected, "input {}", input);
        }
    }

    #[test]
    fn test_unbalanced_condition() {
        let mut d = dispatch("d", vec![]);
        d.routes[0].condition = "${payload.x == 1".to_string();
        let cfg = gateway(vec![], vec![d], vec![]);

        let errors = validate_gateway(&cfg).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::MalformedExpression { location, .. } if location.contains("route 0 if")
        ));
    }
}
