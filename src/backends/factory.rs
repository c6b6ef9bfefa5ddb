// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::anomaly::AnomalyService;
use crate::backends::circuit_breaker::CircuitBreakerService;
use crate::backends::flow::{FlowKind, FlowService};
use crate::backends::grpc::GrpcService;
use crate::backends::http::HttpService;
use crate::backends::jwt::JwtService;
use crate::backends::rate_limiter::RateLimiterService;
use crate::backends::script::ScriptService;
use crate::backends::sql_injection::SqlInjectionService;
use crate::backends::Collaborators;
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::ConfigError;
use crate::observability::messages::service::ServiceCreated;
use crate::observability::messages::StructuredLog;
use crate::traits::Service;

/// Creates warm service prototypes from their definitions.
pub struct ServiceFactory;

impl ServiceFactory {
    /// Build the prototype for one service definition.
    ///
    /// Settings are validated here, so a bad setting fails warm-up instead of the
    /// first event that reaches the service.
    pub fn initialize(
        definition: &ServiceConfig,
        collaborators: &Collaborators,
    ) -> Result<Box<dyn Service>, ConfigError> {
        let service: Box<dyn Service> = match definition.service_type {
            ServiceType::Http => Box::new(HttpService::from_config(definition, &collaborators.http)?),
            ServiceType::Js => Box::new(ScriptService::from_config(definition)?),
            ServiceType::Activity => Box::new(FlowService::from_config(
                definition,
                FlowKind::Activity,
                &collaborators.flows,
            )?),
            ServiceType::Flow => Box::new(FlowService::from_config(
                definition,
                FlowKind::Flow,
                &collaborators.flows,
            )?),
            ServiceType::CircuitBreaker => Box::new(CircuitBreakerService::from_config(
                definition,
                collaborators.state.clone(),
            )?),
            ServiceType::RateLimiter => Box::new(RateLimiterService::from_config(
                definition,
                collaborators.state.clone(),
            )?),
            ServiceType::Jwt => Box::new(JwtService::from_config(definition)?),
            ServiceType::Anomaly => Box::new(AnomalyService::from_config(
                definition,
                collaborators.state.clone(),
            )?),
            ServiceType::Sqld => Box::new(SqlInjectionService::from_config(definition)?),
            ServiceType::Grpc => Box::new(GrpcService::from_config(definition, &collaborators.grpc)?),
        };

        ServiceCreated {
            service: &definition.name,
            service_type: definition.service_type.as_str(),
        }
        .log();

        Ok(service)
    }

    /// The `type` names this factory understands.
    pub fn list_available() -> Vec<&'static str> {
        vec![
            "http",
            "js",
            "activity",
            "flow",
            "circuitBreaker",
            "rateLimiter",
            "jwt",
            "anomaly",
            "sqld",
            "grpc",
        ]
    }

    pub fn is_available(type_name: &str) -> bool {
        Self::list_available().contains(&type_name)
    }
}
