// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod registry;
mod service_map;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, parse_config, ConfigFormat, DispatchConfig,
    GatewayConfig, GatewayDocument, HandlerConfig, Output, Response, Route, ServiceConfig,
    ServiceType, Step, TriggerConfig,
};
pub use registry::{env_snapshot, GatewayRegistry, WarmGateway};
pub use service_map::ServiceMap;
pub use validation::validate_gateway;
