// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // built-in services
pub mod config;     // gateway documents + warm-up registry
pub mod engine;     // dispatch engine
pub mod errors;     // error handling
pub mod evaluator;  // sandboxed condition / script VM
pub mod mapping;    // ${...} resolution and dotted-key expansion
pub mod observability;
pub mod state;      // cross-request tables for stateful services
pub mod traits;     // unified abstractions

pub use config::{GatewayRegistry, WarmGateway};
pub use engine::{Engine, Reply};
