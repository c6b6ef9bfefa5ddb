// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod engine;
mod evaluation;
mod mapping;
mod service;

pub use config::{ConfigError, ValidationError};
pub use engine::EngineError;
pub use evaluation::EvalError;
pub use mapping::MappingError;
pub use service::ServiceError;
