// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structured logging for the gateway.
//!
//! Log lines are built from message structs that implement `Display` and
//! [`messages::StructuredLog`], so call sites never carry format strings and every
//! event is emitted with the same fields each time.
//!
//! Messages are organized by subsystem:
//! * `messages::config` - loading, validation and warm-up of gateway documents
//! * `messages::engine` - route, step and response selection
//! * `messages::service` - built-in service outcomes worth recording
//!
//! # Usage
//!
//! ```ignore
//! use microgateway::observability::messages::{engine::StepSkipped, StructuredLog};
//!
//! StepSkipped { step_index: 1, service: "PetStorePets" }.log();
//! ```

pub mod messages;
