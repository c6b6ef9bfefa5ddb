// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sandboxed JavaScript evaluation for guards and `js` services.
//!
//! Guards are written as `${expression}` and evaluated against the globals an
//! execution path has placed in its [`Vm`]: `payload`, `env`, `async`, and one
//! global per completed service.

mod vm;

pub use vm::{Primitive, Vm};
