// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! `${...}` resolution against an execution context.
//!
//! All values are `serde_json::Value`. A context is a JSON object whose top-level
//! keys are `payload`, `env` and one entry per completed service
//! (`{"request": ..., "response": ...}`).

mod expand;
mod expression;
mod resolve;

pub use expand::{expand_dotted, extract_code, translate_and_expand};
pub use expression::{check_condition, parse_expression, split_path, unwrap_condition};
pub use resolve::{resolve_path, translate_mappings, translate_value};
