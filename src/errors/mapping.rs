// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while resolving `${...}` expressions against an execution context.
///
/// A missing key is not an error (it resolves to null). These variants indicate
/// a configuration defect instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("Malformed mapping expression '{expression}': {reason}")]
    MalformedExpression { expression: String, reason: String },

    #[error("Cannot read '{segment}' of path '{path}': value is a {found}")]
    TypeMismatch {
        path: String,
        segment: String,
        found: &'static str,
    },
}
