// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::MappingError;

/// Recognize a mapping expression.
///
/// A mapping expression is a whole string of the form `${dotted.path}`. Strings
/// that do not start with `${` are literals and yield `Ok(None)`; a `${` that
/// occurs later in a string is literal text.
///
/// Paths are dot separated. Array elements can be addressed as `items.0` or
/// `items[0]`.
pub fn parse_expression(raw: &str) -> Result<Option<&str>, MappingError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("${") {
        return Ok(None);
    }
    if trimmed.len() < 3 || !trimmed.ends_with('}') {
        return Err(malformed(raw, "missing closing '}'"));
    }

    let path = trimmed[2..trimmed.len() - 1].trim();
    if path.is_empty() {
        return Err(malformed(raw, "empty path"));
    }
    for segment in split_path(path) {
        if segment.is_empty() {
            return Err(malformed(raw, "empty path segment"));
        }
        if segment.chars().any(char::is_whitespace) {
            return Err(malformed(raw, "whitespace inside a path segment"));
        }
    }

    Ok(Some(path))
}

/// Split a dotted path into its segments, turning `a[0]` into `a`, `0`.
pub fn split_path(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .map(str::to_string)
        .collect()
}

/// Turn a guard into a plain script expression.
///
/// Every balanced `${...}` is replaced by its parenthesized body, so both
/// `${payload.id == 1}` and `${payload.a} && ${payload.b}` evaluate as written.
/// An opening `${` without its matching `}` is malformed.
pub fn unwrap_condition(raw: &str) -> Result<String, MappingError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.trim();

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];

        let mut depth = 1usize;
        let mut end = None;
        for (i, c) in body.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = end.ok_or_else(|| malformed(raw, "missing closing '}'"))?;
        out.push('(');
        out.push_str(body[..end].trim());
        out.push(')');
        rest = &body[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Check that a guard's `${...}` markers are balanced.
pub fn check_condition(raw: &str) -> Result<(), MappingError> {
    unwrap_condition(raw).map(|_| ())
}

fn malformed(expression: &str, reason: &str) -> MappingError {
    MappingError::MalformedExpression {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}
