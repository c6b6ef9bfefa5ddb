// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};

use crate::errors::MappingError;
use crate::mapping::{expand_dotted, parse_expression, split_path};

/// Resolve a dotted path against a context object.
///
/// Each segment is looked up by exact key, then with its first letter upper-cased,
/// then with its first letter lower-cased, so `response.body` also finds
/// `Response.Body`. Numeric segments index arrays.
///
/// A missing key or a `null` anywhere along the way resolves to `null`. Reading a
/// field of a string, number or boolean is a [`MappingError::TypeMismatch`].
pub fn resolve_path(context: &Map<String, Value>, path: &str) -> Result<Value, MappingError> {
    let segments = split_path(path);
    let mut iter = segments.iter();

    let mut current = match iter.next().and_then(|first| lookup(context, first)) {
        Some(value) => value,
        None => return Ok(Value::Null),
    };

    for segment in iter {
        current = match current {
            Value::Null => return Ok(Value::Null),
            Value::Object(map) => match lookup(map, segment) {
                Some(value) => value,
                None => return Ok(Value::Null),
            },
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) => match items.get(index) {
                    Some(value) => value,
                    None => return Ok(Value::Null),
                },
                Err(_) => return Err(mismatch(path, segment, current)),
            },
            scalar => return Err(mismatch(path, segment, scalar)),
        };
    }

    Ok(current.clone())
}

fn lookup<'a>(map: &'a Map<String, Value>, segment: &str) -> Option<&'a Value> {
    map.get(segment)
        .or_else(|| map.get(&recase_first(segment, true)))
        .or_else(|| map.get(&recase_first(segment, false)))
}

fn recase_first(segment: &str, upper: bool) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn mismatch(path: &str, segment: &str, found: &Value) -> MappingError {
    MappingError::TypeMismatch {
        path: path.to_string(),
        segment: segment.to_string(),
        found: type_name(found),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve every `${...}` inside a value.
///
/// Objects are resolved field by field and then have their dotted keys expanded;
/// arrays element by element. Anything else passes through unchanged.
pub fn translate_value(context: &Map<String, Value>, value: &Value) -> Result<Value, MappingError> {
    match value {
        Value::String(s) => match parse_expression(s)? {
            Some(path) => resolve_path(context, path),
            None => Ok(value.clone()),
        },
        Value::Object(map) => Ok(Value::Object(expand_dotted(translate_mappings(context, map)?))),
        Value::Array(items) => items
            .iter()
            .map(|item| translate_value(context, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

/// Resolve each mapping value; keys are left as written.
pub fn translate_mappings(
    context: &Map<String, Value>,
    mappings: &Map<String, Value>,
) -> Result<Map<String, Value>, MappingError> {
    let mut resolved = Map::new();
    for (key, value) in mappings {
        resolved.insert(key.clone(), translate_value(context, value)?);
    }
    Ok(resolved)
}
