// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};

use crate::config::consts::DEFAULT_REPLY_CODE;
use crate::errors::MappingError;
use crate::mapping::translate_mappings;

/// Expand dotted keys into nested objects.
///
/// `{"a.b.c": 1, "a.d": 2}` becomes `{"a": {"b": {"c": 1}, "d": 2}}`. Objects
/// that meet at the same key are merged; otherwise the later key wins. Keys with an
/// empty segment (`"a..b"`, `".a"`) are kept as written.
pub fn expand_dotted(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, value) in map {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.len() > 1 && segments.iter().all(|s| !s.is_empty()) {
            insert_path(&mut out, &segments, value);
        } else {
            merge_into(&mut out, key, value);
        }
    }

    out
}

fn insert_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => merge_into(target, (*last).to_string(), value),
        [first, rest @ ..] => {
            let slot = target
                .entry((*first).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_path(child, rest, value);
            }
        }
    }
}

fn merge_into(target: &mut Map<String, Value>, key: String, value: Value) {
    match (target.get_mut(&key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge_into(existing, k, v);
            }
        }
        (_, value) => {
            target.insert(key, value);
        }
    }
}

/// Resolve mappings, then expand their dotted keys.
pub fn translate_and_expand(
    context: &Map<String, Value>,
    mappings: &Map<String, Value>,
) -> Result<Map<String, Value>, MappingError> {
    translate_mappings(context, mappings).map(expand_dotted)
}

/// Turn a resolved `output.code` into a reply code.
///
/// Integers, integral floats, numeric strings and booleans convert; anything that
/// is missing, zero, negative or not numeric gives the default of 200.
pub fn extract_code(value: &Value) -> u16 {
    let code = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };

    match code {
        Some(c) if c > 0 && c <= i64::from(u16::MAX) => c as u16,
        _ => DEFAULT_REPLY_CODE,
    }
}
