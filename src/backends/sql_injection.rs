// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lexical SQL-injection scoring.
//!
//! Every string in the request payload is matched against a small set of weighted
//! lexical features. The weights are summed with a negative bias and squashed to a
//! 0..100 score, so plain text lands near zero and classic injection strings near
//! one hundred.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};

use crate::backends::merge_request;
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::service::InjectionSuspected;
use crate::observability::messages::StructuredLog;
use crate::traits::Service;

const BIAS: f64 = -4.0;
/// Fields scoring at or above this are logged.
const SUSPICION_SCORE: f64 = 50.0;

struct Feature {
    pattern: Regex,
    weight: f64,
    /// Count every match rather than just presence.
    per_match: bool,
}

fn features() -> &'static [Feature] {
    static FEATURES: OnceLock<Vec<Feature>> = OnceLock::new();
    FEATURES.get_or_init(|| {
        let table: [(&str, f64, bool); 8] = [
            (
                r"(?i)\b(select|insert|update|delete|drop|exec|execute|create|alter|truncate|sleep|benchmark|waitfor|information_schema|xp_cmdshell)\b",
                1.5,
                true,
            ),
            (r"(?i)\bunion\s+(all\s+)?select\b", 3.0, false),
            (r#"(?i)\b(or|and)\s+['"]?\w+['"]?\s*=\s*['"]?\w+"#, 5.0, false),
            (r#"(?i)['"]\s*(or|and)\s*['"]"#, 2.0, false),
            (r"(--|#|/\*)", 2.0, false),
            (r";\s*\w", 2.0, false),
            (r"(?i)\b0x[0-9a-f]+\b", 1.0, false),
            (r"\|\|", 1.0, false),
        ];

        table
            .iter()
            .filter_map(|(pattern, weight, per_match)| {
                Regex::new(pattern).ok().map(|pattern| Feature {
                    pattern,
                    weight: *weight,
                    per_match: *per_match,
                })
            })
            .collect()
    })
}

/// Injection likelihood of one string, 0..100.
pub fn score(text: &str) -> f64 {
    let mut sum = BIAS;
    for feature in features() {
        if feature.per_match {
            sum += feature.weight * feature.pattern.find_iter(text).count() as f64;
        } else if feature.pattern.is_match(text) {
            sum += feature.weight;
        }
    }
    if text.matches('\'').count() % 2 == 1 {
        sum += 1.5;
    }

    100.0 / (1.0 + (-sum).exp())
}

/// Score every string leaf of `value`, keyed by its dotted path.
fn score_leaves(value: &Value, path: &str, scores: &mut Map<String, Value>) {
    match value {
        Value::String(text) => {
            scores.insert(path.to_string(), json!(score(text)));
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                score_leaves(child, &child_path, scores);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                score_leaves(child, &format!("{}[{}]", path, index), scores);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SqlInjectionRequest {
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlInjectionResponse {
    pub attack: f64,
    pub attack_values: Map<String, Value>,
}

pub struct SqlInjectionService {
    name: Arc<str>,
    request: SqlInjectionRequest,
    response: Option<SqlInjectionResponse>,
}

impl SqlInjectionService {
    pub fn from_config(definition: &ServiceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: Arc::from(definition.name.as_str()),
            request: SqlInjectionRequest::default(),
            response: None,
        })
    }
}

#[async_trait]
impl Service for SqlInjectionService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Sqld
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let mut attack_values = Map::new();
        let root = if self.request.payload.is_string() { "payload" } else { "" };
        score_leaves(&self.request.payload, root, &mut attack_values);

        let mut attack: f64 = 0.0;
        for (field, value) in &attack_values {
            let field_score = value.as_f64().unwrap_or(0.0);
            if field_score >= SUSPICION_SCORE {
                InjectionSuspected {
                    service: &self.name,
                    field,
                    score: field_score,
                }
                .log();
            }
            attack = attack.max(field_score);
        }

        self.response = Some(SqlInjectionResponse { attack, attack_values });
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({
            "request": serde_json::to_value(&self.request).unwrap_or(Value::Null),
            "response": self.response.as_ref().map_or(Value::Null, |r| {
                serde_json::to_value(r).unwrap_or(Value::Null)
            }),
        })
    }

    fn fork(&self) -> Box<dyn Service> {
        Box::new(Self {
            name: self.name.clone(),
            request: SqlInjectionRequest::default(),
            response: None,
        })
    }
}
