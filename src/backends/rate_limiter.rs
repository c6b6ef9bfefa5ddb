// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backends::{merge_request, parse_settings};
use crate::config::consts::DEFAULT_RATE_LIMIT_TOKEN;
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::service::QuotaExceeded;
use crate::observability::messages::StructuredLog;
use crate::state::SharedState;
use crate::traits::Service;

/// A quota such as `"10-M"`: ten requests per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub count: u64,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Second,
    Minute,
    Hour,
}

impl Period {
    pub fn duration(self) -> Duration {
        match self {
            Period::Second => Duration::from_secs(1),
            Period::Minute => Duration::from_secs(60),
            Period::Hour => Duration::from_secs(3600),
        }
    }
}

impl Rate {
    /// Parse `<count>-<period>` where period is `S`, `M`, `H` or the full word,
    /// in any case.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let invalid = || format!("invalid limit '{}': expected <count>-<S|M|H>", raw);

        let (count, period) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let count: u64 = count.trim().parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }
        let period = match period.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" => Period::Second,
            "m" | "min" | "minute" => Period::Minute,
            "h" | "hour" => Period::Hour,
            _ => return Err(invalid()),
        };

        Ok(Self { count, period })
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.period {
            Period::Second => "S",
            Period::Minute => "M",
            Period::Hour => "H",
        };
        write!(f, "{}-{}", self.count, unit)
    }
}

/// Sliding-log limiter: each token keeps the instants of its admitted requests
/// inside the current window.
///
/// A token whose log has drained is dropped. Idle tokens are swept at most once per
/// window, so the table only holds tokens seen in the last two windows.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: u64,
    window: Duration,
    log: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl SlidingWindowLimiter {
    pub fn new(rate: Rate) -> Self {
        Self {
            limit: rate.count,
            window: rate.period.duration(),
            log: HashMap::new(),
            last_sweep: None,
        }
    }

    /// Take one unit for `token`. Returns whether it was admitted and how many
    /// units remain in the window.
    pub fn consume(&mut self, token: &str, now: Instant) -> (bool, u64) {
        match self.last_sweep {
            Some(at) if now.saturating_duration_since(at) < self.window => {}
            _ => {
                self.prune(now);
                self.last_sweep = Some(now);
            }
        }

        let window = self.window;
        let entries = self.log.entry(token.to_string()).or_default();
        Self::expire(entries, window, now);

        let used = entries.len() as u64;
        if used >= self.limit {
            return (false, 0);
        }
        entries.push_back(now);
        (true, self.limit - used - 1)
    }

    /// Drop every token with nothing left in its window. Returns how many went.
    pub fn prune(&mut self, now: Instant) -> usize {
        let window = self.window;
        let before = self.log.len();
        self.log.retain(|_, entries| {
            Self::expire(entries, window, now);
            !entries.is_empty()
        });
        before - self.log.len()
    }

    /// Forget one token's history.
    pub fn evict_token(&mut self, token: &str) -> bool {
        self.log.remove(token).is_some()
    }

    pub fn tokens(&self) -> usize {
        self.log.len()
    }

    fn expire(entries: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(oldest) = entries.front() {
            if now.saturating_duration_since(*oldest) >= window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LimiterSettings {
    limit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterRequest {
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterResponse {
    pub quota_exceeded: bool,
    pub remaining: u64,
    pub limit: String,
}

/// Per-token quota check.
///
/// Every rate limiter with the same `limit` shares one limiter, so two services
/// declaring `"10-M"` draw from the same per-token quota.
pub struct RateLimiterService {
    name: String,
    rate: Rate,
    state: Arc<SharedState>,
    request: LimiterRequest,
    response: Option<LimiterResponse>,
}

impl RateLimiterService {
    pub fn from_config(definition: &ServiceConfig, state: Arc<SharedState>) -> Result<Self, ConfigError> {
        let settings: LimiterSettings = parse_settings(definition)?;
        let rate = Rate::parse(&settings.limit)
            .map_err(|reason| ConfigError::invalid_settings(&definition.name, definition.service_type, reason))?;

        Ok(Self {
            name: definition.name.clone(),
            rate,
            state,
            request: LimiterRequest::default(),
            response: None,
        })
    }
}

#[async_trait]
impl Service for RateLimiterService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::RateLimiter
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let limit = self.rate.to_string();
        let token = if self.request.token.is_empty() {
            DEFAULT_RATE_LIMIT_TOKEN
        } else {
            self.request.token.as_str()
        };

        let rate = self.rate;
        let limiter = self
            .state
            .limiters
            .get_or_insert_with(&limit, || SlidingWindowLimiter::new(rate));
        let now = self.state.now();
        let (admitted, remaining) = limiter.write().consume(token, now);

        if !admitted {
            QuotaExceeded {
                service: &self.name,
                token,
                limit: &limit,
            }
            .log();
        }

        self.response = Some(LimiterResponse {
            quota_exceeded: !admitted,
            remaining,
            limit,
        });
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
            rate: self.rate,
            state: self.state.clone(),
            request: LimiterRequest::default(),
            response: None,
        })
    }
}
