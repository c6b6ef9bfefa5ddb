// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Circuit breaker with shared per-context state.
//!
//! # Modes
//!
//! * `a` - trips after `threshold` consecutive `counter` operations
//! * `b` - trips after `threshold` failures inside the sliding `period`
//! * `c` - trips only when `a` and `b` would both trip
//! * `d` - probabilistic; recent outcomes are weighted, decayed with age and
//!   pushed through a logistic curve, and every check is a weighted coin flip
//!
//! # Operations
//!
//! * `counter` - record a failure and apply the mode's trip rule
//! * `reset` - clear the consecutive count (modes a-c) or record a success (mode d)
//! * empty - check the context; a tripped context fails the step with
//!   [`ServiceError::CircuitBreakerTripped`] after setting `tripped` in the response

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backends::{merge_request, parse_settings};
use crate::config::consts::{
    BREAKER_RING_SIZE, DEFAULT_BREAKER_PERIOD_MS, DEFAULT_BREAKER_THRESHOLD, DEFAULT_BREAKER_TIMEOUT_MS,
};
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::service::CircuitBreakerTripped;
use crate::observability::messages::StructuredLog;
use crate::state::SharedState;
use crate::traits::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerMode {
    A,
    B,
    C,
    D,
}

impl BreakerMode {
    fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "" | "a" => Some(Self::A),
            "b" => Some(Self::B),
            "c" => Some(Self::C),
            "d" => Some(Self::D),
            _ => None,
        }
    }
}

impl fmt::Display for BreakerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawSettings {
    mode: String,
    threshold: u32,
    period: u64,
    timeout: u64,
    context: Option<String>,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            mode: "a".to_string(),
            threshold: DEFAULT_BREAKER_THRESHOLD,
            period: DEFAULT_BREAKER_PERIOD_MS,
            timeout: DEFAULT_BREAKER_TIMEOUT_MS,
            context: None,
        }
    }
}

/// Validated breaker settings.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub mode: BreakerMode,
    pub threshold: u32,
    pub period: Duration,
    pub timeout: Duration,
    pub context: String,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    weight: f64,
    at: Instant,
}

/// Trip state for one context, shared by every breaker that names it.
#[derive(Debug)]
pub struct BreakerState {
    consecutive: u32,
    failures: VecDeque<Instant>,
    open_until: Option<Instant>,
    outcomes: VecDeque<Outcome>,
    rng: StdRng,
}

impl BreakerState {
    pub fn new(rng: StdRng) -> Self {
        Self {
            consecutive: 0,
            failures: VecDeque::new(),
            open_until: None,
            outcomes: VecDeque::with_capacity(BREAKER_RING_SIZE),
            rng,
        }
    }

    /// Record a failure. Returns whether the context is open afterwards.
    pub fn record_failure(&mut self, settings: &BreakerSettings, now: Instant) -> bool {
        match settings.mode {
            BreakerMode::A => {
                self.consecutive += 1;
                if self.consecutive >= settings.threshold {
                    self.trip(settings, now);
                }
            }
            BreakerMode::B => {
                self.push_failure(settings, now);
                if self.failures.len() >= settings.threshold as usize {
                    self.trip(settings, now);
                }
            }
            BreakerMode::C => {
                self.consecutive += 1;
                self.push_failure(settings, now);
                if self.consecutive >= settings.threshold && self.failures.len() >= settings.threshold as usize {
                    self.trip(settings, now);
                }
            }
            BreakerMode::D => {
                self.push_outcome(1.0, now);
                return false;
            }
        }
        self.is_open(now)
    }

    pub fn record_success(&mut self, settings: &BreakerSettings, now: Instant) {
        match settings.mode {
            BreakerMode::D => self.push_outcome(-1.0, now),
            _ => self.consecutive = 0,
        }
    }

    /// Whether a call may go through right now.
    ///
    /// For mode `d` this is a fresh draw; a losing draw records an unknown outcome.
    pub fn check(&mut self, settings: &BreakerSettings, now: Instant) -> bool {
        match settings.mode {
            BreakerMode::D => {
                let probability = self.trip_probability(settings, now);
                let tripped = self.rng.gen::<f64>() < probability;
                if tripped {
                    self.push_outcome(0.0, now);
                }
                tripped
            }
            _ => {
                let open = self.is_open(now);
                if !open {
                    self.open_until = None;
                }
                open
            }
        }
    }

    /// Logistic transform of the decayed outcome weights; zero when they sum to
    /// zero or less.
    pub fn trip_probability(&self, settings: &BreakerSettings, now: Instant) -> f64 {
        let period = settings.period.as_secs_f64().max(f64::EPSILON);
        let sum: f64 = self
            .outcomes
            .iter()
            .map(|o| o.weight * (-(now.saturating_duration_since(o.at).as_secs_f64()) / period).exp())
            .sum();

        if sum <= 0.0 {
            return 0.0;
        }
        1.0 / (1.0 + (-(sum - settings.threshold as f64)).exp())
    }

    fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }

    fn trip(&mut self, settings: &BreakerSettings, now: Instant) {
        self.open_until = Some(now + settings.timeout);
        self.consecutive = 0;
        self.failures.clear();
    }

    fn push_failure(&mut self, settings: &BreakerSettings, now: Instant) {
        self.failures.push_back(now);
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) > settings.period {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn push_outcome(&mut self, weight: f64, at: Instant) {
        if self.outcomes.len() == BREAKER_RING_SIZE {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(Outcome { weight, at });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerRequest {
    pub operation: String,
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BreakerResponse {
    pub tripped: bool,
}

pub struct CircuitBreakerService {
    name: String,
    settings: Arc<BreakerSettings>,
    state: Arc<SharedState>,
    request: BreakerRequest,
    response: Option<BreakerResponse>,
}

impl CircuitBreakerService {
    pub fn from_config(definition: &ServiceConfig, state: Arc<SharedState>) -> Result<Self, ConfigError> {
        let raw: RawSettings = parse_settings(definition)?;
        let invalid = |reason: String| {
            ConfigError::invalid_settings(&definition.name, definition.service_type, reason)
        };

        let mode = BreakerMode::parse(&raw.mode)
            .ok_or_else(|| invalid(format!("unknown mode '{}' (expected a, b, c or d)", raw.mode)))?;
        if raw.threshold == 0 {
            return Err(invalid("threshold must be at least 1".to_string()));
        }

        let settings = BreakerSettings {
            mode,
            threshold: raw.threshold,
            period: Duration::from_millis(raw.period),
            timeout: Duration::from_millis(raw.timeout),
            context: raw
                .context
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| definition.name.clone()),
        };

        Ok(Self {
            name: definition.name.clone(),
            settings: Arc::new(settings),
            state,
            request: BreakerRequest::default(),
            response: None,
        })
    }

    fn context(&self) -> &str {
        if self.request.context.is_empty() {
            &self.settings.context
        } else {
            &self.request.context
        }
    }
}

#[async_trait]
impl Service for CircuitBreakerService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::CircuitBreaker
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let context = self.context().to_string();
        let operation = self.request.operation.trim().to_ascii_lowercase();
        let entry = self
            .state
            .breakers
            .get_or_insert_with(&context, || BreakerState::new(self.state.new_rng()));
        let now = self.state.now();

        let (tripped, checking) = {
            let mut breaker = entry.write();
            match operation.as_str() {
                "counter" => (breaker.record_failure(&self.settings, now), false),
                "reset" => {
                    breaker.record_success(&self.settings, now);
                    (false, false)
                }
                "" => (breaker.check(&self.settings, now), true),
                other => {
                    return Err(ServiceError::invalid_request(
                        &self.name,
                        format!("unknown operation '{}'", other),
                    ))
                }
            }
        };

        self.response = Some(BreakerResponse { tripped });

        if tripped {
            CircuitBreakerTripped {
                service: &self.name,
                context: &context,
                mode: &self.settings.mode.to_string(),
            }
            .log();
            if checking {
                return Err(ServiceError::CircuitBreakerTripped { context });
            }
        }
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
            settings: self.settings.clone(),
            state: self.state.clone(),
            request: BreakerRequest::default(),
            response: None,
        })
    }
}
