/// Reply code used when a response's `output.code` is missing, zero or not numeric
pub const DEFAULT_REPLY_CODE: u16 = 200;

/// Wall-clock limit for a single guard evaluation (milliseconds)
pub const DEFAULT_EVAL_TIMEOUT_MS: u64 = 1_000;
/// Wall-clock limit for a `js` service script unless `timeoutMs` is set (milliseconds)
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 5_000;
/// Heap limit for one evaluator sandbox (32 MiB)
pub const VM_MEMORY_LIMIT: usize = 32 * 1024 * 1024;
/// Stack limit for one evaluator sandbox (1 MiB)
pub const VM_STACK_LIMIT: usize = 1024 * 1024;

/// Failures needed to trip a circuit breaker
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
/// Sliding window for circuit breaker modes B, C and the decay constant for mode D (milliseconds)
pub const DEFAULT_BREAKER_PERIOD_MS: u64 = 60_000;
/// How long a tripped breaker stays open (milliseconds)
pub const DEFAULT_BREAKER_TIMEOUT_MS: u64 = 60_000;
/// Outcome records kept by a mode D breaker
pub const BREAKER_RING_SIZE: usize = 128;

/// Execution context bindings a service name may not shadow
pub const RESERVED_BINDINGS: [&str; 3] = ["payload", "env", "async"];

/// Token used by the rate limiter when the request carries none
pub const DEFAULT_RATE_LIMIT_TOKEN: &str = "default";

/// Samples an anomaly context must see before it reports a z-score
pub const DEFAULT_ANOMALY_DEPTH: u64 = 100;
/// |z| above which a value is reported as anomalous
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 3.0;
