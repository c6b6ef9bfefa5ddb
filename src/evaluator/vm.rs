// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use rquickjs::{Context, Ctx, Function, Object, Runtime};
use serde::Serialize;
use serde_json::Value;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::consts::{DEFAULT_EVAL_TIMEOUT_MS, VM_MEMORY_LIMIT, VM_STACK_LIMIT};
use crate::errors::{EvalError, MappingError};
use crate::mapping::unwrap_condition;

/// A primitive that can be placed in the sandbox without a JSON round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Number(f64),
    Str(String),
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Bool(value)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Primitive::Number(value)
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::Str(value.to_string())
    }
}

/// A sandboxed script environment for one execution path.
///
/// Each `Vm` owns its own QuickJS runtime and context. It can move between tasks
/// (`Send`) but cannot be shared (`!Sync`, not `Clone`), and every operation takes
/// `&mut self`, so two execution paths can never evaluate against the same sandbox.
///
/// Every evaluation runs under a wall-clock budget enforced through the runtime's
/// interrupt handler; exceeding it yields [`EvalError::Timeout`].
pub struct Vm {
    runtime: Runtime,
    context: Context,
    timeout: Duration,
    _not_sync: PhantomData<Cell<()>>,
}

impl Vm {
    pub fn new() -> Result<Self, EvalError> {
        Self::with_timeout(Duration::from_millis(DEFAULT_EVAL_TIMEOUT_MS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, EvalError> {
        let runtime = Runtime::new().map_err(|e| EvalError::Init(e.to_string()))?;
        runtime.set_memory_limit(VM_MEMORY_LIMIT);
        runtime.set_max_stack_size(VM_STACK_LIMIT);

        let context = Context::full(&runtime).map_err(|e| EvalError::Init(e.to_string()))?;
        context
            .with(|ctx| install_console(&ctx))
            .map_err(|e| EvalError::Init(e.to_string()))?;

        Ok(Self {
            runtime,
            context,
            timeout,
            _not_sync: PhantomData,
        })
    }

    /// Evaluate a guard. Empty guards are `true`; anything but a boolean is an error.
    pub fn evaluate_to_bool(&mut self, expression: &str) -> Result<bool, EvalError> {
        let source = unwrap_condition(expression).map_err(malformed)?;
        if source.trim().is_empty() {
            return Ok(true);
        }

        self.guarded(|ctx| {
            let value: rquickjs::Value = ctx.eval(source.as_str()).map_err(|e| describe(&ctx, e))?;
            value.as_bool().ok_or_else(|| EvalError::NotBoolean {
                expression: expression.to_string(),
                found: format!("{:?}", value.type_of()).to_lowercase(),
            })
        })
    }

    /// Evaluate an expression and bring its value out as JSON.
    ///
    /// `undefined` and functions come out as `null`.
    pub fn evaluate(&mut self, expression: &str) -> Result<Value, EvalError> {
        let source = unwrap_condition(expression).map_err(malformed)?;
        if source.trim().is_empty() {
            return Ok(Value::Null);
        }
        let script = format!("JSON.stringify(({}))", source);
        let json = self.guarded(|ctx| {
            ctx.eval::<Option<String>, _>(script.as_str())
                .map_err(|e| describe(&ctx, e))
        })?;
        parse_json(json)
    }

    /// Run a statement script for its side effects.
    pub fn run(&mut self, script: &str) -> Result<(), EvalError> {
        self.guarded(|ctx| ctx.eval::<(), _>(script).map_err(|e| describe(&ctx, e)))
    }

    /// Place a JSON-representable value in the sandbox under `name`.
    ///
    /// The value is parsed inside the sandbox with `JSON.parse`, so keys such as
    /// `__proto__` arrive as plain properties.
    pub fn set_in_vm<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), EvalError> {
        let json_text = serde_json::to_string(value)?;
        let script = format!(
            "globalThis[{}] = JSON.parse({});",
            serde_json::to_string(name)?,
            serde_json::to_string(&json_text)?
        );
        self.run(&script)
    }

    /// Read a global back out of the sandbox. Missing globals read as `null`.
    pub fn get_from_vm(&mut self, name: &str) -> Result<Value, EvalError> {
        let script = format!("JSON.stringify(globalThis[{}])", serde_json::to_string(name)?);
        let json = self.guarded(|ctx| {
            ctx.eval::<Option<String>, _>(script.as_str())
                .map_err(|e| describe(&ctx, e))
        })?;
        parse_json(json)
    }

    /// Set a primitive global directly.
    pub fn set_primitive_in_vm(&mut self, name: &str, value: impl Into<Primitive>) -> Result<(), EvalError> {
        let value = value.into();
        self.context.with(|ctx| {
            let globals = ctx.globals();
            let result = match value {
                Primitive::Bool(b) => globals.set(name, b),
                Primitive::Number(n) => globals.set(name, n),
                Primitive::Str(s) => globals.set(name, s),
            };
            result.map_err(|e| describe(&ctx, e))
        })
    }

    fn guarded<R, F>(&mut self, f: F) -> Result<R, EvalError>
    where
        R: Send,
        F: for<'js> FnOnce(Ctx<'js>) -> Result<R, EvalError> + Send,
    {
        let start = Instant::now();
        let budget = self.timeout;
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        self.runtime.set_interrupt_handler(Some(Box::new(move || {
            let expired = start.elapsed() > budget;
            if expired {
                flag.store(true, Ordering::Relaxed);
            }
            expired
        })));

        let result = self.context.with(f);
        self.runtime.set_interrupt_handler(None);

        if fired.load(Ordering::Relaxed) {
            return Err(EvalError::Timeout);
        }
        result
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm").field("timeout", &self.timeout).finish()
    }
}

fn install_console(ctx: &Ctx<'_>) -> Result<(), rquickjs::Error> {
    let console = Object::new(ctx.clone())?;

    console.set(
        "log",
        Function::new(ctx.clone(), |msg: String| {
            tracing::debug!(target: "microgateway::script", message = %msg, "console.log");
        })?,
    )?;
    console.set(
        "warn",
        Function::new(ctx.clone(), |msg: String| {
            tracing::warn!(target: "microgateway::script", message = %msg, "console.warn");
        })?,
    )?;
    console.set(
        "error",
        Function::new(ctx.clone(), |msg: String| {
            tracing::error!(target: "microgateway::script", message = %msg, "console.error");
        })?,
    )?;

    ctx.globals().set("console", console)
}

fn describe(ctx: &Ctx<'_>, error: rquickjs::Error) -> EvalError {
    if !matches!(error, rquickjs::Error::Exception) {
        return EvalError::Script(error.to_string());
    }

    let caught = ctx.catch();
    let message = match caught.as_exception() {
        Some(exception) => exception.message(),
        None => caught.as_string().and_then(|s| s.to_string().ok()),
    };
    EvalError::Script(message.unwrap_or_else(|| "uncaught exception".to_string()))
}

fn parse_json(json: Option<String>) -> Result<Value, EvalError> {
    match json {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Value::Null),
    }
}

fn malformed(error: MappingError) -> EvalError {
    EvalError::Script(error.to_string())
}
