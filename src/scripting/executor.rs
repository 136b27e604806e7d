//! Script Executor
//!
//! Runs one meta point script against a resolved [`ExecutionContext`] and
//! turns the result into a [`TimedValue`].
//!
//! # Execution Steps
//!
//! 1. Load the shared function library (once per process).
//! 2. Build a fresh scope: time-unit constants, `CONTEXT`, a mutable
//!    `TIMESTAMP`, and one tagged point scalar per alias.
//! 3. Compose `{` + body + `\n}\n` + library. Function definitions are hoisted,
//!    so the library can follow the body. The body's `let` names stay inside
//!    the block.
//! 4. Evaluate inside an [`EngineSession`].
//! 5. Let `TIMESTAMP` override the fallback timestamp if the script set it.
//! 6. Coerce the result to the target data type.
//!
//! # Sandboxing
//!
//! Every execution gets its own engine with the operation, depth, and data
//! size limits from [`ScriptConfig`], plus a wall-clock deadline checked from
//! the progress callback. `eval` is disabled. Operators run through the
//! normal call path, so arithmetic failures report the line they occur on.

use rhai::{Dynamic, Engine, Scope, INT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

use crate::config::ScriptConfig;
use crate::context::{resolve, ExecutionContext, WrapperContext};
use crate::core::{DataType, PointId, TimedValue};
use crate::data::PointRegistry;
use crate::error::{AppResult, MetaError};
use crate::scripting::bindings::{register_bindings, PointTable};
use crate::scripting::coercion::{coerce, marshal};
use crate::scripting::diagnostics::translate;
use crate::scripting::library::FunctionLibrary;

/// Time units available to every script, in milliseconds.
pub const TIME_UNITS: [(&str, INT); 7] = [
    ("SECOND", 1_000),
    ("MINUTE", 60_000),
    ("HOUR", 3_600_000),
    ("DAY", 86_400_000),
    ("WEEK", 604_800_000),
    ("MONTH", 2_592_000_000),
    ("YEAR", 31_536_000_000),
];

/// Name of the execution context object in the script scope.
pub const CONTEXT: &str = "CONTEXT";

/// Name of the timestamp override variable in the script scope.
pub const TIMESTAMP: &str = "TIMESTAMP";

/// Opens the block holding the script body. Shares line 1 with the body.
pub const SCRIPT_PREFIX: &str = "{";

/// Closes the block holding the script body.
pub const SCRIPT_SUFFIX: &str = "\n}\n";

/// Whether `name` is defined by the executor and so cannot be a point alias.
pub fn is_reserved(name: &str) -> bool {
    name == CONTEXT || name == TIMESTAMP || TIME_UNITS.iter().any(|(unit, _)| *unit == name)
}

/// Compose the text the engine evaluates.
pub fn compose(script: &str, library: &str) -> String {
    let mut composed =
        String::with_capacity(SCRIPT_PREFIX.len() + script.len() + SCRIPT_SUFFIX.len() + library.len());
    composed.push_str(SCRIPT_PREFIX);
    composed.push_str(script);
    composed.push_str(SCRIPT_SUFFIX);
    composed.push_str(library);
    composed
}

// =============================================================================
// Engine Session
// =============================================================================

/// A configured engine for exactly one evaluation.
///
/// Opening a session increments the owner's active-session counter and
/// dropping it decrements the counter again, on every exit path.
pub struct EngineSession<'a> {
    engine: Engine,
    active: &'a AtomicUsize,
    started: Instant,
}

impl<'a> EngineSession<'a> {
    /// Build a sandboxed engine from `config`, with helpers for `points`,
    /// and count it in `active`.
    pub fn open(config: &ScriptConfig, active: &'a AtomicUsize, points: Arc<PointTable>) -> Self {
        let mut engine = Engine::new();

        engine.set_max_operations(config.max_operations);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);
        engine.set_max_string_size(config.max_string_size);
        engine.set_max_array_size(config.max_array_size);
        engine.set_max_map_size(config.max_map_size);
        engine.disable_symbol("eval");
        // Builtin operators skip position tracking in fast mode.
        engine.set_fast_operators(false);

        let started = Instant::now();
        let timeout = config.timeout();
        let timeout_ms = config.timeout_ms;
        engine.on_progress(move |_| {
            if started.elapsed() > timeout {
                Some(format!("Script timed out after {}ms", timeout_ms).into())
            } else {
                None
            }
        });

        engine.on_print(|text| debug!(target: "meta_point::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(
                target: "meta_point::script",
                source = source.unwrap_or("script"),
                line = pos.line(),
                "{}",
                text
            )
        });

        register_bindings(&mut engine, points);

        let sessions = active.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(sessions, "Engine session opened");

        Self {
            engine,
            active,
            started,
        }
    }

    /// The session's engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Time since the session was opened.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for EngineSession<'_> {
    fn drop(&mut self) {
        let sessions = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!(sessions, elapsed_us = self.elapsed().as_micros() as u64, "Engine session closed");
    }
}

// =============================================================================
// ScriptExecutor
// =============================================================================

/// Evaluates meta point scripts.
///
/// The executor holds no per-call state, so one instance can serve many
/// threads at once. Each call builds its own engine, scope, and point table.
///
/// # Example
///
/// ```no_run
/// use meta_point::config::ScriptConfig;
/// use meta_point::context::resolve;
/// use meta_point::core::{DataType, DomainValue};
/// use meta_point::data::{MemoryPoint, MemoryPointRegistry};
/// use meta_point::scripting::ScriptExecutor;
///
/// let registry = MemoryPointRegistry::new();
/// registry.insert(MemoryPoint::new(1, DataType::Numeric).with_value(DomainValue::Numeric(10.0), 0)?);
///
/// let executor = ScriptExecutor::new(ScriptConfig::default());
/// let context = resolve(&registry, &[(1, "a".to_string())])?;
/// let result = executor.execute("return a + 5;", &context, 0, DataType::Numeric, 0)?;
/// assert_eq!(result.value, DomainValue::Numeric(15.0));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ScriptExecutor {
    config: ScriptConfig,
    library: Arc<FunctionLibrary>,
    sessions: AtomicUsize,
}

impl ScriptExecutor {
    /// Create an executor that uses the process-wide function library.
    pub fn new(config: ScriptConfig) -> Self {
        Self::with_library(config, FunctionLibrary::global())
    }

    /// Create an executor with its own function library.
    pub fn with_library(config: ScriptConfig, library: Arc<FunctionLibrary>) -> Self {
        Self {
            config,
            library,
            sessions: AtomicUsize::new(0),
        }
    }

    /// The configuration this executor was built with.
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Number of engine sessions currently open on this executor.
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Run `script` with the points of `context` bound under their aliases.
    ///
    /// `runtime` is the logical execution instant (epoch milliseconds). The
    /// result carries `timestamp` unless the script assigns a number to
    /// `TIMESTAMP`.
    ///
    /// # Errors
    ///
    /// - [`MetaError::ReservedAlias`] if an alias shadows an executor name
    /// - [`MetaError::Script`] if the script fails to parse or run
    /// - [`MetaError::ResultType`] if the result does not fit `target`
    /// - [`MetaError::Internal`] if the function library is unavailable
    pub fn execute(
        &self,
        script: &str,
        context: &ExecutionContext,
        runtime: i64,
        target: DataType,
        timestamp: i64,
    ) -> AppResult<TimedValue> {
        let library = self.library.ensure_loaded(&self.config.function_library_path)?;
        let (mut scope, points) = build_scope(context, WrapperContext::new(runtime))?;
        let points = Arc::new(points);
        let composed = compose(script, &library);

        let session = EngineSession::open(&self.config, &self.sessions, points.clone());
        let result = session
            .engine()
            .eval_with_scope::<Dynamic>(&mut scope, &composed)
            .map_err(|e| {
                let script_err = translate(&e);
                error!(
                    line = script_err.line,
                    kind = ?script_err.kind,
                    "Script evaluation failed: {}",
                    script_err.message
                );
                MetaError::Script(script_err)
            })?;

        let timestamp = timestamp_override(&scope).unwrap_or(timestamp);
        let value = coerce(marshal(result, Some(&points), Some(session.engine())), target)?;

        debug!(
            value = %value,
            timestamp,
            elapsed_us = session.elapsed().as_micros() as u64,
            "Script evaluated"
        );
        Ok(TimedValue::new(value, timestamp))
    }

    /// Resolve `entries` against `registry`, then [`execute`](Self::execute).
    ///
    /// Nothing is evaluated if any point is missing.
    pub fn evaluate<R>(
        &self,
        registry: &R,
        entries: &[(PointId, String)],
        script: &str,
        runtime: i64,
        target: DataType,
        timestamp: i64,
    ) -> AppResult<TimedValue>
    where
        R: PointRegistry + ?Sized,
    {
        let context = resolve(registry, entries)?;
        self.execute(script, &context, runtime, target, timestamp)
    }

    /// Check that `script` and the function library compile, without running anything.
    pub fn validate(&self, script: &str) -> AppResult<()> {
        let library = self.library.ensure_loaded(&self.config.function_library_path)?;
        let session = EngineSession::open(&self.config, &self.sessions, Arc::new(PointTable::new()));
        session
            .engine()
            .compile(compose(script, &library))
            .map(|_| ())
            .map_err(|e| {
                let err: rhai::EvalAltResult = e.into();
                MetaError::Script(translate(&err))
            })
    }

    /// Run [`execute`](Self::execute) on the blocking thread pool.
    pub async fn execute_async(
        self: Arc<Self>,
        script: String,
        context: ExecutionContext,
        runtime: i64,
        target: DataType,
        timestamp: i64,
    ) -> AppResult<TimedValue> {
        tokio::task::spawn_blocking(move || {
            self.execute(&script, &context, runtime, target, timestamp)
        })
        .await
        .map_err(|e| MetaError::Internal(format!("Script task failed: {}", e)))?
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("config", &self.config)
            .field("sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

fn build_scope(
    context: &ExecutionContext,
    wrapper: WrapperContext,
) -> AppResult<(Scope<'static>, PointTable)> {
    if let Some((alias, _)) = context.iter().find(|(alias, _)| is_reserved(alias)) {
        return Err(MetaError::ReservedAlias(alias.clone()));
    }

    let mut scope = Scope::new();
    let mut points = PointTable::new();
    for (name, millis) in TIME_UNITS {
        scope.push_constant(name, millis);
    }
    scope.push(CONTEXT, wrapper);
    scope.push_dynamic(TIMESTAMP, Dynamic::UNIT);

    for (alias, point) in context {
        debug!(
            alias = %alias,
            point = point.id(),
            data_type = %point.data_type(),
            "Binding point to script"
        );
        scope.push_dynamic(alias.clone(), points.bind(point.clone(), wrapper));
    }
    Ok((scope, points))
}

fn timestamp_override(scope: &Scope<'_>) -> Option<i64> {
    let value = scope.get_value::<Dynamic>(TIMESTAMP)?.flatten();
    if let Ok(millis) = value.as_int() {
        return Some(millis);
    }
    value.as_float().ok().map(|millis| millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DomainValue;
    use crate::data::{MemoryPoint, MemoryPointRegistry, PointHandle};
    use crate::scripting::ScriptErrorKind;
    use tracing_test::traced_test;

    const LIBRARY: &str = "fn double(x) { x * 2 }\n";
    const HOUR_MS: i64 = 3_600_000;

    fn executor() -> ScriptExecutor {
        ScriptExecutor::with_library(
            ScriptConfig::default(),
            Arc::new(FunctionLibrary::from_source(LIBRARY)),
        )
    }

    fn context_with(alias: &str, point: MemoryPoint) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        context.insert(alias, Arc::new(point) as PointHandle);
        context
    }

    #[test]
    fn test_compose_keeps_line_numbers() {
        let composed = compose("let x = 1;\nx", "fn f() {}");
        assert_eq!(composed, "{let x = 1;\nx\n}\nfn f() {}");
    }

    #[test]
    fn test_library_functions_are_callable() {
        let context = context_with(
            "a",
            MemoryPoint::new(1, DataType::Numeric)
                .with_value(DomainValue::Numeric(2.5), 0)
                .unwrap(),
        );
        let result = executor()
            .execute("return double(a);", &context, 0, DataType::Numeric, 7)
            .unwrap();
        assert_eq!(result, TimedValue::new(DomainValue::Numeric(5.0), 7));
    }

    #[test]
    fn test_last_expression_is_the_result() {
        let result = executor()
            .execute("let x = 3;\nx * 2", &ExecutionContext::new(), 0, DataType::Multistate, 0)
            .unwrap();
        assert_eq!(result.value, DomainValue::Multistate(6));
    }

    #[test]
    fn test_time_units_and_context() {
        let result = executor()
            .execute(
                "return CONTEXT.runtime - HOUR;",
                &ExecutionContext::new(),
                HOUR_MS * 2,
                DataType::Numeric,
                0,
            )
            .unwrap();
        assert_eq!(result.value, DomainValue::Numeric(HOUR_MS as f64));
    }

    #[test]
    fn test_float_timestamp_is_truncated() {
        let result = executor()
            .execute("TIMESTAMP = 1500.9;", &ExecutionContext::new(), 0, DataType::Binary, 1)
            .unwrap();
        assert_eq!(result, TimedValue::new(DomainValue::Binary(false), 1500));
    }

    #[test]
    fn test_non_numeric_timestamp_is_ignored() {
        let result = executor()
            .execute(r#"TIMESTAMP = "soon"; true"#, &ExecutionContext::new(), 0, DataType::Binary, 42)
            .unwrap();
        assert_eq!(result.timestamp, 42);
    }

    #[test]
    fn test_reserved_alias_is_rejected() {
        let context = context_with("HOUR", MemoryPoint::new(1, DataType::Numeric));
        let err = executor()
            .execute("return 1;", &context, 0, DataType::Numeric, 0)
            .unwrap_err();
        assert!(matches!(err, MetaError::ReservedAlias(ref alias) if alias == "HOUR"));
    }

    #[test]
    fn test_eval_is_disabled() {
        let err = executor()
            .execute(r#"eval("1")"#, &ExecutionContext::new(), 0, DataType::Numeric, 0)
            .unwrap_err();
        assert!(matches!(err, MetaError::Script(_)));
    }

    #[test]
    fn test_operation_limit() {
        let config = ScriptConfig {
            max_operations: 1_000,
            ..ScriptConfig::default()
        };
        let executor =
            ScriptExecutor::with_library(config, Arc::new(FunctionLibrary::from_source("")));
        let err = executor
            .execute("let n = 0;\nloop { n += 1; }", &ExecutionContext::new(), 0, DataType::Numeric, 0)
            .unwrap_err();
        assert!(matches!(err, MetaError::Script(ref e) if e.kind == ScriptErrorKind::LimitExceeded));
        assert_eq!(executor.active_sessions(), 0);
    }

    #[test]
    fn test_validate_reports_parse_errors() {
        let executor = executor();
        executor.validate("return a + 1;").unwrap();
        let err = executor.validate("let = ;").unwrap_err();
        assert!(matches!(err, MetaError::Script(ref e) if e.line == 1));
    }

    #[test]
    fn test_evaluate_resolves_first() {
        let registry = MemoryPointRegistry::new();
        registry.insert(
            MemoryPoint::new(1, DataType::Binary)
                .with_value(DomainValue::Binary(true), 5)
                .unwrap(),
        );
        let entries = vec![(1, "flag".to_string())];
        let result = executor()
            .evaluate(&registry, &entries, "!flag", 0, DataType::Binary, 0)
            .unwrap();
        assert_eq!(result.value, DomainValue::Binary(false));

        let missing = vec![(9, "x".to_string())];
        assert!(matches!(
            executor().evaluate(&registry, &missing, "x", 0, DataType::Binary, 0),
            Err(MetaError::PointResolution(9))
        ));
    }

    #[test]
    #[traced_test]
    fn test_print_is_forwarded_to_tracing() {
        executor()
            .execute(r#"print("hello from script");"#, &ExecutionContext::new(), 0, DataType::Binary, 0)
            .unwrap();
        assert!(logs_contain("hello from script"));
    }

    #[test]
    fn test_reserved_names() {
        for name in ["SECOND", "YEAR", "CONTEXT", "TIMESTAMP"] {
            assert!(is_reserved(name));
        }
        assert!(!is_reserved("hour"));
    }
}
