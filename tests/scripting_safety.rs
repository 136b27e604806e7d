use meta_point::config::ScriptConfig;
use meta_point::context::ExecutionContext;
use meta_point::core::{DataType, DomainValue};
use meta_point::data::{MemoryPoint, PointHandle};
use meta_point::error::MetaError;
use meta_point::scripting::{FunctionLibrary, ScriptErrorKind, ScriptExecutor};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LIBRARY: &str = "fn descend(n) { descend(n + 1) }\n";

fn executor_with(config: ScriptConfig) -> ScriptExecutor {
    ScriptExecutor::with_library(config, Arc::new(FunctionLibrary::from_source(LIBRARY)))
}

fn script_error_kind(result: Result<impl std::fmt::Debug, MetaError>) -> ScriptErrorKind {
    match result {
        Err(MetaError::Script(e)) => e.kind,
        other => panic!("expected script error, got {:?}", other),
    }
}

#[test]
fn test_infinite_loop_times_out() {
    let executor = executor_with(ScriptConfig {
        timeout_ms: 50,
        max_operations: u64::MAX,
        ..ScriptConfig::default()
    });

    let started = Instant::now();
    let result = executor.execute("loop { }", &ExecutionContext::new(), 0, DataType::Numeric, 0);

    assert_eq!(script_error_kind(result), ScriptErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(executor.active_sessions(), 0);
}

#[test]
fn test_operation_limit() {
    let executor = executor_with(ScriptConfig {
        max_operations: 10_000,
        ..ScriptConfig::default()
    });
    let result = executor.execute("loop { }", &ExecutionContext::new(), 0, DataType::Numeric, 0);
    assert_eq!(script_error_kind(result), ScriptErrorKind::LimitExceeded);
}

#[test]
fn test_runaway_recursion() {
    let executor = executor_with(ScriptConfig {
        max_call_levels: 16,
        ..ScriptConfig::default()
    });
    let result = executor.execute("descend(0)", &ExecutionContext::new(), 0, DataType::Numeric, 0);
    assert_eq!(script_error_kind(result), ScriptErrorKind::LimitExceeded);
}

#[test]
fn test_string_growth_limit() {
    let executor = executor_with(ScriptConfig {
        max_string_size: 1_000,
        ..ScriptConfig::default()
    });
    let result = executor.execute(
        "let s = \"x\";\nloop { s += s; }",
        &ExecutionContext::new(),
        0,
        DataType::Alphanumeric,
        0,
    );
    assert_eq!(script_error_kind(result), ScriptErrorKind::LimitExceeded);
}

#[test]
fn test_script_validation() {
    let executor = executor_with(ScriptConfig::default());

    // Valid script
    assert!(executor.validate("let x = 10;").is_ok());

    // Invalid syntax
    let err = executor.validate("let x = ;").unwrap_err();
    assert!(matches!(err, MetaError::Script(ref e) if e.kind == ScriptErrorKind::Parse));
    assert_eq!(executor.active_sessions(), 0);
}

#[test]
fn test_session_released_on_every_exit_path() {
    let executor = executor_with(ScriptConfig::default());
    let context = ExecutionContext::new();

    assert!(executor.execute("return 1;", &context, 0, DataType::Numeric, 0).is_ok());
    assert!(executor.execute("throw \"boom\";", &context, 0, DataType::Numeric, 0).is_err());
    assert!(executor.execute("return \"text\";", &context, 0, DataType::Numeric, 0).is_err());
    assert!(executor.execute("let = ;", &context, 0, DataType::Numeric, 0).is_err());

    assert_eq!(executor.active_sessions(), 0);
}

#[test]
fn test_concurrent_executions_are_independent() {
    let executor = Arc::new(executor_with(ScriptConfig::default()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let executor = executor.clone();
            std::thread::spawn(move || {
                let point = MemoryPoint::new(i, DataType::Numeric)
                    .with_value(DomainValue::Numeric(f64::from(i)), 0)
                    .unwrap();
                let mut context = ExecutionContext::new();
                context.insert("x", Arc::new(point) as PointHandle);

                for _ in 0..20 {
                    let result = executor
                        .execute("TIMESTAMP = CONTEXT.runtime;\nx * 10", &context, i64::from(i), DataType::Numeric, -1)
                        .unwrap();
                    assert_eq!(result.value, DomainValue::Numeric(f64::from(i) * 10.0));
                    assert_eq!(result.timestamp, i64::from(i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(executor.active_sessions(), 0);
}

#[tokio::test]
async fn test_async_execution() {
    let executor = Arc::new(executor_with(ScriptConfig::default()));
    let point = MemoryPoint::new(1, DataType::Multistate)
        .with_value(DomainValue::Multistate(3), 0)
        .unwrap();
    let mut context = ExecutionContext::new();
    context.insert("state", Arc::new(point) as PointHandle);

    let result = executor
        .clone()
        .execute_async("state + 1".to_string(), context, 0, DataType::Multistate, 5)
        .await
        .unwrap();

    assert_eq!(result.value, DomainValue::Multistate(4));
    assert_eq!(result.timestamp, 5);
}
