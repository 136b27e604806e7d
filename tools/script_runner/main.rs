//! Evaluate a meta point script against a JSON snapshot of points.
//!
//! Usage: `script_runner <script> [--points FILE] [--target TYPE] [--runtime MS]`
//!
//! The points file looks like:
//!
//! ```json
//! {
//!   "points": [
//!     {
//!       "id": 1,
//!       "alias": "a",
//!       "data_type": "Numeric",
//!       "history": [{ "value": { "Numeric": 10.0 }, "timestamp": 0 }]
//!     }
//!   ]
//! }
//! ```
//!
//! The result is printed as JSON. Set `RUST_LOG=debug` to see bindings and
//! script `print` output.

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use meta_point::config::{ScriptConfig, DEFAULT_CONFIG_PATH};
use meta_point::core::{DataType, PointId, TimedValue};
use meta_point::data::{MemoryPoint, MemoryPointRegistry, PointSnapshot};
use meta_point::scripting::ScriptExecutor;

#[derive(Parser, Debug)]
#[command(name = "script_runner")]
#[command(about = "Evaluate a meta point script against a snapshot of points")]
struct Args {
    /// Path to the script file
    script: PathBuf,

    /// JSON file describing the points and their aliases
    #[arg(long)]
    points: Option<PathBuf>,

    /// Target data type (name or id)
    #[arg(long, default_value = "Numeric")]
    target: DataType,

    /// Logical execution instant in epoch milliseconds (default: now)
    #[arg(long)]
    runtime: Option<i64>,

    /// Fallback result timestamp (default: the runtime)
    #[arg(long)]
    timestamp: Option<i64>,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only check that the script compiles
    #[arg(long)]
    check: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PointsFile {
    #[serde(default)]
    points: Vec<BoundPoint>,
}

#[derive(Debug, Deserialize)]
struct BoundPoint {
    alias: String,
    #[serde(flatten)]
    snapshot: PointSnapshot,
}

#[derive(Debug, Serialize)]
struct Output {
    #[serde(flatten)]
    result: TimedValue,
    time: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let Some(result) = evaluate(&args)? else {
        info!(script = %args.script.display(), "Script compiles");
        return Ok(());
    };
    let output = Output {
        time: result.time().map(|t| t.to_rfc3339()),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Evaluate the script as `args` describe, or only compile it with `--check`.
fn evaluate(args: &Args) -> Result<Option<TimedValue>> {
    let config = ScriptConfig::load_from(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;
    let executor = ScriptExecutor::new(config);

    if args.check {
        executor.validate(&script)?;
        return Ok(None);
    }

    let points = match &args.points {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read points file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid points file {}", path.display()))?
        }
        None => PointsFile::default(),
    };

    let registry = MemoryPointRegistry::new();
    let mut entries: Vec<(PointId, String)> = Vec::with_capacity(points.points.len());
    for bound in points.points {
        entries.push((bound.snapshot.id, bound.alias.clone()));
        let point = MemoryPoint::from_snapshot(bound.snapshot)
            .with_context(|| format!("Invalid history for point '{}'", bound.alias))?;
        registry.insert(point);
    }

    let runtime = args
        .runtime
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let timestamp = args.timestamp.unwrap_or(runtime);

    let result = executor.evaluate(&registry, &entries, &script, runtime, args.target, timestamp)?;
    Ok(Some(result))
}
