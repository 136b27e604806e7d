//! Script evaluation for meta points.
//!
//! A meta point derives its value from a user script that reads other live
//! points. This module binds those points into a Rhai scope, runs the script
//! in a sandboxed engine, and converts the result into a typed value.
//!
//! # Architecture
//!
//! ```text
//! ScriptExecutor
//!     ├── FunctionLibrary   (helper functions, loaded once per process)
//!     ├── EngineSession     (sandboxed engine for one evaluation)
//!     ├── bindings          (PointTable of BinaryPoint, MultistatePoint, NumericPoint, AlphanumericPoint)
//!     ├── coercion          (script result -> DomainValue)
//!     └── diagnostics       (Rhai error -> ScriptError with line number)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let executor = ScriptExecutor::new(ScriptConfig::load()?);
//! let context = resolve(&registry, &[(1, "temperature".to_string())])?;
//!
//! let result = executor.execute(
//!     "if temperature > 80.0 { return temperature.ago(HOUR); }",
//!     &context,
//!     now_ms,
//!     DataType::Numeric,
//!     now_ms,
//! )?;
//! ```

pub mod bindings;
pub mod coercion;
pub mod diagnostics;
pub mod executor;
pub mod library;

pub use bindings::{
    register_bindings, AlphanumericPoint, BinaryPoint, MultistatePoint, NumericPoint,
    PointBinding, PointCapability, PointTable, ScriptBinding,
};
pub use coercion::{coerce, marshal, RawResult};
pub use diagnostics::{translate, ScriptError, ScriptErrorKind};
pub use executor::{EngineSession, ScriptExecutor};
pub use library::FunctionLibrary;
