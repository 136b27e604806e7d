//! Core library for meta point evaluation.
//!
//! A meta point is a virtual data point whose value is computed by a user
//! script from other live points. This library resolves the script's point
//! context, evaluates the script with Rhai, and coerces the result into one of
//! the four point data types. It is used by the `script_runner` tool and by
//! hosts that schedule meta point updates.

pub mod config;
pub mod context;
pub mod core;
pub mod data;
pub mod error;
pub mod scripting;

pub use crate::config::ScriptConfig;
pub use crate::context::{resolve, ExecutionContext, WrapperContext};
pub use crate::core::{DataType, DomainValue, PointId, TimedValue};
pub use crate::error::{AppResult, MetaError};
pub use crate::scripting::{ScriptError, ScriptExecutor};
