//! Point contexts for a single script execution.
//!
//! A meta point is configured with a list of `(point id, alias)` pairs. Before
//! a script runs, [`resolve`] turns those pairs into an [`ExecutionContext`] by
//! looking each id up in the live [`PointRegistry`]. Resolution fails fast: if
//! any point is missing, no context is returned and no script runs.

use std::collections::btree_map::{self, BTreeMap};
use tracing::warn;

use crate::core::PointId;
use crate::data::{PointHandle, PointRegistry};
use crate::error::{AppResult, MetaError};

/// Alias → point bindings for one execution.
///
/// Built fresh for each invocation and never reused across calls. Aliases are
/// unique by construction.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    points: BTreeMap<String, PointHandle>,
}

impl ExecutionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `alias` to `point`, returning the binding it replaced, if any.
    pub fn insert(&mut self, alias: impl Into<String>, point: PointHandle) -> Option<PointHandle> {
        self.points.insert(alias.into(), point)
    }

    /// The point bound to `alias`.
    pub fn get(&self, alias: &str) -> Option<&PointHandle> {
        self.points.get(alias)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the context has no bindings.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bindings in alias order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, PointHandle> {
        self.points.iter()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.points.iter().map(|(alias, point)| (alias, point.id())))
            .finish()
    }
}

impl<'a> IntoIterator for &'a ExecutionContext {
    type Item = (&'a String, &'a PointHandle);
    type IntoIter = btree_map::Iter<'a, String, PointHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Resolve `(point id, alias)` entries against the registry.
///
/// # Errors
///
/// Returns [`MetaError::PointResolution`] for the first id the registry does
/// not know. Aliases are not checked here; a repeated alias replaces the
/// earlier binding.
pub fn resolve<R>(registry: &R, entries: &[(PointId, String)]) -> AppResult<ExecutionContext>
where
    R: PointRegistry + ?Sized,
{
    let mut context = ExecutionContext::new();
    for (id, alias) in entries {
        let point = registry
            .lookup(*id)
            .ok_or(MetaError::PointResolution(*id))?;
        if let Some(previous) = context.insert(alias.clone(), point) {
            warn!(
                alias = %alias,
                replaced = previous.id(),
                point = id,
                "Duplicate alias in script context"
            );
        }
    }
    Ok(context)
}

/// Execution-time state shared by every point wrapper of one execution.
///
/// Carries the logical instant the script runs at, which relative-time
/// helpers such as `point.ago(HOUR)` measure from. Exposed to scripts as
/// `CONTEXT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapperContext {
    runtime: i64,
}

impl WrapperContext {
    /// Context for an execution at `runtime` (epoch milliseconds).
    pub fn new(runtime: i64) -> Self {
        Self { runtime }
    }

    /// The logical execution instant.
    pub fn runtime(&self) -> i64 {
        self.runtime
    }
}
