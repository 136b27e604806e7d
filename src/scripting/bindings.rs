//! Point Bindings for Rhai Scripts
//!
//! This module exposes live points to scripts. Each point in the execution
//! context is pushed into the script scope under its alias as a plain Rhai
//! scalar, so the language's own operators, conditions, `switch` and string
//! functions all apply to it directly:
//!
//! - Binary points are `bool`
//! - Multistate points are `INT`
//! - Numeric points are `FLOAT`
//! - Alphanumeric points are strings
//!
//! The scalar carries a tag that links it back to its entry in the
//! execution's [`PointTable`]. The helpers `.time`, `.data_type`, `.value`,
//! `.ago(duration)`, `.ago(period, count)` and `.set(value)` look the point up
//! through that tag. Numeric points add `.past(duration)`. Values computed from
//! a point carry no tag, so the helpers reject them.
//!
//! A binding snapshots the point's value when it is built, so a script sees a
//! consistent value for its whole run. A script that returns a point variable
//! unchanged yields exactly that snapshot.
//!
//! # Script Example
//! ```rhai
//! if temperature > 80.0 && !override_switch {
//!     return temperature - temperature.ago(HOUR);
//! }
//! ```

use rhai::{Dynamic, Engine, EvalAltResult, Map, Position, FLOAT, INT};
use std::sync::Arc;
use tracing::warn;

use crate::context::WrapperContext;
use crate::core::{DataType, DomainValue, TimedValue};
use crate::data::PointHandle;
use crate::scripting::coercion::{coerce, marshal};

// =============================================================================
// Capabilities
// =============================================================================

/// What a script may do with a bound point.
///
/// Implemented by every wrapper so that the executor, and any other runtime
/// interop layer, can treat bindings uniformly.
pub trait PointCapability {
    /// The value of the point when the wrapper was built.
    fn read_value(&self) -> DomainValue;

    /// Timestamp of that value (epoch milliseconds, 0 if the point had none).
    fn read_timestamp(&self) -> i64;

    /// The value in effect `duration_ms` before the execution's runtime.
    fn read_historical(&self, duration_ms: i64) -> Option<TimedValue>;
}

/// A wrapper as the script engine sees it.
pub trait ScriptBinding: PointCapability + Send + Sync {
    /// Name of the wrapper, used in messages.
    fn type_name(&self) -> &'static str;

    /// The shared binding state.
    fn binding(&self) -> &PointBinding;

    /// The snapshot as an untagged Rhai scalar.
    fn scalar(&self) -> Dynamic {
        to_dynamic(self.read_value())
    }

    /// Statistics over the samples recorded in the last `duration_ms`.
    ///
    /// `None` for wrappers without numeric history.
    fn past(&self, _duration_ms: INT) -> Option<Map> {
        None
    }
}

/// Point handle plus the execution state every wrapper carries.
#[derive(Clone)]
pub struct PointBinding {
    point: PointHandle,
    snapshot: Option<TimedValue>,
    context: WrapperContext,
}

impl PointBinding {
    /// Snapshot `point` for an execution running under `context`.
    pub fn new(point: PointHandle, context: WrapperContext) -> Self {
        let snapshot = point.current_value();
        Self {
            point,
            snapshot,
            context,
        }
    }

    fn value(&self) -> DomainValue {
        match &self.snapshot {
            Some(sample) => sample.value.clone(),
            None => self.point.data_type().zero_value(),
        }
    }

    fn timestamp(&self) -> i64 {
        self.snapshot.as_ref().map_or(0, |sample| sample.timestamp)
    }

    fn historical(&self, duration_ms: i64) -> Option<TimedValue> {
        let instant = self.context.runtime().checked_sub(duration_ms)?;
        self.point.history_lookup(instant)
    }

    fn window(&self, duration_ms: i64) -> Vec<TimedValue> {
        let to = self.context.runtime();
        let from = to.saturating_sub(duration_ms);
        self.point.history_between(from, to)
    }

    fn write(&self, value: Dynamic) -> Result<(), Box<EvalAltResult>> {
        let data_type = self.point.data_type();
        let value = coerce(marshal(value, None, None), data_type).map_err(runtime_error)?;
        self.point
            .set_value(TimedValue::new(value, self.context.runtime()))
            .map_err(runtime_error)
    }
}

impl std::fmt::Debug for PointBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointBinding")
            .field("point", &self.point.id())
            .field("snapshot", &self.snapshot)
            .field("context", &self.context)
            .finish()
    }
}

fn runtime_error(err: impl std::fmt::Display) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        err.to_string().into(),
        Position::NONE,
    ))
}

// =============================================================================
// Wrapper Types
// =============================================================================

macro_rules! point_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name {
            inner: PointBinding,
        }

        impl $name {
            /// Wrap a bound point.
            pub fn new(inner: PointBinding) -> Self {
                Self { inner }
            }
        }

        impl PointCapability for $name {
            fn read_value(&self) -> DomainValue {
                self.inner.value()
            }

            fn read_timestamp(&self) -> i64 {
                self.inner.timestamp()
            }

            fn read_historical(&self, duration_ms: i64) -> Option<TimedValue> {
                self.inner.historical(duration_ms)
            }
        }
    };
}

point_wrapper!(
    /// Binary point, seen by scripts as a `bool`.
    BinaryPoint
);
point_wrapper!(
    /// Multistate point, seen by scripts as an `INT`.
    MultistatePoint
);
point_wrapper!(
    /// Numeric point, seen by scripts as a `FLOAT`.
    NumericPoint
);
point_wrapper!(
    /// Alphanumeric point, seen by scripts as a string.
    AlphanumericPoint
);

impl ScriptBinding for BinaryPoint {
    fn type_name(&self) -> &'static str {
        "BinaryPoint"
    }

    fn binding(&self) -> &PointBinding {
        &self.inner
    }
}

impl ScriptBinding for MultistatePoint {
    fn type_name(&self) -> &'static str {
        "MultistatePoint"
    }

    fn binding(&self) -> &PointBinding {
        &self.inner
    }
}

impl ScriptBinding for NumericPoint {
    fn type_name(&self) -> &'static str {
        "NumericPoint"
    }

    fn binding(&self) -> &PointBinding {
        &self.inner
    }

    fn past(&self, duration_ms: INT) -> Option<Map> {
        let values: Vec<FLOAT> = self
            .inner
            .window(duration_ms)
            .iter()
            .filter_map(|sample| sample.value.as_f64())
            .collect();

        let mut stats = Map::new();
        stats.insert("count".into(), Dynamic::from(values.len() as INT));
        if values.is_empty() {
            for key in ["minimum", "maximum", "average", "sum", "first", "last"] {
                stats.insert(key.into(), Dynamic::UNIT);
            }
            return Some(stats);
        }

        let sum: FLOAT = values.iter().sum();
        let minimum = values.iter().copied().fold(FLOAT::INFINITY, FLOAT::min);
        let maximum = values.iter().copied().fold(FLOAT::NEG_INFINITY, FLOAT::max);
        stats.insert("minimum".into(), Dynamic::from(minimum));
        stats.insert("maximum".into(), Dynamic::from(maximum));
        stats.insert("sum".into(), Dynamic::from(sum));
        stats.insert("average".into(), Dynamic::from(sum / values.len() as FLOAT));
        stats.insert("first".into(), Dynamic::from(values[0]));
        stats.insert("last".into(), Dynamic::from(values[values.len() - 1]));
        Some(stats)
    }
}

impl ScriptBinding for AlphanumericPoint {
    fn type_name(&self) -> &'static str {
        "AlphanumericPoint"
    }

    fn binding(&self) -> &PointBinding {
        &self.inner
    }
}

fn to_dynamic(value: DomainValue) -> Dynamic {
    match value {
        DomainValue::Binary(b) => Dynamic::from(b),
        DomainValue::Multistate(m) => Dynamic::from(INT::from(m)),
        DomainValue::Numeric(n) => Dynamic::from(n),
        DomainValue::Alphanumeric(s) => Dynamic::from(s),
    }
}

/// Whether `value` is the scalar form of `expected`.
fn holds(value: &Dynamic, expected: &DomainValue) -> bool {
    match expected {
        DomainValue::Binary(b) => value.as_bool() == Ok(*b),
        DomainValue::Multistate(m) => value.as_int() == Ok(INT::from(*m)),
        DomainValue::Numeric(n) => value
            .as_float()
            .is_ok_and(|f| f.to_bits() == n.to_bits()),
        DomainValue::Alphanumeric(s) => value
            .clone()
            .into_immutable_string()
            .is_ok_and(|text| text.as_str() == s),
    }
}

// =============================================================================
// Point Table
// =============================================================================

/// The points bound into one execution, indexed by the tag on their scalars.
///
/// Tag 0 is Rhai's default, so the binding at index `i` is tagged `i + 1`.
/// Tags fit in an `i16` on every target.
#[derive(Default)]
pub struct PointTable {
    bindings: Vec<Box<dyn ScriptBinding>>,
}

impl PointTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `point` according to its data type and return its tagged scalar.
    pub fn bind(&mut self, point: PointHandle, context: WrapperContext) -> Dynamic {
        let id = point.id();
        let data_type = point.data_type();
        let binding = PointBinding::new(point, context);
        let wrapper: Box<dyn ScriptBinding> = match data_type {
            DataType::Binary => Box::new(BinaryPoint::new(binding)),
            DataType::Multistate => Box::new(MultistatePoint::new(binding)),
            DataType::Numeric => Box::new(NumericPoint::new(binding)),
            DataType::Alphanumeric => Box::new(AlphanumericPoint::new(binding)),
        };

        let mut value = wrapper.scalar();
        self.bindings.push(wrapper);
        match i16::try_from(self.bindings.len()) {
            Ok(tag) => {
                value.set_tag(tag.into());
            }
            Err(_) => warn!(point = id, "Too many bindings to tag, point helpers unavailable"),
        }
        value
    }

    /// The binding `value` was created by, if it still carries its tag.
    pub fn lookup(&self, value: &Dynamic) -> Option<&dyn ScriptBinding> {
        let index = usize::try_from(value.tag()).ok()?.checked_sub(1)?;
        self.bindings.get(index).map(|binding| binding.as_ref())
    }

    /// The wrapped value, if `value` is a point variable returned unchanged.
    pub fn identify(&self, value: &Dynamic) -> Option<DomainValue> {
        let snapshot = self.lookup(value)?.read_value();
        holds(value, &snapshot).then_some(snapshot)
    }

    /// Number of bound points.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no point is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn require(&self, value: &Dynamic, member: &str) -> Result<&dyn ScriptBinding, Box<EvalAltResult>> {
        self.lookup(value)
            .ok_or_else(|| runtime_error(format!("'{}' is only available on point variables", member)))
    }
}

impl std::fmt::Debug for PointTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|binding| binding.binding()))
            .finish()
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Register the point helpers for `points`, and `CONTEXT`, with the engine.
///
/// The helpers accept any value and resolve the point through its tag.
pub fn register_bindings(engine: &mut Engine, points: Arc<PointTable>) {
    let table = points.clone();
    engine.register_get("time", move |v: &mut Dynamic| -> Result<INT, Box<EvalAltResult>> {
        Ok(table.require(v, "time")?.read_timestamp())
    });

    let table = points.clone();
    engine.register_get(
        "data_type",
        move |v: &mut Dynamic| -> Result<String, Box<EvalAltResult>> {
            let binding = table.require(v, "data_type")?;
            Ok(binding.binding().point.data_type().name().to_string())
        },
    );

    let table = points.clone();
    engine.register_get("value", move |v: &mut Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
        Ok(table.require(v, "value")?.scalar())
    });

    // point.ago(HOUR) - value in effect one hour before runtime, () if unknown
    let table = points.clone();
    engine.register_fn(
        "ago",
        move |v: &mut Dynamic, duration: INT| -> Result<Dynamic, Box<EvalAltResult>> {
            let binding = table.require(v, "ago")?;
            Ok(binding
                .read_historical(duration)
                .map_or(Dynamic::UNIT, |sample| to_dynamic(sample.value)))
        },
    );
    // point.ago(MINUTE, 15)
    let table = points.clone();
    engine.register_fn(
        "ago",
        move |v: &mut Dynamic, period: INT, count: INT| -> Result<Dynamic, Box<EvalAltResult>> {
            let binding = table.require(v, "ago")?;
            Ok(period
                .checked_mul(count)
                .and_then(|duration| binding.read_historical(duration))
                .map_or(Dynamic::UNIT, |sample| to_dynamic(sample.value)))
        },
    );

    let table = points.clone();
    engine.register_fn(
        "past",
        move |v: &mut Dynamic, duration: INT| -> Result<Map, Box<EvalAltResult>> {
            let binding = table.require(v, "past")?;
            binding.past(duration).ok_or_else(|| {
                runtime_error(format!(
                    "'past' needs a Numeric point, not a {}",
                    binding.type_name()
                ))
            })
        },
    );

    let table = points;
    engine.register_fn(
        "set",
        move |v: &mut Dynamic, value: Dynamic| -> Result<(), Box<EvalAltResult>> {
            table.require(v, "set")?.binding().write(value)
        },
    );

    // Tags link scalars to their points.
    engine.register_set("tag", |_: &mut Dynamic, _: INT| -> Result<(), Box<EvalAltResult>> {
        Err(runtime_error("Value tags are read-only"))
    });
    engine.register_fn("set_tag", |_: &mut Dynamic, _: INT| -> Result<(), Box<EvalAltResult>> {
        Err(runtime_error("Value tags are read-only"))
    });

    engine.register_type_with_name::<WrapperContext>("Context");
    engine.register_get("runtime", |c: &mut WrapperContext| c.runtime());
}
