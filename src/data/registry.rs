//! Point registry interface and an in-memory implementation.
//!
//! The registry that owns live points lives outside this crate. Evaluation only
//! needs to look points up by id and read their current and historical values,
//! which is what [`PointRegistry`] and [`PointReference`] describe.
//!
//! [`MemoryPointRegistry`] is a complete in-process implementation used by the
//! script runner tool and by tests.

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::{DataType, DomainValue, PointId, TimedValue};

/// Shared handle to a registry-owned point.
pub type PointHandle = Arc<dyn PointReference>;

/// Read access to one live point, plus optional write-back.
pub trait PointReference: Send + Sync {
    /// Registry id of the point.
    fn id(&self) -> PointId;

    /// Data type tag of the point.
    fn data_type(&self) -> DataType;

    /// Latest value, or `None` if the point has never been set.
    fn current_value(&self) -> Option<TimedValue>;

    /// The value in effect at `instant` (the latest sample at or before it).
    fn history_lookup(&self, instant: i64) -> Option<TimedValue>;

    /// Samples with timestamps in `[from, to]`, oldest first.
    fn history_between(&self, _from: i64, _to: i64) -> Vec<TimedValue> {
        Vec::new()
    }

    /// Schedule an update of the point. Points are read-only unless they say otherwise.
    fn set_value(&self, _value: TimedValue) -> Result<()> {
        Err(anyhow!("Point {} is not settable", self.id()))
    }
}

/// Lookup of live points by id.
pub trait PointRegistry: Send + Sync {
    /// Find a point, or `None` if it is not running.
    fn lookup(&self, id: PointId) -> Option<PointHandle>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// Serializable description of a point, as read by the script runner tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PointSnapshot {
    /// Registry id.
    pub id: PointId,
    /// Data type tag.
    pub data_type: DataType,
    /// Whether scripts may write the point.
    #[serde(default)]
    pub settable: bool,
    /// Samples, in any order.
    #[serde(default)]
    pub history: Vec<TimedValue>,
}

/// A point whose history is kept in memory.
#[derive(Debug)]
pub struct MemoryPoint {
    id: PointId,
    data_type: DataType,
    settable: bool,
    history: RwLock<Vec<TimedValue>>,
}

impl MemoryPoint {
    /// Create a read-only point with no value.
    pub fn new(id: PointId, data_type: DataType) -> Self {
        Self {
            id,
            data_type,
            settable: false,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Allow scripts to write this point.
    pub fn settable(mut self) -> Self {
        self.settable = true;
        self
    }

    /// Add a sample while building the point.
    ///
    /// # Errors
    ///
    /// Fails if `value` is not of the point's data type.
    pub fn with_value(self, value: DomainValue, timestamp: i64) -> Result<Self> {
        self.record(TimedValue::new(value, timestamp))?;
        Ok(self)
    }

    /// Build a point from its serialized description.
    ///
    /// # Errors
    ///
    /// Fails on the first sample whose value is not of the point's data type.
    pub fn from_snapshot(snapshot: PointSnapshot) -> Result<Self> {
        let point = Self {
            id: snapshot.id,
            data_type: snapshot.data_type,
            settable: snapshot.settable,
            history: RwLock::new(Vec::new()),
        };
        for sample in snapshot.history {
            point.record(sample)?;
        }
        Ok(point)
    }

    /// Insert a sample, keeping history ordered by timestamp.
    ///
    /// A sample whose timestamp equals an existing one replaces it.
    ///
    /// # Errors
    ///
    /// Fails if the sample is not of the point's data type. Nothing is stored.
    pub fn record(&self, sample: TimedValue) -> Result<()> {
        if sample.value.data_type() != self.data_type {
            return Err(anyhow!(
                "Point {} expects {} values, got {}",
                self.id,
                self.data_type,
                sample.value.data_type()
            ));
        }
        let mut history = self.history.write();
        match history.binary_search_by_key(&sample.timestamp, |s| s.timestamp) {
            Ok(index) => history[index] = sample,
            Err(index) => history.insert(index, sample),
        }
        Ok(())
    }

    /// Number of stored samples.
    pub fn sample_count(&self) -> usize {
        self.history.read().len()
    }
}

impl PointReference for MemoryPoint {
    fn id(&self) -> PointId {
        self.id
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn current_value(&self) -> Option<TimedValue> {
        self.history.read().last().cloned()
    }

    fn history_lookup(&self, instant: i64) -> Option<TimedValue> {
        let history = self.history.read();
        let end = history.partition_point(|s| s.timestamp <= instant);
        end.checked_sub(1).map(|index| history[index].clone())
    }

    fn history_between(&self, from: i64, to: i64) -> Vec<TimedValue> {
        self.history
            .read()
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp <= to)
            .cloned()
            .collect()
    }

    fn set_value(&self, value: TimedValue) -> Result<()> {
        if !self.settable {
            return Err(anyhow!("Point {} is not settable", self.id));
        }
        self.record(value.clone())?;
        debug!(point = self.id, value = %value, "Point updated by script");
        Ok(())
    }
}

/// Registry backed by a map of [`MemoryPoint`]s.
#[derive(Default)]
pub struct MemoryPointRegistry {
    points: RwLock<HashMap<PointId, Arc<MemoryPoint>>>,
}

impl MemoryPointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a point, replacing any point with the same id.
    pub fn insert(&self, point: MemoryPoint) -> Arc<MemoryPoint> {
        let point = Arc::new(point);
        self.points.write().insert(point.id, point.clone());
        point
    }

    /// Remove a point, as if it had been stopped.
    pub fn remove(&self, id: PointId) -> Option<Arc<MemoryPoint>> {
        self.points.write().remove(&id)
    }
}

impl PointRegistry for MemoryPointRegistry {
    fn lookup(&self, id: PointId) -> Option<PointHandle> {
        self.points
            .read()
            .get(&id)
            .map(|point| point.clone() as PointHandle)
    }
}
