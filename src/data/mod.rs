//! Point data access.

pub mod registry;

pub use registry::{
    MemoryPoint, MemoryPointRegistry, PointHandle, PointReference, PointRegistry, PointSnapshot,
};
