//! Common data structures.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Index of a node inside a snapshot container.
pub type Ndx = usize;
/// Index of an instance inside a snapshot container.
pub type Idx = usize;
/// Index of a node group.
pub type Gdx = usize;

/// Reason why capacity arithmetic rejected placing an instance on a node.
///
/// The declaration order is a public contract: the tiered allocator
/// collapses failures into a histogram in this order and resolves
/// equal counts towards the variant declared last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter,
)]
pub enum FailMode {
    NotEnoughMemory,
    NotEnoughDisk,
    NotEnoughCpu,
    N1Violation,
    TagConflict,
    DiskCountExceeded,
    NotEnoughSpindles,
    UnsupportedDiskTemplate,
    NetworkUnreachable,
}

/// Result of a capacity-checked operation. Failures are values that the
/// search algorithms collect and count; they are never thrown.
pub type OpResult<T> = Result<T, FailMode>;

/// Dynamic utilization across the four tracked resources (cpu, memory,
/// disk and network), used for secondary load-based balancing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynUtil {
    pub cpu: f64,
    pub mem: f64,
    pub dsk: f64,
    pub net: f64,
}

impl DynUtil {
    pub fn zero() -> Self {
        Self {
            cpu: 0.,
            mem: 0.,
            dsk: 0.,
            net: 0.,
        }
    }

    /// Unit utilization, the capacity share of a node that has not
    /// declared an explicit pool.
    pub fn base() -> Self {
        Self {
            cpu: 1.,
            mem: 1.,
            dsk: 1.,
            net: 1.,
        }
    }

    pub fn add(&self, other: &DynUtil) -> Self {
        Self {
            cpu: self.cpu + other.cpu,
            mem: self.mem + other.mem,
            dsk: self.dsk + other.dsk,
            net: self.net + other.net,
        }
    }

    pub fn sub(&self, other: &DynUtil) -> Self {
        Self {
            cpu: self.cpu - other.cpu,
            mem: self.mem - other.mem,
            dsk: self.dsk - other.dsk,
            net: self.net - other.net,
        }
    }
}

impl Default for DynUtil {
    fn default() -> Self {
        Self::zero()
    }
}
