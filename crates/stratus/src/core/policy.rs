//! Instance policies: per-resource bounds and capacity ratios.

use serde::{Deserialize, Serialize};

use crate::core::instance::DiskTemplate;

/// Bounds for one end of the allowed instance spec range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ISpec {
    pub mem_size: i64,
    pub disk_size: i64,
    pub disk_count: i64,
    pub cpu_count: i64,
    pub spindle_use: i64,
}

impl ISpec {
    pub fn zero() -> Self {
        Self {
            mem_size: 0,
            disk_size: 0,
            disk_count: 0,
            cpu_count: 0,
            spindle_use: 0,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            mem_size: i64::MAX,
            disk_size: i64::MAX,
            disk_count: i64::MAX,
            cpu_count: i64::MAX,
            spindle_use: i64::MAX,
        }
    }
}

/// Policy attached to a node (through its group): min/max instance
/// specs, the accepted disk templates and the over-subscription ratios
/// that derive the node's CPU and spindle high watermarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub min_spec: ISpec,
    pub max_spec: ISpec,
    pub disk_templates: Vec<DiskTemplate>,
    /// Virtual-to-physical CPU ratio; non-positive means unlimited.
    pub vcpu_ratio: f64,
    /// Spindle over-subscription ratio for exclusive-storage nodes.
    pub spindle_ratio: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_spec: ISpec::zero(),
            max_spec: ISpec::unbounded(),
            disk_templates: DiskTemplate::all(),
            vcpu_ratio: 4.0,
            spindle_ratio: 32.0,
        }
    }
}
