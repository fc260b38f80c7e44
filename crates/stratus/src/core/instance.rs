//! Instance model: resource demands, disk templates and mirroring.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::core::common::{DynUtil, FailMode, Idx, Ndx, OpResult};
use crate::core::container::Element;
use crate::core::error::{EngineError, EngineResult};
use crate::core::policy::Policy;

/// Shrink step granularity used by the tiered allocator.
pub const UNIT_MEM: i64 = 64;
pub const UNIT_DSK: i64 = 256;
pub const UNIT_CPU: i64 = 1;

/// Storage backend of an instance's disks. The `Display` names are the
/// external (wire) spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DiskTemplate {
    #[strum(serialize = "diskless")]
    Diskless,
    #[strum(serialize = "plain")]
    Plain,
    #[strum(serialize = "file")]
    File,
    #[strum(serialize = "sharedfile")]
    SharedFile,
    #[strum(serialize = "blockdev")]
    Block,
    #[strum(serialize = "rbd")]
    Rbd,
    #[strum(serialize = "ext")]
    Ext,
    #[strum(serialize = "drbd")]
    Drbd8,
}

impl DiskTemplate {
    pub fn all() -> Vec<DiskTemplate> {
        vec![
            DiskTemplate::Diskless,
            DiskTemplate::Plain,
            DiskTemplate::File,
            DiskTemplate::SharedFile,
            DiskTemplate::Block,
            DiskTemplate::Rbd,
            DiskTemplate::Ext,
            DiskTemplate::Drbd8,
        ]
    }

    pub fn mirror_type(&self) -> MirrorType {
        match self {
            DiskTemplate::Drbd8 => MirrorType::Internal,
            DiskTemplate::Diskless
            | DiskTemplate::SharedFile
            | DiskTemplate::Block
            | DiskTemplate::Rbd
            | DiskTemplate::Ext => MirrorType::External,
            DiskTemplate::Plain | DiskTemplate::File => MirrorType::None,
        }
    }

    /// Whether disks of this template live on the hosting node itself
    /// and therefore consume its disk capacity.
    pub fn uses_local_storage(&self) -> bool {
        matches!(
            self,
            DiskTemplate::Plain | DiskTemplate::File | DiskTemplate::Drbd8
        )
    }

    /// Whether this template occupies physical spindles, which is what
    /// exclusive-storage nodes account for.
    pub fn uses_spindles(&self) -> bool {
        matches!(
            self,
            DiskTemplate::Plain | DiskTemplate::Block | DiskTemplate::Drbd8
        )
    }
}

/// How an instance's storage is replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorType {
    /// No replication; the instance is pinned to its node.
    None,
    /// Two-node synchronous replication with a distinct secondary.
    Internal,
    /// Replication handled outside the cluster; no secondary node.
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nic {
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub idx: Idx,
    pub name: String,
    pub alias: String,
    pub mem: i64,
    pub dsk: i64,
    pub vcpus: i64,
    pub running: bool,
    pub pnode: Ndx,
    /// Secondary node; `None` for templates without an internal mirror.
    pub snode: Option<Ndx>,
    pub disk_template: DiskTemplate,
    pub disk_count: i64,
    pub spindle_use: i64,
    pub util: DynUtil,
    pub movable: bool,
    pub auto_balance: bool,
    /// Exclusion tags; two instances sharing a tag conflict on a node.
    pub excl_tags: Vec<String>,
    pub nics: Vec<Nic>,
}

impl Instance {
    pub fn new(
        idx: Idx,
        name: &str,
        mem: i64,
        dsk: i64,
        vcpus: i64,
        running: bool,
        pnode: Ndx,
        snode: Option<Ndx>,
        disk_template: DiskTemplate,
    ) -> Self {
        Self {
            idx,
            name: name.to_string(),
            alias: name.to_string(),
            mem,
            dsk,
            vcpus,
            running,
            pnode,
            snode,
            disk_template,
            disk_count: 1,
            spindle_use: 1,
            util: DynUtil::zero(),
            movable: true,
            auto_balance: true,
            excl_tags: Vec::new(),
            nics: Vec::new(),
        }
    }

    pub fn mirror_type(&self) -> MirrorType {
        self.disk_template.mirror_type()
    }

    pub fn uses_local_storage(&self) -> bool {
        self.disk_template.uses_local_storage()
    }

    pub fn has_secondary(&self) -> bool {
        self.snode.is_some()
    }

    /// Number of nodes an allocation of this instance occupies.
    pub fn required_nodes(&self) -> usize {
        if self.mirror_type() == MirrorType::Internal {
            2
        } else {
            1
        }
    }

    /// All nodes hosting any role of this instance.
    pub fn all_nodes(&self) -> Vec<Ndx> {
        match self.snode {
            Some(s) => vec![self.pnode, s],
            None => vec![self.pnode],
        }
    }

    pub fn set_primary(&self, pnode: Ndx) -> Instance {
        let mut i = self.clone();
        i.pnode = pnode;
        i
    }

    pub fn set_secondary(&self, snode: Option<Ndx>) -> Instance {
        let mut i = self.clone();
        i.snode = snode;
        i
    }

    pub fn set_both(&self, pnode: Ndx, snode: Option<Ndx>) -> Instance {
        let mut i = self.clone();
        i.pnode = pnode;
        i.snode = snode;
        i
    }

    /// Validates this instance against a node policy. Returns the first
    /// violated constraint as a typed failure.
    pub fn matches_policy(&self, policy: &Policy, excl_storage: bool) -> OpResult<()> {
        let min = &policy.min_spec;
        let max = &policy.max_spec;
        if self.mem < min.mem_size || self.mem > max.mem_size {
            return Err(FailMode::NotEnoughMemory);
        }
        if self.dsk < min.disk_size || self.dsk > max.disk_size {
            return Err(FailMode::NotEnoughDisk);
        }
        if self.disk_count < min.disk_count || self.disk_count > max.disk_count {
            return Err(FailMode::DiskCountExceeded);
        }
        if self.vcpus < min.cpu_count || self.vcpus > max.cpu_count {
            return Err(FailMode::NotEnoughCpu);
        }
        if self.spindle_use < min.spindle_use || self.spindle_use > max.spindle_use {
            return Err(FailMode::NotEnoughSpindles);
        }
        if !policy.disk_templates.contains(&self.disk_template) {
            return Err(FailMode::UnsupportedDiskTemplate);
        }
        if excl_storage && !self.disk_template.uses_spindles() {
            return Err(FailMode::UnsupportedDiskTemplate);
        }
        Ok(())
    }

    /// Shrinks the spec along the resource dimension named by the
    /// failure mode, by one allocation unit.
    pub fn shrink_by_type(&self, fm: FailMode) -> EngineResult<Instance> {
        match fm {
            FailMode::NotEnoughMemory => {
                let v = self.mem - UNIT_MEM;
                if v < UNIT_MEM {
                    Err(EngineError::Plan("out of memory".to_string()))
                } else {
                    let mut i = self.clone();
                    i.mem = v;
                    Ok(i)
                }
            }
            FailMode::NotEnoughDisk => {
                let v = self.dsk - UNIT_DSK;
                if v < UNIT_DSK {
                    Err(EngineError::Plan("out of disk".to_string()))
                } else {
                    let mut i = self.clone();
                    i.dsk = v;
                    Ok(i)
                }
            }
            FailMode::NotEnoughCpu => {
                let v = self.vcpus - UNIT_CPU;
                if v < UNIT_CPU {
                    Err(EngineError::Plan("out of vcpus".to_string()))
                } else {
                    let mut i = self.clone();
                    i.vcpus = v;
                    Ok(i)
                }
            }
            other => Err(EngineError::Plan(format!(
                "unhandled failure mode {} in shrink",
                other
            ))),
        }
    }
}

impl Element for Instance {
    fn index(&self) -> usize {
        self.idx
    }

    fn name(&self) -> &str {
        &self.name
    }
}
