//! Node model and capacity arithmetic.
//!
//! All operations are pure: a successful add/remove returns a new node
//! value, a failed one returns the violated constraint as a
//! [`FailMode`]. The reserved-memory bookkeeping implements the N+1
//! model: for every peer primary node, the memory of instances mirrored
//! here is summed, and the largest such sum must fit into free memory
//! so that any single peer failure can be absorbed.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::common::{DynUtil, FailMode, Gdx, Idx, Ndx, OpResult};
use crate::core::container::Element;
use crate::core::instance::Instance;
use crate::core::policy::Policy;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub idx: Ndx,
    pub name: String,
    pub alias: String,
    pub group: Gdx,

    // static capacity
    pub t_mem: i64,
    pub t_dsk: i64,
    pub t_cpu: i64,
    /// Memory used by the node itself.
    pub n_mem: i64,
    /// Memory unaccounted for by any instance or the node.
    pub x_mem: i64,
    pub spindle_count: i64,
    pub hi_cpu: i64,
    pub hi_spindles: f64,

    // dynamic state
    pub f_mem: i64,
    pub f_dsk: i64,
    pub r_mem: i64,
    pub u_cpu: i64,
    pub inst_spindles: i64,
    /// Per peer-primary sums of mirrored instance memory.
    pub peers: BTreeMap<Ndx, i64>,
    pub p_list: Vec<Idx>,
    pub s_list: Vec<Idx>,
    /// Exclusion-tag multiset over hosted primaries.
    pub p_tags: BTreeMap<String, i64>,
    pub util_load: DynUtil,
    pub util_pool: DynUtil,

    pub offline: bool,
    pub excl_storage: bool,
    pub policy: Policy,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        idx: Ndx,
        name: &str,
        group: Gdx,
        t_mem: i64,
        n_mem: i64,
        f_mem: i64,
        t_dsk: i64,
        f_dsk: i64,
        t_cpu: i64,
        offline: bool,
    ) -> Self {
        let mut node = Self {
            idx,
            name: name.to_string(),
            alias: name.to_string(),
            group,
            t_mem,
            t_dsk,
            t_cpu,
            n_mem,
            x_mem: 0,
            spindle_count: 1,
            hi_cpu: 0,
            hi_spindles: 0.,
            f_mem,
            f_dsk,
            r_mem: 0,
            u_cpu: 0,
            inst_spindles: 0,
            peers: BTreeMap::new(),
            p_list: Vec::new(),
            s_list: Vec::new(),
            p_tags: BTreeMap::new(),
            util_load: DynUtil::zero(),
            util_pool: DynUtil::base(),
            offline,
            excl_storage: false,
            policy: Policy::default(),
        };
        node.recompute_watermarks();
        node
    }

    /// Installs a policy and rederives the CPU and spindle watermarks.
    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
        self.recompute_watermarks();
    }

    fn recompute_watermarks(&mut self) {
        self.hi_cpu = if self.policy.vcpu_ratio > 0. {
            (self.t_cpu as f64 * self.policy.vcpu_ratio) as i64
        } else {
            -1
        };
        self.hi_spindles = self.policy.spindle_ratio * self.spindle_count as f64;
    }

    /// True when the node could not absorb the failure of a peer: the
    /// reserved memory no longer fits into free memory.
    pub fn fail_n1(&self) -> bool {
        self.r_mem > self.f_mem
    }

    pub fn avail_disk(&self) -> i64 {
        self.f_dsk.max(0)
    }

    pub fn avail_mem(&self) -> i64 {
        (self.f_mem - self.r_mem).max(0)
    }

    pub fn avail_cpu(&self) -> i64 {
        if self.hi_cpu < 0 {
            0
        } else {
            (self.hi_cpu - self.u_cpu).max(0)
        }
    }

    /// Fraction of memory in use.
    pub fn p_mem(&self) -> f64 {
        (self.t_mem - self.f_mem) as f64 / self.t_mem as f64
    }

    /// Fraction of disk in use.
    pub fn p_dsk(&self) -> f64 {
        (self.t_dsk - self.f_dsk) as f64 / self.t_dsk as f64
    }

    /// Virtual CPUs per physical CPU.
    pub fn p_cpu(&self) -> f64 {
        self.u_cpu as f64 / self.t_cpu as f64
    }

    /// Fraction of memory reserved for peer failovers.
    pub fn p_rem(&self) -> f64 {
        self.r_mem as f64 / self.t_mem as f64
    }

    /// Number of primary instances in excess of one per exclusion tag.
    pub fn conflicting_primaries(&self) -> i64 {
        self.p_tags.values().sum::<i64>() - self.p_tags.len() as i64
    }

    pub fn add_primary(&self, inst: &Instance) -> OpResult<Node> {
        self.add_primary_ex(false, inst)
    }

    /// Adds an instance in the primary role. With `force` the N+1 check
    /// is skipped, which is how failovers off an offline node are
    /// accepted.
    pub fn add_primary_ex(&self, force: bool, inst: &Instance) -> OpResult<Node> {
        let new_mem = self.f_mem - inst.mem;
        if new_mem < 0 {
            return Err(FailMode::NotEnoughMemory);
        }
        let uses_disk = inst.uses_local_storage();
        let new_dsk = self.f_dsk - inst.dsk;
        if uses_disk && new_dsk < 0 {
            return Err(FailMode::NotEnoughDisk);
        }
        let new_ucpu = self.u_cpu + inst.vcpus;
        if self.hi_cpu >= 0 && new_ucpu > self.hi_cpu {
            return Err(FailMode::NotEnoughCpu);
        }
        let new_spindles = self.inst_spindles + inst.spindle_use;
        if self.excl_storage && new_spindles as f64 > self.hi_spindles {
            return Err(FailMode::NotEnoughSpindles);
        }
        if inst.excl_tags.iter().any(|t| self.p_tags.contains_key(t)) {
            return Err(FailMode::TagConflict);
        }
        if !force && !self.fail_n1() && self.r_mem > new_mem {
            return Err(FailMode::N1Violation);
        }

        let mut node = self.clone();
        node.f_mem = new_mem;
        if uses_disk {
            node.f_dsk = new_dsk;
        }
        node.u_cpu = new_ucpu;
        node.inst_spindles = new_spindles;
        node.p_list.push(inst.idx);
        node.util_load = node.util_load.add(&inst.util);
        for tag in &inst.excl_tags {
            *node.p_tags.entry(tag.clone()).or_insert(0) += 1;
        }
        Ok(node)
    }

    pub fn add_secondary(&self, inst: &Instance, pdx: Ndx) -> OpResult<Node> {
        self.add_secondary_ex(false, inst, pdx)
    }

    /// Adds an instance in the secondary role, reserving memory against
    /// the failure of its primary node `pdx`. With `force` the
    /// reservation may exceed free memory.
    pub fn add_secondary_ex(&self, force: bool, inst: &Instance, pdx: Ndx) -> OpResult<Node> {
        let new_dsk = self.f_dsk - inst.dsk;
        if new_dsk < 0 {
            return Err(FailMode::NotEnoughDisk);
        }
        let new_spindles = self.inst_spindles + inst.spindle_use;
        if self.excl_storage && new_spindles as f64 > self.hi_spindles {
            return Err(FailMode::NotEnoughSpindles);
        }
        let new_peem = self.peers.get(&pdx).copied().unwrap_or(0) + inst.mem;
        let new_rmem = self.r_mem.max(new_peem);
        if !force && new_rmem > self.f_mem {
            return Err(FailMode::N1Violation);
        }

        let mut node = self.clone();
        node.f_dsk = new_dsk;
        node.inst_spindles = new_spindles;
        node.peers.insert(pdx, new_peem);
        node.r_mem = new_rmem;
        node.s_list.push(inst.idx);
        Ok(node)
    }

    /// Removes a primary instance, releasing its memory, disk, CPUs,
    /// utilization and tags.
    pub fn remove_primary(&self, inst: &Instance) -> Node {
        let mut node = self.clone();
        node.f_mem += inst.mem;
        if inst.uses_local_storage() {
            node.f_dsk += inst.dsk;
        }
        node.u_cpu -= inst.vcpus;
        node.inst_spindles -= inst.spindle_use;
        node.p_list.retain(|&i| i != inst.idx);
        node.util_load = node.util_load.sub(&inst.util);
        for tag in &inst.excl_tags {
            if let Some(count) = node.p_tags.get_mut(tag) {
                *count -= 1;
                if *count == 0 {
                    node.p_tags.remove(tag);
                }
            }
        }
        node
    }

    /// Removes a secondary instance and rederives the reservation from
    /// the remaining peers.
    pub fn remove_secondary(&self, inst: &Instance) -> Node {
        let mut node = self.clone();
        node.f_dsk += inst.dsk;
        node.inst_spindles -= inst.spindle_use;
        node.s_list.retain(|&i| i != inst.idx);
        let pdx = inst.pnode;
        let remaining = node.peers.get(&pdx).copied().unwrap_or(0) - inst.mem;
        if remaining <= 0 {
            node.peers.remove(&pdx);
        } else {
            node.peers.insert(pdx, remaining);
        }
        node.r_mem = node.peers.values().copied().max().unwrap_or(0);
        node
    }
}

impl Element for Node {
    fn index(&self) -> usize {
        self.idx
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serialized node state for reports; the full node carries maps that
/// have no external meaning.
#[derive(Debug, Serialize)]
pub struct NodeState<'a> {
    pub name: &'a str,
    pub group: Gdx,
    pub t_mem: i64,
    pub f_mem: i64,
    pub r_mem: i64,
    pub t_dsk: i64,
    pub f_dsk: i64,
    pub t_cpu: i64,
    pub u_cpu: i64,
    pub offline: bool,
    pub fail_n1: bool,
}

impl<'a> From<&'a Node> for NodeState<'a> {
    fn from(n: &'a Node) -> Self {
        Self {
            name: &n.name,
            group: n.group,
            t_mem: n.t_mem,
            f_mem: n.f_mem,
            r_mem: n.r_mem,
            t_dsk: n.t_dsk,
            f_dsk: n.f_dsk,
            t_cpu: n.t_cpu,
            u_cpu: n.u_cpu,
            offline: n.offline,
            fail_n1: n.fail_n1(),
        }
    }
}
