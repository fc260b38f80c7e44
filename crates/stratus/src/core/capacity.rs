//! Cluster capacity statistics and the iterative/tiered allocators.

use serde::Serialize;

use crate::core::alloc::{collapse_failures, try_alloc, AllocTargets};
use crate::core::common::FailMode;
use crate::core::container::Container;
use crate::core::error::{EngineError, EngineResult};
use crate::core::instance::Instance;
use crate::core::node::Node;
use crate::core::score::comp_cv;

/// Aggregate cluster totals over the online nodes, captured after every
/// successful iterative allocation step.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CStats {
    /// free memory/disk/cpu
    pub f_mem: i64,
    pub f_dsk: i64,
    pub f_cpu: i64,
    /// allocatable (free minus reservations) memory/disk/cpu
    pub a_mem: i64,
    pub a_dsk: i64,
    pub a_cpu: i64,
    /// largest per-node allocatable memory/disk/cpu
    pub m_mem: i64,
    pub m_dsk: i64,
    pub m_cpu: i64,
    /// instance-used memory/disk/cpu
    pub i_mem: i64,
    pub i_dsk: i64,
    pub i_cpu: i64,
    /// total memory/disk/cpu
    pub t_mem: i64,
    pub t_dsk: i64,
    pub t_cpu: i64,
    /// virtual CPU capacity (per-node high watermarks summed)
    pub v_cpu: i64,
    /// normalized physical CPU usage
    pub n_cpu: f64,
    /// unaccounted and node-own memory
    pub x_mem: i64,
    pub n_mem: i64,
    /// primary instance count
    pub n_inst: i64,
    pub score: f64,
}

fn update_cstats(mut cs: CStats, node: &Node) -> CStats {
    let allocatable_mem = (node.f_mem - node.r_mem).max(0);
    cs.f_mem += node.f_mem;
    cs.f_dsk += node.f_dsk;
    cs.f_cpu += node.avail_cpu();
    cs.a_mem += allocatable_mem;
    cs.a_dsk += node.avail_disk();
    cs.a_cpu += node.avail_cpu();
    cs.m_mem = cs.m_mem.max(allocatable_mem);
    cs.m_dsk = cs.m_dsk.max(node.avail_disk());
    cs.m_cpu = cs.m_cpu.max(node.avail_cpu());
    cs.i_mem += node.t_mem - node.n_mem - node.x_mem - node.f_mem;
    cs.i_dsk += node.t_dsk - node.f_dsk;
    cs.i_cpu += node.u_cpu;
    cs.t_mem += node.t_mem;
    cs.t_dsk += node.t_dsk;
    cs.t_cpu += node.t_cpu;
    cs.v_cpu += node.hi_cpu.max(0);
    cs.n_cpu += node.u_cpu as f64 / node.t_cpu as f64;
    cs.x_mem += node.x_mem;
    cs.n_mem += node.n_mem;
    cs.n_inst += node.p_list.len() as i64;
    cs
}

/// Computes the cluster totals over the online nodes of a snapshot.
pub fn total_resources(nl: &Container<Node>) -> CStats {
    let mut cs = nl
        .elems()
        .filter(|n| !n.offline)
        .fold(CStats::default(), update_cstats);
    cs.score = comp_cv(nl);
    cs
}

/// Result of an iterative or tiered allocation run.
#[derive(Debug, Clone)]
pub struct AllocRun {
    /// Failure histogram of the last (unsuccessful) attempt.
    pub failures: Vec<(FailMode, usize)>,
    pub nodes: Container<Node>,
    pub instances: Container<Instance>,
    /// Instances placed, in allocation order.
    pub allocated: Vec<Instance>,
    /// Cluster totals after each successful step.
    pub stats: Vec<CStats>,
}

/// Repeatedly allocates clones of a base spec until the cluster is
/// exhausted or the optional countdown reaches zero. Clones are named
/// `new-<depth>` and indexed past the current instance count.
#[allow(clippy::too_many_arguments)]
pub fn iterate_alloc(
    nl: &Container<Node>,
    il: &Container<Instance>,
    limit: Option<usize>,
    base: &Instance,
    targets: &AllocTargets,
    allocated: Vec<Instance>,
    stats: Vec<CStats>,
    workers: usize,
) -> EngineResult<AllocRun> {
    let mut nl = nl.clone();
    let mut il = il.clone();
    let mut allocated = allocated;
    let mut stats = stats;
    let mut limit = limit;
    loop {
        if limit == Some(0) {
            return Ok(AllocRun {
                failures: collapse_failures(&[]),
                nodes: nl,
                instances: il,
                allocated,
                stats,
            });
        }
        let depth = allocated.len();
        let mut inst = base.clone();
        inst.name = format!("new-{}", depth);
        inst.alias = inst.name.clone();
        inst.idx = il.len();
        let sol = try_alloc(&nl, &inst, targets, workers)
            .map_err(|e| EngineError::Plan(format!("Unable to allocate: {}", e)))?;
        match sol.solution {
            None => {
                return Ok(AllocRun {
                    failures: collapse_failures(&sol.failures),
                    nodes: nl,
                    instances: il,
                    allocated,
                    stats,
                });
            }
            Some(elem) => {
                log::trace!("allocated '{}' with score {:.8}", elem.instance.name, elem.score);
                nl = elem.nodes;
                il = il.add(elem.instance.clone());
                allocated.push(elem.instance);
                stats.push(total_resources(&nl));
                limit = limit.map(|l| l - 1);
            }
        }
    }
}

/// Tiered allocation: run the iterative allocator, and when it cannot
/// place any more, shrink the spec along the dimension that failed most
/// often and continue. The histogram is stable-sorted by count and the
/// last entry wins, so equal counts resolve to the failure mode
/// declared latest.
#[allow(clippy::too_many_arguments)]
pub fn tiered_alloc(
    nl: &Container<Node>,
    il: &Container<Instance>,
    limit: Option<usize>,
    base: &Instance,
    targets: &AllocTargets,
    allocated: Vec<Instance>,
    stats: Vec<CStats>,
    workers: usize,
) -> EngineResult<AllocRun> {
    let baseline = allocated.len();
    let run = iterate_alloc(nl, il, limit, base, targets, allocated, stats, workers)?;
    // `allocated` accumulates across tiers; only this round's placements
    // count against this round's remaining budget
    let placed = run.allocated.len() - baseline;
    let (stop, new_limit) = match limit {
        None => (false, None),
        Some(n) => (n <= placed, Some(n.saturating_sub(placed))),
    };
    if stop {
        return Ok(run);
    }
    let mut histogram = run.failures.clone();
    histogram.sort_by_key(|&(_, count)| count);
    let worst = histogram
        .last()
        .map(|&(mode, _)| mode)
        .expect("failure histogram covers every mode");
    match base.shrink_by_type(worst) {
        Err(_) => Ok(run),
        Ok(smaller) => {
            log::debug!(
                "shrinking spec along {} to mem={} dsk={} cpu={}",
                worst,
                smaller.mem,
                smaller.dsk,
                smaller.vcpus
            );
            tiered_alloc(
                &run.nodes,
                &run.instances,
                new_limit,
                &smaller,
                targets,
                run.allocated,
                run.stats,
                workers,
            )
        }
    }
}
