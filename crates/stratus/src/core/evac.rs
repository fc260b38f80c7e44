//! Evacuation and group-change planning.
//!
//! Per-instance target selection across the allowed nodes of a group,
//! emitting the opcode sequences that realize the chosen moves. All
//! state threading is pure: each step folds a new snapshot pair
//! forward, and failed instances leave the snapshots untouched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::cluster::{
    available_group_nodes, find_best_alloc_group, instance_pri_group, split_cluster,
};
use crate::core::common::{Gdx, Idx, Ndx};
use crate::core::container::Container;
use crate::core::error::{annotate_op, EngineError, EngineResult};
use crate::core::group::Group;
use crate::core::instance::{DiskTemplate, Instance, MirrorType};
use crate::core::moves::{apply_move, Move};
use crate::core::node::Node;
use crate::core::opcodes::{imove_to_job, OpCode};
use crate::core::score::comp_cv_nodes;

/// Which placement endpoints an evacuation is allowed to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvacMode {
    ChangePrimary,
    ChangeSecondary,
    ChangeAll,
}

/// Outcome of a node evacuation or group change: per-instance results
/// in chronological order, and the opcode jobs realizing the moves.
#[derive(Debug, Clone, Default)]
pub struct EvacSolution {
    /// (instance, landing group, nodes hosting it afterwards)
    pub moved: Vec<(Idx, Gdx, Vec<Ndx>)>,
    pub failed: Vec<(Idx, String)>,
    pub opcodes: Vec<Vec<OpCode>>,
}

/// Score of one group's nodes, used to rank evacuation targets.
fn group_score(nl: &Container<Node>, gdx: Gdx) -> f64 {
    comp_cv_nodes(&nl.elems().filter(|n| n.group == gdx).collect::<Vec<_>>())
}

fn fail_on_secondary_change(mode: EvacMode, dt: DiskTemplate) -> EngineResult<()> {
    if mode == EvacMode::ChangeSecondary {
        Err(EngineError::SecondaryChangeUnsupported(dt))
    } else {
        Ok(())
    }
}

/// Evacuates an instance that only ever needs one endpoint moved:
/// externally mirrored instances change their primary, internally
/// mirrored ones their secondary. Candidates are folded in order; the
/// lowest resulting group score wins, earlier candidates winning ties.
fn evac_one_node_only(
    nl: &Container<Node>,
    il: &Container<Instance>,
    inst: &Instance,
    gdx: Gdx,
    avail_nodes: &[Ndx],
) -> EngineResult<(Container<Node>, Container<Instance>, Vec<OpCode>)> {
    let op_fn: fn(Ndx) -> Move = match inst.mirror_type() {
        MirrorType::None => return Err(EngineError::NotRelocatable(inst.disk_template)),
        MirrorType::Internal => Move::ReplaceSecondary,
        MirrorType::External => Move::FailoverToAny,
    };

    let mut best: Result<(Container<Node>, Instance, f64, Ndx), String> =
        Err("no nodes available".to_string());
    for &ndx in avail_nodes {
        match apply_move(nl, inst, op_fn(ndx)) {
            Err(reason) => {
                if best.is_err() {
                    best = Err(format!("Node {} failed: {}", nl.name_of(ndx), reason));
                }
            }
            Ok((new_nl, new_inst, _, _)) => {
                let score = group_score(&new_nl, gdx);
                let better = match &best {
                    Ok((_, _, old_score, _)) => score < *old_score,
                    Err(_) => true,
                };
                if better {
                    best = Ok((new_nl, new_inst, score, ndx));
                }
            }
        }
    }

    let (new_nl, new_inst, _, ndx) =
        best.map_err(|msg| EngineError::Plan(format!("Can't find any good node: {}", msg)))?;
    let new_il = il.add(new_inst);
    let ops = imove_to_job(&new_nl, &new_il, inst.idx, op_fn(ndx));
    Ok((new_nl, new_il, ops))
}

/// Full relocation of an internally mirrored instance onto a target
/// (primary, secondary) pair, staged as up to four moves:
/// a pre-failover when the current primary is offline, re-mirroring
/// onto the new primary, failing over to it, and re-mirroring onto the
/// final secondary.
fn evac_drbd_all_inner(
    nl: &Container<Node>,
    il: &Container<Instance>,
    inst: &Instance,
    gdx: Gdx,
    target: (Ndx, Ndx),
) -> EngineResult<(Container<Node>, Container<Instance>, Vec<OpCode>, f64)> {
    let (t_pdx, t_sdx) = target;
    let primary_offline = nl.find(inst.pnode).offline;

    let (nl1, inst1, mut moves) = if primary_offline {
        let (nl1, inst1, _, _) = annotate_op(
            apply_move(nl, inst, Move::Failover),
            "Failing over to the secondary",
        )?;
        (nl1, inst1, vec![Move::Failover])
    } else {
        (nl.clone(), inst.clone(), Vec::new())
    };

    let o1 = Move::ReplaceSecondary(t_pdx);
    let (nl2, inst2, _, _) = annotate_op(
        apply_move(&nl1, &inst1, o1),
        "Changing secondary to new primary",
    )?;
    let o2 = Move::Failover;
    let (nl3, inst3, _, _) =
        annotate_op(apply_move(&nl2, &inst2, o2), "Failing over to new primary")?;
    let o3 = Move::ReplaceSecondary(t_sdx);
    let (nl4, inst4, _, _) = annotate_op(
        apply_move(&nl3, &inst3, o3),
        "Changing secondary to final secondary",
    )?;
    moves.extend([o1, o2, o3]);

    let new_il = il.add(inst4);
    let ops = moves
        .iter()
        .flat_map(|mv| imove_to_job(&nl4, &new_il, inst.idx, *mv))
        .collect();
    let score = group_score(&nl4, gdx);
    Ok((nl4, new_il, ops, score))
}

/// Plans the evacuation of one instance into group `gdx`, restricted to
/// `avail_nodes`. Dispatch follows the disk template and requested
/// mode; the returned snapshots already reflect the move.
pub fn node_evac_instance(
    nl: &Container<Node>,
    il: &Container<Instance>,
    mode: EvacMode,
    inst: &Instance,
    gdx: Gdx,
    avail_nodes: &[Ndx],
) -> EngineResult<(Container<Node>, Container<Instance>, Vec<OpCode>)> {
    match (inst.disk_template, mode) {
        (DiskTemplate::Plain | DiskTemplate::File, _) => {
            Err(EngineError::NotRelocatable(inst.disk_template))
        }
        (
            DiskTemplate::Diskless
            | DiskTemplate::SharedFile
            | DiskTemplate::Block
            | DiskTemplate::Rbd
            | DiskTemplate::Ext,
            _,
        ) => {
            fail_on_secondary_change(mode, inst.disk_template)?;
            evac_one_node_only(nl, il, inst, gdx, avail_nodes)
        }
        (DiskTemplate::Drbd8, EvacMode::ChangePrimary) => {
            let (new_nl, new_inst, _, _) = annotate_op(
                apply_move(nl, inst, Move::Failover),
                "Failing over to the secondary",
            )?;
            let new_il = il.add(new_inst);
            let ops = imove_to_job(&new_nl, &new_il, inst.idx, Move::Failover);
            Ok((new_nl, new_il, ops))
        }
        (DiskTemplate::Drbd8, EvacMode::ChangeSecondary) => {
            evac_one_node_only(nl, il, inst, gdx, avail_nodes)
        }
        (DiskTemplate::Drbd8, EvacMode::ChangeAll) => {
            let mut best: Result<
                (Container<Node>, Container<Instance>, Vec<OpCode>, f64),
                String,
            > = Err("no nodes available".to_string());
            for &p in avail_nodes {
                for &s in avail_nodes {
                    if p == s {
                        continue;
                    }
                    match evac_drbd_all_inner(nl, il, inst, gdx, (p, s)) {
                        Err(e) => {
                            if best.is_err() {
                                best = Err(format!("Last error: {}", e));
                            }
                        }
                        Ok(result) => {
                            let better = match &best {
                                Ok((_, _, _, old_score)) => result.3 < *old_score,
                                Err(_) => true,
                            };
                            if better {
                                best = Ok(result);
                            }
                        }
                    }
                }
            }
            let (new_nl, new_il, ops, _) = best.map_err(|msg| {
                EngineError::Plan(format!("Can't find any good nodes for relocation: {}", msg))
            })?;
            Ok((new_nl, new_il, ops))
        }
    }
}

/// The nodes a request empties, derived from the instances being
/// evacuated and the mode: primaries, mirrored secondaries, or both.
pub fn nodes_to_evacuate(il: &Container<Instance>, mode: EvacMode, idxs: &[Idx]) -> BTreeSet<Ndx> {
    let mut nodes = BTreeSet::new();
    for &idx in idxs {
        let inst = il.find(idx);
        let secondary = match inst.disk_template {
            DiskTemplate::Drbd8 => inst.snode,
            _ => None,
        };
        match mode {
            EvacMode::ChangePrimary => {
                nodes.insert(inst.pnode);
            }
            EvacMode::ChangeSecondary => {
                nodes.extend(secondary);
            }
            EvacMode::ChangeAll => {
                nodes.insert(inst.pnode);
                nodes.extend(secondary);
            }
        }
    }
    nodes
}

fn record_outcome(
    state: &mut (Container<Node>, Container<Instance>, EvacSolution),
    idx: Idx,
    res: EngineResult<(Container<Node>, Container<Instance>, Vec<OpCode>)>,
) {
    match res {
        Err(e) => {
            log::debug!("evacuation of instance {} failed: {}", idx, e);
            state.2.failed.push((idx, e.to_string()));
        }
        Ok((nl, il, ops)) => {
            let inst = il.find(idx);
            let gdx = instance_pri_group(&nl, inst);
            state.2.moved.push((idx, gdx, inst.all_nodes()));
            state.2.opcodes.push(ops);
            state.0 = nl;
            state.1 = il;
        }
    }
}

/// Plans the evacuation of the given instances off their current nodes,
/// within each instance's own primary group. Offline nodes and every
/// node being emptied are excluded as targets, as is the instance's own
/// primary.
pub fn try_node_evac(
    nl: &Container<Node>,
    il: &Container<Instance>,
    mode: EvacMode,
    idxs: &[Idx],
) -> EngineResult<(Container<Node>, Container<Instance>, EvacSolution)> {
    let evac_ndx = nodes_to_evacuate(il, mode, idxs);
    let mut excluded: BTreeSet<Ndx> = nl
        .elems()
        .filter(|n| n.offline)
        .map(|n| n.idx)
        .collect();
    excluded.extend(evac_ndx);
    let group_nodes: Vec<(Gdx, Vec<Ndx>)> = split_cluster(nl, il)
        .into_iter()
        .map(|(gdx, (gnl, _))| (gdx, gnl.keys()))
        .collect();

    let mut state = (nl.clone(), il.clone(), EvacSolution::default());
    for &idx in idxs {
        let inst = state.1.find(idx).clone();
        let gdx = instance_pri_group(&state.0, &inst);
        let mut excluded_here = excluded.clone();
        excluded_here.insert(inst.pnode);
        let res = available_group_nodes(&group_nodes, &excluded_here, gdx).and_then(|avail| {
            node_evac_instance(&state.0, &state.1, mode, &inst, gdx, &avail)
        });
        record_outcome(&mut state, idx, res);
    }
    Ok(state)
}

/// Plans moving the given instances into different groups: the landing
/// group is chosen per instance by allocation quality among the
/// requested target groups (all groups when none are requested, minus
/// the groups being vacated), then the instance is fully relocated into
/// it.
pub fn try_change_group(
    gl: &Container<Group>,
    nl: &Container<Node>,
    il: &Container<Instance>,
    idxs: &[Idx],
    req_gdxs: &[Gdx],
    workers: usize,
) -> EngineResult<(Container<Node>, Container<Instance>, EvacSolution)> {
    let evac_gdxs: BTreeSet<Gdx> = idxs
        .iter()
        .map(|&i| instance_pri_group(nl, il.find(i)))
        .collect();
    let target_gdxs: Vec<Gdx> = if req_gdxs.is_empty() {
        gl.keys()
    } else {
        req_gdxs.to_vec()
    }
    .into_iter()
    .filter(|g| !evac_gdxs.contains(g))
    .collect();

    let excluded: BTreeSet<Ndx> = nl
        .elems()
        .filter(|n| n.offline)
        .map(|n| n.idx)
        .collect();
    let group_nodes: Vec<(Gdx, Vec<Ndx>)> = split_cluster(nl, il)
        .into_iter()
        .map(|(gdx, (gnl, _))| (gdx, gnl.keys()))
        .collect();

    let mut state = (nl.clone(), il.clone(), EvacSolution::default());
    for &idx in idxs {
        let inst = state.1.find(idx).clone();
        let res = find_best_alloc_group(
            gl,
            &state.0,
            &state.1,
            Some(&target_gdxs),
            &inst,
            inst.required_nodes(),
            workers,
        )
        .and_then(|(group, _, _)| {
            let avail = available_group_nodes(&group_nodes, &excluded, group.idx)?;
            node_evac_instance(&state.0, &state.1, EvacMode::ChangeAll, &inst, group.idx, &avail)
        });
        record_outcome(&mut state, idx, res);
    }
    Ok(state)
}
