//! Cluster-level queries: group partitioning and multi-group
//! allocation.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::core::alloc::{gen_alloc_nodes, try_alloc, AllocSolution};
use crate::core::common::{Gdx, Ndx};
use crate::core::container::Container;
use crate::core::error::{EngineError, EngineResult};
use crate::core::group::Group;
use crate::core::instance::Instance;
use crate::core::node::Node;

/// Groups a node list by group index, ascending.
pub fn compute_groups(nodes: Vec<&Node>) -> Vec<(Gdx, Vec<&Node>)> {
    let mut nodes = nodes;
    nodes.sort_by_key(|n| n.group);
    let grouped = nodes.into_iter().group_by(|n| n.group);
    let mut result = Vec::new();
    for (gdx, members) in &grouped {
        result.push((gdx, members.collect()));
    }
    result
}

/// Partitions a snapshot into per-group snapshots. Instances follow
/// their primary node's group. The partition is exhaustive and
/// disjoint, so merging the parts restores the originals.
pub fn split_cluster(
    nl: &Container<Node>,
    il: &Container<Instance>,
) -> Vec<(Gdx, (Container<Node>, Container<Instance>))> {
    compute_groups(nl.elems().collect())
        .into_iter()
        .map(|(gdx, nodes)| {
            let node_set: BTreeSet<Ndx> = nodes.iter().map(|n| n.idx).collect();
            let gnl: Container<Node> = nodes.into_iter().cloned().collect();
            let gil: Container<Instance> = il
                .elems()
                .filter(|i| node_set.contains(&i.pnode))
                .cloned()
                .collect();
            (gdx, (gnl, gil))
        })
        .collect()
}

/// The group of an instance's primary node.
pub fn instance_pri_group(nl: &Container<Node>, inst: &Instance) -> Gdx {
    nl.find(inst.pnode).group
}

/// Instances whose primary and secondary straddle two groups; such
/// splits violate the mirroring contract and must be surfaced before
/// any plan is emitted.
pub fn find_split_instances(nl: &Container<Node>, il: &Container<Instance>) -> Vec<Instance> {
    il.elems()
        .filter(|i| match i.snode {
            Some(sdx) => nl.find(i.pnode).group != nl.find(sdx).group,
            None => false,
        })
        .cloned()
        .collect()
}

/// Nodes of a group minus an exclusion set.
pub fn available_group_nodes(
    group_nodes: &[(Gdx, Vec<Ndx>)],
    excluded: &BTreeSet<Ndx>,
    gdx: Gdx,
) -> EngineResult<Vec<Ndx>> {
    let local = group_nodes
        .iter()
        .find(|(g, _)| *g == gdx)
        .map(|(_, nodes)| nodes)
        .ok_or(EngineError::GroupNotFound(gdx))?;
    Ok(local
        .iter()
        .copied()
        .filter(|n| !excluded.contains(n))
        .collect())
}

type GroupParts = (Gdx, (Container<Node>, Container<Instance>));

/// Drops groups not connected to every network the instance's NICs
/// require, collecting one message per dropped group.
pub fn filter_valid_groups(
    groups: Vec<GroupParts>,
    gl: &Container<Group>,
    inst: &Instance,
) -> (Vec<GroupParts>, Vec<String>) {
    let mut valid = Vec::new();
    let mut messages = Vec::new();
    for part in groups {
        let group = gl.find(part.0);
        let missing: Vec<&str> = inst
            .nics
            .iter()
            .filter_map(|nic| nic.network.as_deref())
            .filter(|net| !group.networks.contains(*net))
            .collect();
        if missing.is_empty() {
            valid.push(part);
        } else {
            messages.push(format!(
                "Group {} is not connected to network(s) {} required by instance {}",
                group.name,
                missing.join(", "),
                inst.name
            ));
        }
    }
    (valid, messages)
}

/// Finds the group where the instance allocates best: groups are split
/// out, filtered by network connectivity and allocability, allocated
/// into independently, and ranked by (allocation policy, score)
/// ascending.
pub fn find_best_alloc_group(
    gl: &Container<Group>,
    nl: &Container<Node>,
    il: &Container<Instance>,
    allowed: Option<&[Gdx]>,
    inst: &Instance,
    count: usize,
    workers: usize,
) -> EngineResult<(Group, AllocSolution, Vec<String>)> {
    let groups = split_cluster(nl, il);
    let groups: Vec<GroupParts> = match allowed {
        Some(gdxs) => groups
            .into_iter()
            .filter(|(gdx, _)| gdxs.contains(gdx))
            .collect(),
        None => groups,
    };
    let (valid, mut messages) = filter_valid_groups(groups, gl, inst);

    let mut candidates: Vec<(Gdx, AllocSolution)> = Vec::new();
    for (gdx, (gnl, _)) in valid {
        let group = gl.find(gdx);
        let attempt = gen_alloc_nodes(gl, &gnl, count, false)
            .and_then(|targets| try_alloc(&gnl, inst, &targets, workers));
        match attempt {
            Ok(sol) if sol.solution.is_some() && group.alloc_policy.is_allocable() => {
                candidates.push((gdx, sol));
            }
            Ok(sol) => messages.push(format!("Group {}: {}", group.name, sol.log.join("; "))),
            Err(e) => messages.push(format!("Group {}: {}", group.name, e)),
        }
    }

    candidates.sort_by(|(ga, sa), (gb, sb)| {
        let pa = gl.find(*ga).alloc_policy;
        let pb = gl.find(*gb).alloc_policy;
        let score = |s: &AllocSolution| s.solution.as_ref().map(|e| e.score).unwrap_or(f64::MAX);
        pa.cmp(&pb).then(score(sa).total_cmp(&score(sb)))
    });

    match candidates.into_iter().next() {
        Some((gdx, sol)) => Ok((gl.find(gdx).clone(), sol, messages)),
        None => Err(EngineError::Plan(format!(
            "no groups for allocation: {}",
            if messages.is_empty() {
                "no valid groups".to_string()
            } else {
                messages.join(", ")
            }
        ))),
    }
}

/// Multi-group allocation: picks the best group and returns its
/// solution, with the selection recorded in the log.
pub fn try_mg_alloc(
    gl: &Container<Group>,
    nl: &Container<Node>,
    il: &Container<Instance>,
    inst: &Instance,
    count: usize,
    workers: usize,
) -> EngineResult<AllocSolution> {
    let (group, mut sol, messages) =
        find_best_alloc_group(gl, nl, il, None, inst, count, workers)?;
    log::debug!("selected group '{}' for instance '{}'", group.name, inst.name);
    let mut log = vec![format!("Selected group: {}", group.name)];
    log.extend(messages);
    log.append(&mut sol.log);
    sol.log = log;
    Ok(sol)
}
