//! Allocation search: placing one new instance on the best node (or
//! primary/secondary pair) of a single group.

use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::core::common::{FailMode, Ndx, OpResult};
use crate::core::container::Container;
use crate::core::error::{EngineError, EngineResult};
use crate::core::group::Group;
use crate::core::instance::Instance;
use crate::core::node::Node;
use crate::core::parallel::par_map;
use crate::core::score::comp_cv;

/// One successful candidate placement: the transformed snapshot, the
/// placed instance, the nodes whose state changed and the resulting
/// cluster score.
#[derive(Debug, Clone)]
pub struct AllocElement {
    pub nodes: Container<Node>,
    pub instance: Instance,
    pub affected: Vec<Node>,
    pub score: f64,
}

/// Aggregate over all candidates tried for one allocation request.
#[derive(Debug, Clone, Default)]
pub struct AllocSolution {
    /// Every capacity failure encountered, in evaluation order.
    pub failures: Vec<FailMode>,
    /// Number of candidates that could host the instance.
    pub allocs: usize,
    /// The best (lowest-score) placement, if any candidate fit.
    pub solution: Option<AllocElement>,
    pub log: Vec<String>,
}

/// Candidate targets for an allocation: single nodes for one-node
/// instances, (primary, secondaries) fan-outs for two-node instances.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocTargets {
    Single(Vec<Ndx>),
    Pairs(Vec<(Ndx, Vec<Ndx>)>),
}

/// Places the instance on a single node with no secondary.
pub fn allocate_on_single(
    nl: &Container<Node>,
    inst: &Instance,
    ndx: Ndx,
) -> OpResult<AllocElement> {
    let target = nl.find(ndx);
    inst.matches_policy(&target.policy, target.excl_storage)?;
    let new_inst = inst.set_both(ndx, None);
    let new_node = target.add_primary(&new_inst)?;
    let new_nl = nl.add(new_node.clone());
    let score = comp_cv(&new_nl);
    Ok(AllocElement {
        nodes: new_nl,
        instance: new_inst,
        affected: vec![new_node],
        score,
    })
}

/// Places the instance on a primary/secondary pair.
pub fn allocate_on_pair(
    nl: &Container<Node>,
    inst: &Instance,
    pdx: Ndx,
    sdx: Ndx,
) -> OpResult<AllocElement> {
    let primary = nl.find(pdx);
    let secondary = nl.find(sdx);
    inst.matches_policy(&primary.policy, primary.excl_storage)?;
    let new_p = primary.add_primary(inst)?;
    let new_s = secondary.add_secondary(inst, pdx)?;
    let new_inst = inst.set_both(pdx, Some(sdx));
    let new_nl = nl.add_two(new_p.clone(), new_s.clone());
    let score = comp_cv(&new_nl);
    Ok(AllocElement {
        nodes: new_nl,
        instance: new_inst,
        affected: vec![new_p, new_s],
        score,
    })
}

/// Picks the better of two optional placements; the first argument wins
/// on equal scores.
pub fn best_alloc_element(
    a: Option<AllocElement>,
    b: Option<AllocElement>,
) -> Option<AllocElement> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => {
            if b.score < a.score {
                Some(b)
            } else {
                Some(a)
            }
        }
    }
}

/// Folds one candidate result into the running solution.
pub fn concat_allocs(mut sol: AllocSolution, res: OpResult<AllocElement>) -> AllocSolution {
    match res {
        Err(reason) => {
            sol.failures.push(reason);
            sol
        }
        Ok(elem) => {
            sol.allocs += 1;
            sol.solution = best_alloc_element(sol.solution, Some(elem));
            sol
        }
    }
}

/// Merges two partial solutions (e.g. the per-primary results of the
/// parallel pair scan). Failures and success counts add up; the earlier
/// solution wins score ties; logs keep the later-then-earlier order.
pub fn sum_allocs(a: AllocSolution, b: AllocSolution) -> AllocSolution {
    let mut failures = a.failures;
    failures.extend(b.failures);
    let mut log = b.log;
    log.extend(a.log);
    AllocSolution {
        failures,
        allocs: a.allocs + b.allocs,
        solution: best_alloc_element(a.solution, b.solution),
        log,
    }
}

/// Collapses a failure list into per-mode counts, covering every mode
/// in declaration order.
pub fn collapse_failures(failures: &[FailMode]) -> Vec<(FailMode, usize)> {
    FailMode::iter()
        .map(|mode| (mode, failures.iter().filter(|f| **f == mode).count()))
        .collect()
}

/// One-line summary of an allocation solution.
pub fn describe_solution(sol: &AllocSolution) -> String {
    let reasons = collapse_failures(&sol.failures)
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(mode, count)| format!("{}: {}", mode, count))
        .collect::<Vec<_>>()
        .join(", ");
    match &sol.solution {
        None => {
            let reasons = if sol.failures.is_empty() {
                "unknown reasons".to_string()
            } else {
                reasons
            };
            format!("No valid allocation solutions, failure reasons: {}", reasons)
        }
        Some(elem) => format!(
            "score: {:.8}, successes {}, failures {} ({}) for node(s) {}",
            elem.score,
            sol.allocs,
            sol.failures.len(),
            reasons,
            elem.affected
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join("/")
        ),
    }
}

fn annotate_solution(mut sol: AllocSolution) -> AllocSolution {
    let line = describe_solution(&sol);
    sol.log.insert(0, line);
    sol
}

/// Tries every candidate target and aggregates the results. Pair
/// candidates are evaluated in parallel per primary, reduced in
/// ascending primary order so that the first-seen candidate wins score
/// ties.
pub fn try_alloc(
    nl: &Container<Node>,
    inst: &Instance,
    targets: &AllocTargets,
    workers: usize,
) -> EngineResult<AllocSolution> {
    match targets {
        AllocTargets::Pairs(pairs) if pairs.is_empty() => Err(EngineError::NotEnoughOnlineNodes),
        AllocTargets::Pairs(pairs) => {
            let shared = Arc::new((nl.clone(), inst.clone()));
            let partials = par_map(pairs.clone(), workers, move |(pdx, sdxs)| {
                let (nl, inst) = &*shared;
                sdxs.into_iter().fold(AllocSolution::default(), |sol, sdx| {
                    concat_allocs(sol, allocate_on_pair(nl, inst, pdx, sdx))
                })
            });
            let sol = partials
                .into_iter()
                .fold(AllocSolution::default(), sum_allocs);
            log::debug!(
                "pair allocation for '{}': {} successes, {} failures",
                inst.name,
                sol.allocs,
                sol.failures.len()
            );
            Ok(annotate_solution(sol))
        }
        AllocTargets::Single(nodes) if nodes.is_empty() => Err(EngineError::NoOnlineNodes),
        AllocTargets::Single(nodes) => {
            let sol = nodes.iter().fold(AllocSolution::default(), |sol, &ndx| {
                concat_allocs(sol, allocate_on_single(nl, inst, ndx))
            });
            log::debug!(
                "single allocation for '{}': {} successes, {} failures",
                inst.name,
                sol.allocs,
                sol.failures.len()
            );
            Ok(annotate_solution(sol))
        }
    }
}

/// Derives the candidate target set for an allocation of `count` nodes
/// from the online part of the snapshot. Pairs are restricted to nodes
/// of the same group, and primaries with no usable secondary are
/// dropped.
pub fn gen_alloc_nodes(
    gl: &Container<Group>,
    nl: &Container<Node>,
    count: usize,
    drop_unallocable: bool,
) -> EngineResult<AllocTargets> {
    let online: Vec<&Node> = nl
        .elems()
        .filter(|n| !n.offline)
        .filter(|n| !drop_unallocable || gl.find(n.group).alloc_policy.is_allocable())
        .collect();
    match count {
        1 => Ok(AllocTargets::Single(online.iter().map(|n| n.idx).collect())),
        2 => {
            let mut pairs = Vec::new();
            for p in &online {
                let sdxs: Vec<Ndx> = online
                    .iter()
                    .filter(|s| s.idx != p.idx && s.group == p.group)
                    .map(|s| s.idx)
                    .collect();
                if !sdxs.is_empty() {
                    pairs.push((p.idx, sdxs));
                }
            }
            Ok(AllocTargets::Pairs(pairs))
        }
        other => Err(EngineError::UnsupportedNodeCount(other)),
    }
}
