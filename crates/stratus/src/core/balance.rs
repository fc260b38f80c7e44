//! Hill-climbing cluster balancer.
//!
//! The balancer carries a [`Table`]: node and instance snapshots, their
//! score, and the placements decided so far (newest first). One round
//! evaluates every eligible instance against every candidate target and
//! move, keeps the best table, and the driver loop repeats rounds until
//! the score or round budget is exhausted.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::common::{Idx, Ndx};
use crate::core::config::EngineConfig;
use crate::core::container::Container;
use crate::core::instance::{Instance, MirrorType};
use crate::core::moves::{apply_move, possible_moves, Move};
use crate::core::node::Node;
use crate::core::parallel::par_map;
use crate::core::score::comp_cv;

/// One decided move: instance, its new placement, the move that gets it
/// there and the score of the cluster afterwards.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Placement {
    pub idx: Idx,
    pub pnode: Ndx,
    pub snode: Option<Ndx>,
    pub mv: Move,
    pub score: f64,
}

/// Balancer state. Placements are kept newest first; consumers reverse
/// them for chronological output.
#[derive(Debug, Clone)]
pub struct Table {
    pub nodes: Container<Node>,
    pub instances: Container<Instance>,
    pub score: f64,
    pub placements: Vec<Placement>,
}

impl Table {
    pub fn new(nodes: Container<Node>, instances: Container<Instance>) -> Self {
        let score = comp_cv(&nodes);
        Self {
            nodes,
            instances,
            score,
            placements: Vec::new(),
        }
    }
}

/// Tunables for one balancing round.
#[derive(Debug, Clone)]
pub struct BalanceOptions {
    /// Allow moves that rebuild disks on new nodes.
    pub disk_moves: bool,
    /// Allow moves that change the primary role.
    pub inst_moves: bool,
    /// Restrict victims to instances touching offline nodes.
    pub evac_mode: bool,
    /// Above this score, any strict improvement is accepted.
    pub mg_limit: f64,
    /// Below `mg_limit`, require at least this much improvement.
    pub min_gain: f64,
    pub workers: usize,
}

impl Default for BalanceOptions {
    fn default() -> Self {
        Self {
            disk_moves: true,
            inst_moves: true,
            evac_mode: false,
            mg_limit: 0.1,
            min_gain: 0.01,
            workers: 1,
        }
    }
}

impl BalanceOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mg_limit: config.min_gain_limit,
            min_gain: config.min_gain,
            workers: config.workers,
            ..Self::default()
        }
    }
}

/// Returns the lower-scoring table; the first argument wins ties.
pub fn compare_tables(a: Table, b: Table) -> Table {
    if a.score > b.score {
        b
    } else {
        a
    }
}

/// Applies one move to the *initial* table; `None` when a capacity
/// check rejected it.
fn move_candidate(ini: &Table, inst: &Instance, mv: Move) -> Option<Table> {
    let (new_nl, new_inst, pdx, sdx) = apply_move(&ini.nodes, inst, mv).ok()?;
    let score = comp_cv(&new_nl);
    let mut placements = Vec::with_capacity(ini.placements.len() + 1);
    placements.push(Placement {
        idx: inst.idx,
        pnode: pdx,
        snode: sdx,
        mv,
        score,
    });
    placements.extend_from_slice(&ini.placements);
    Some(Table {
        instances: ini.instances.add(new_inst),
        nodes: new_nl,
        score,
        placements,
    })
}

/// Applies one move to the initial table and keeps the better of it and
/// the running best; the running best wins ties.
fn check_single_step(ini: &Table, inst: &Instance, best: Table, mv: Move) -> Table {
    match move_candidate(ini, inst, mv) {
        None => best,
        Some(candidate) => compare_tables(best, candidate),
    }
}

/// Evaluates every move of one instance towards every candidate target
/// and returns the best resulting table.
///
/// For internally mirrored instances whose secondary is itself a
/// candidate node, a bare failover is tried first; it is kept even on
/// an exact score tie, so a fully symmetric cluster can still swap
/// roles. Disk moves are then compared against that running best, with
/// the incumbent winning ties.
pub fn check_instance_move(
    candidates: &[Ndx],
    disk_moves: bool,
    inst_moves: bool,
    ini: &Table,
    inst: &Instance,
) -> Table {
    let opdx = inst.pnode;
    let osdx = inst.snode;
    let targets: Vec<Ndx> = candidates
        .iter()
        .copied()
        .filter(|&n| n != opdx && Some(n) != osdx)
        .collect();
    let mirror = inst.mirror_type();
    let use_secondary = osdx.map_or(false, |s| candidates.contains(&s)) && inst_moves;

    let mut best = if mirror == MirrorType::Internal && use_secondary {
        // failover result as the first argument so it wins the tie
        // against the input table
        match move_candidate(ini, inst, Move::Failover) {
            Some(failover) => compare_tables(failover, ini.clone()),
            None => ini.clone(),
        }
    } else {
        ini.clone()
    };

    if disk_moves {
        for tdx in targets {
            for mv in possible_moves(mirror, use_secondary, inst_moves, tdx) {
                best = check_single_step(ini, inst, best, mv);
            }
        }
    }
    best
}

/// Evaluates all victims (in parallel) and takes the minimum-score
/// result; earlier victims win ties. If no victim extended the
/// placement list the input table is returned unchanged.
pub fn check_move(
    candidates: &[Ndx],
    disk_moves: bool,
    inst_moves: bool,
    workers: usize,
    ini: &Table,
    victims: &[Instance],
) -> Table {
    if victims.is_empty() {
        return ini.clone();
    }
    let shared = Arc::new((ini.clone(), candidates.to_vec()));
    let tables = par_map(victims.to_vec(), workers, move |inst| {
        let (ini, candidates) = &*shared;
        check_instance_move(candidates, disk_moves, inst_moves, ini, &inst)
    });
    let best = tables
        .into_iter()
        .reduce(compare_tables)
        .expect("victim list is non-empty");
    if best.placements.len() == ini.placements.len() {
        ini.clone()
    } else {
        best
    }
}

/// Runs one balancing round. The result is accepted only if it strictly
/// lowers the score, and, once the score is already below `mg_limit`,
/// only if the gain is at least `min_gain`.
pub fn try_balance(ini: &Table, opts: &BalanceOptions) -> Option<Table> {
    let offline: BTreeSet<Ndx> = ini
        .nodes
        .elems()
        .filter(|n| n.offline)
        .map(|n| n.idx)
        .collect();
    let candidates: Vec<Ndx> = ini
        .nodes
        .elems()
        .filter(|n| !n.offline)
        .map(|n| n.idx)
        .collect();

    let victims: Vec<Instance> = ini
        .instances
        .elems()
        .filter(|i| {
            !opts.evac_mode || i.all_nodes().iter().any(|n| offline.contains(n))
        })
        .filter(|i| i.movable && i.auto_balance)
        .cloned()
        .collect();

    log::debug!(
        "balancing round: {} victims, {} candidate nodes, score {:.8}",
        victims.len(),
        candidates.len(),
        ini.score
    );

    let fin = check_move(
        &candidates,
        opts.disk_moves,
        opts.inst_moves,
        opts.workers,
        ini,
        &victims,
    );
    let ini_cv = ini.score;
    let fin_cv = fin.score;
    if fin_cv < ini_cv && (ini_cv > opts.mg_limit || ini_cv - fin_cv >= opts.min_gain) {
        log::debug!("round accepted: {:.8} -> {:.8}", ini_cv, fin_cv);
        Some(fin)
    } else {
        log::debug!("round rejected: {:.8} -> {:.8}", ini_cv, fin_cv);
        None
    }
}

/// Whether the driver loop should attempt another round.
pub fn do_next_balance(tbl: &Table, max_rounds: i64, min_score: f64) -> bool {
    (max_rounds < 0 || (tbl.placements.len() as i64) < max_rounds) && tbl.score > min_score
}

/// Drives balancing rounds until a round makes no progress or the
/// round/score budget is exhausted.
pub fn run_balance(tbl: Table, opts: &BalanceOptions, max_rounds: i64, min_score: f64) -> Table {
    let mut tbl = tbl;
    while do_next_balance(&tbl, max_rounds, min_score) {
        match try_balance(&tbl, opts) {
            Some(next) => tbl = next,
            None => break,
        }
    }
    tbl
}

/// Offline or N+1-failing nodes, together with the instances hosted on
/// them in any role. This is the victim inventory an operator report
/// starts from.
pub fn compute_bad_items(
    nl: &Container<Node>,
    il: &Container<Instance>,
) -> (Vec<Node>, Vec<Instance>) {
    let bad_nodes: Vec<Node> = nl
        .elems()
        .filter(|n| n.offline || n.fail_n1())
        .cloned()
        .collect();
    let hosted: BTreeSet<Idx> = bad_nodes
        .iter()
        .flat_map(|n| n.p_list.iter().chain(n.s_list.iter()).copied())
        .collect();
    let bad_instances = hosted.into_iter().map(|i| il.find(i).clone()).collect();
    (bad_nodes, bad_instances)
}
