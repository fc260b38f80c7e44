//! Human-readable plan rendering and jobset batching.

use std::collections::BTreeSet;

use crate::core::balance::Placement;
use crate::core::common::{Idx, Ndx};
use crate::core::container::Container;
use crate::core::instance::Instance;
use crate::core::moves::Move;
use crate::core::node::Node;

/// A move prepared for execution: the nodes it involves, the instance,
/// the move itself and the shell commands realizing it.
pub type MoveJob = (Vec<Ndx>, Idx, Move, Vec<String>);

/// A batch of jobs with pairwise-disjoint node sets, safe to run in
/// parallel.
pub type JobSet = Vec<MoveJob>;

/// Renders the plan column for a move and the matching shell commands.
/// Running instances migrate, stopped ones fail over.
pub fn compute_moves(
    inst: &Instance,
    iname: &str,
    mv: Move,
    new_pri: &str,
    new_sec: &str,
) -> (String, Vec<String>) {
    let verb = if inst.running { "migrate" } else { "failover" };
    let mig = format!("{} -f {}", verb, iname);
    let mig_to = |node: &str| format!("{} -f -n {} {}", verb, node, iname);
    let rep = |node: &str| format!("replace-disks -n {} {}", node, iname);
    match mv {
        Move::Failover => ("f".to_string(), vec![mig]),
        Move::FailoverToAny(_) => (format!("fa:{}", new_pri), vec![mig_to(new_pri)]),
        Move::ReplacePrimary(_) => (
            format!("f r:{} f", new_pri),
            vec![mig.clone(), rep(new_pri), mig],
        ),
        Move::ReplaceSecondary(_) => (format!("r:{}", new_sec), vec![rep(new_sec)]),
        Move::ReplaceAndFailover(_) => (format!("r:{} f", new_pri), vec![rep(new_pri), mig]),
        Move::FailoverAndReplace(_) => (format!("f r:{}", new_sec), vec![mig, rep(new_sec)]),
    }
}

/// Renders one placement as a plan row plus its commands. `nmlen` and
/// `imlen` are the node and instance name column widths.
pub fn print_solution_line(
    nl: &Container<Node>,
    il: &Container<Instance>,
    nmlen: usize,
    imlen: usize,
    plc: &Placement,
    pos: usize,
) -> (String, Vec<String>) {
    let pmlen = 2 * nmlen + 1;
    let inst = il.find(plc.idx);
    let iname = inst.alias.as_str();
    let new_pri = nl.name_of(plc.pnode);
    let new_sec = plc.snode.map(|s| nl.name_of(s)).unwrap_or("-");
    let old_pri = nl.name_of(inst.pnode);
    let old_sec = inst.snode.map(|s| nl.name_of(s)).unwrap_or("-");
    let (moves, cmds) = compute_moves(inst, iname, plc.mv, new_pri, new_sec);
    let old_str = format!("{}:{}", old_pri, old_sec);
    let new_str = format!("{}:{}", new_pri, new_sec);
    (
        format!(
            "  {:>3}. {:<imlen$} {:<pmlen$} => {:<pmlen$} {:12.8} a={}",
            pos, iname, old_str, new_str, plc.score, moves
        ),
        cmds,
    )
}

/// All nodes a placement touches: the new endpoints plus whatever the
/// instance currently occupies, first occurrence order, deduplicated.
pub fn involved_nodes(il: &Container<Instance>, plc: &Placement) -> Vec<Ndx> {
    let inst = il.find(plc.idx);
    let mut nodes = vec![plc.pnode];
    nodes.extend(plc.snode);
    nodes.extend(inst.all_nodes());
    let mut seen = BTreeSet::new();
    nodes.retain(|n| seen.insert(*n));
    nodes
}

/// Batches jobs into jobsets: a job joins the current jobset iff its
/// node set is disjoint from every node already involved in it,
/// otherwise it opens a new jobset.
pub fn split_jobs(jobs: Vec<MoveJob>) -> Vec<JobSet> {
    let mut jobsets: Vec<JobSet> = Vec::new();
    let mut involved: BTreeSet<Ndx> = BTreeSet::new();
    for job in jobs {
        let disjoint = job.0.iter().all(|n| !involved.contains(n));
        if jobsets.is_empty() || !disjoint {
            involved = job.0.iter().copied().collect();
            jobsets.push(vec![job]);
        } else {
            involved.extend(job.0.iter().copied());
            jobsets.last_mut().unwrap().push(job);
        }
    }
    jobsets
}

/// Renders jobsets as an executable command list.
pub fn format_cmds(jobsets: &[JobSet]) -> String {
    let mut out = String::new();
    for (jsn, js) in jobsets.iter().enumerate() {
        let jsn = jsn + 1;
        out.push_str(&format!("echo jobset {}, {} jobs\n", jsn, js.len()));
        for (jn, (_, _, _, cmds)) in js.iter().enumerate() {
            out.push_str(&format!("  echo job {}/{}\n", jsn, jn + 1));
            out.push_str("  check\n");
            for cmd in cmds {
                out.push_str(&format!("  gnt-instance {}\n", cmd));
            }
        }
    }
    out
}

/// Renders a full placement list (newest first, as the balancer builds
/// it) into chronological plan rows and the matching move jobs.
///
/// Instance state is replayed move by move, so when a plan moves the
/// same instance more than once, each row's old placement is the one
/// left behind by the previous row, not the pre-plan state.
pub fn print_solution(
    nl: &Container<Node>,
    il: &Container<Instance>,
    placements: &[Placement],
) -> (Vec<String>, Vec<MoveJob>) {
    let nmlen = nl.elems().map(|n| n.name.len()).max().unwrap_or(0);
    let imlen = il.elems().map(|i| i.alias.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(placements.len());
    let mut jobs = Vec::with_capacity(placements.len());
    let mut cur_il = il.clone();
    for (pos, plc) in placements.iter().rev().enumerate() {
        let (line, cmds) = print_solution_line(nl, &cur_il, nmlen, imlen, plc, pos + 1);
        lines.push(line);
        jobs.push((involved_nodes(&cur_il, plc), plc.idx, plc.mv, cmds));
        let moved = cur_il.find(plc.idx).set_both(plc.pnode, plc.snode);
        cur_il = cur_il.add(moved);
    }
    (lines, jobs)
}
