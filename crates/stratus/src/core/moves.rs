//! The move algebra: the six ways a mirrored or externally-stored
//! instance can change nodes, and their application to a snapshot.

use serde::Serialize;

use crate::core::common::{Ndx, OpResult};
use crate::core::container::Container;
use crate::core::instance::{Instance, MirrorType};
use crate::core::node::Node;

/// An instance move. This is a closed set: the opcode mappings and the
/// plan renderer match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Move {
    /// Swap primary and secondary roles (internal mirror only).
    Failover,
    /// Migrate an externally-mirrored instance to an arbitrary node.
    FailoverToAny(Ndx),
    /// Move the primary to a new node, keeping the secondary.
    ReplacePrimary(Ndx),
    /// Move the secondary to a new node, keeping the primary.
    ReplaceSecondary(Ndx),
    /// Move the mirror to a new node and make it the primary; the old
    /// primary becomes the secondary.
    ReplaceAndFailover(Ndx),
    /// Fail over to the secondary, then rebuild the mirror on a new
    /// node.
    FailoverAndReplace(Ndx),
}

/// Result of a successful move: the new node snapshot, the updated
/// instance and its new primary/secondary indices.
pub type MoveResult = (Container<Node>, Instance, Ndx, Option<Ndx>);

fn mirrored_nodes(inst: &Instance) -> (Ndx, Ndx) {
    let pdx = inst.pnode;
    let sdx = inst
        .snode
        .unwrap_or_else(|| panic!("move on instance '{}' without a secondary", inst.name));
    (pdx, sdx)
}

/// Applies a move to a node snapshot, returning the transformed
/// snapshot or the first violated capacity constraint. Capacity checks
/// on nodes an instance is forced away from (offline primaries or
/// secondaries) are skipped, so evacuation of dead nodes always has a
/// path forward.
pub fn apply_move(nl: &Container<Node>, inst: &Instance, mv: Move) -> OpResult<MoveResult> {
    match mv {
        Move::Failover => {
            let (opdx, osdx) = mirrored_nodes(inst);
            let old_p = nl.find(opdx);
            let old_s = nl.find(osdx);
            let int_p = old_p.remove_primary(inst);
            let int_s = old_s.remove_secondary(inst);
            let force = old_p.offline;
            let new_p = int_s.add_primary_ex(force, inst)?;
            let new_s = int_p.add_secondary_ex(force, inst, osdx)?;
            let new_inst = inst.set_both(osdx, Some(opdx));
            Ok((nl.add_two(new_p, new_s), new_inst, osdx, Some(opdx)))
        }
        Move::FailoverToAny(tdx) => {
            let opdx = inst.pnode;
            let old_p = nl.find(opdx);
            let target = nl.find(tdx);
            let int_p = old_p.remove_primary(inst);
            let force = old_p.offline;
            let new_t = target.add_primary_ex(force, inst)?;
            let new_inst = inst.set_primary(tdx);
            Ok((nl.add_two(int_p, new_t), new_inst, tdx, inst.snode))
        }
        Move::ReplacePrimary(tdx) => {
            let (opdx, osdx) = mirrored_nodes(inst);
            let old_p = nl.find(opdx);
            let old_s = nl.find(osdx);
            let target = nl.find(tdx);
            let int_p = old_p.remove_primary(inst);
            let int_s = old_s.remove_secondary(inst);
            let force = old_p.offline;
            // the instance migrates through the secondary, which must be
            // able to host it as a primary for the duration
            let _ = int_s.add_primary_ex(force, inst)?;
            let new_t = target.add_primary_ex(force, inst)?;
            let new_s = int_s.add_secondary_ex(force, inst, tdx)?;
            let new_inst = inst.set_primary(tdx);
            Ok((
                nl.add(int_p).add_two(new_t, new_s),
                new_inst,
                tdx,
                Some(osdx),
            ))
        }
        Move::ReplaceSecondary(tdx) => {
            let (pdx, osdx) = mirrored_nodes(inst);
            let old_s = nl.find(osdx);
            let target = nl.find(tdx);
            let int_s = old_s.remove_secondary(inst);
            let force = old_s.offline;
            let new_t = target.add_secondary_ex(force, inst, pdx)?;
            let new_inst = inst.set_secondary(Some(tdx));
            Ok((nl.add_two(int_s, new_t), new_inst, pdx, Some(tdx)))
        }
        Move::ReplaceAndFailover(tdx) => {
            let (opdx, osdx) = mirrored_nodes(inst);
            let old_p = nl.find(opdx);
            let old_s = nl.find(osdx);
            let target = nl.find(tdx);
            let int_p = old_p.remove_primary(inst);
            let int_s = old_s.remove_secondary(inst);
            let force = old_s.offline;
            let new_t = target.add_primary_ex(force, inst)?;
            let new_s = int_p.add_secondary_ex(force, inst, tdx)?;
            let new_inst = inst.set_both(tdx, Some(opdx));
            Ok((
                nl.add(int_s).add_two(new_t, new_s),
                new_inst,
                tdx,
                Some(opdx),
            ))
        }
        Move::FailoverAndReplace(tdx) => {
            let (opdx, osdx) = mirrored_nodes(inst);
            let old_p = nl.find(opdx);
            let old_s = nl.find(osdx);
            let target = nl.find(tdx);
            let int_p = old_p.remove_primary(inst);
            let int_s = old_s.remove_secondary(inst);
            let force = old_p.offline;
            let new_p = int_s.add_primary_ex(force, inst)?;
            let new_t = target.add_secondary_ex(force, inst, osdx)?;
            let new_inst = inst.set_both(osdx, Some(tdx));
            Ok((
                nl.add(int_p).add_two(new_p, new_t),
                new_inst,
                osdx,
                Some(tdx),
            ))
        }
    }
}

/// Enumerates the moves offered towards a target node, depending on the
/// instance's mirror type, whether the current secondary is itself a
/// candidate node, and whether instance (primary role) moves are
/// allowed at all.
pub fn possible_moves(
    mirror: MirrorType,
    use_secondary: bool,
    inst_moves: bool,
    tdx: Ndx,
) -> Vec<Move> {
    match (mirror, use_secondary, inst_moves) {
        (MirrorType::None, _, _) => vec![],
        (MirrorType::External, _, false) => vec![],
        (MirrorType::External, _, true) => vec![Move::FailoverToAny(tdx)],
        (MirrorType::Internal, _, false) => vec![Move::ReplaceSecondary(tdx)],
        (MirrorType::Internal, true, true) => vec![
            Move::ReplaceSecondary(tdx),
            Move::ReplaceAndFailover(tdx),
            Move::ReplacePrimary(tdx),
            Move::FailoverAndReplace(tdx),
        ],
        (MirrorType::Internal, false, true) => vec![
            Move::ReplaceSecondary(tdx),
            Move::ReplaceAndFailover(tdx),
        ],
    }
}
