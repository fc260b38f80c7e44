//! Opcode payloads for the external job system.
//!
//! The engine never submits jobs; it emits the opcode sequence a move
//! translates to, shaped exactly as the job system expects.

use serde::Serialize;

use crate::core::common::{Idx, Ndx};
use crate::core::container::Container;
use crate::core::instance::Instance;
use crate::core::moves::Move;
use crate::core::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationMode {
    Live,
    NonLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplaceDisksMode {
    ReplaceOnPrimary,
    ReplaceOnSecondary,
    ReplaceNewSecondary,
    ReplaceAuto,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OpCode {
    InstanceMigrate {
        instance_name: String,
        migration_mode: Option<MigrationMode>,
        old_live_mode: Option<bool>,
        target_node: Option<String>,
        allow_runtime_changes: bool,
        ignore_ipolicy: bool,
        migration_cleanup: bool,
        iallocator: Option<String>,
        allow_failover: bool,
    },
    InstanceReplaceDisks {
        instance_name: String,
        early_release: bool,
        ignore_ipolicy: bool,
        mode: ReplaceDisksMode,
        disks: Vec<usize>,
        remote_node: Option<String>,
        iallocator: Option<String>,
    },
}

impl OpCode {
    fn migrate(instance_name: String, target_node: Option<String>) -> OpCode {
        OpCode::InstanceMigrate {
            instance_name,
            migration_mode: None,
            old_live_mode: None,
            target_node,
            allow_runtime_changes: false,
            ignore_ipolicy: false,
            migration_cleanup: false,
            iallocator: None,
            allow_failover: true,
        }
    }

    fn replace_disks(instance_name: String, remote_node: String) -> OpCode {
        OpCode::InstanceReplaceDisks {
            instance_name,
            early_release: false,
            ignore_ipolicy: false,
            mode: ReplaceDisksMode::ReplaceNewSecondary,
            disks: Vec::new(),
            remote_node: Some(remote_node),
            iallocator: None,
        }
    }
}

/// Translates a move of the given instance into its opcode sequence.
///
/// Panics on an empty node name: names feed shell-visible job
/// parameters, and an unnamed node at this point is a programmer error.
pub fn imove_to_job(
    nl: &Container<Node>,
    il: &Container<Instance>,
    idx: Idx,
    mv: Move,
) -> Vec<OpCode> {
    let inst = il.find(idx);
    let iname = inst.name.clone();
    let node_name = |ndx: Ndx| -> String {
        let name = nl.name_of(ndx);
        assert!(!name.is_empty(), "empty name for node index {}", ndx);
        name.to_string()
    };
    match mv {
        Move::Failover => vec![OpCode::migrate(iname, None)],
        Move::FailoverToAny(np) => vec![OpCode::migrate(iname, Some(node_name(np)))],
        Move::ReplacePrimary(np) => vec![
            OpCode::migrate(iname.clone(), None),
            OpCode::replace_disks(iname.clone(), node_name(np)),
            OpCode::migrate(iname, None),
        ],
        Move::ReplaceSecondary(ns) => vec![OpCode::replace_disks(iname, node_name(ns))],
        Move::ReplaceAndFailover(np) => vec![
            OpCode::replace_disks(iname.clone(), node_name(np)),
            OpCode::migrate(iname, None),
        ],
        Move::FailoverAndReplace(ns) => vec![
            OpCode::migrate(iname.clone(), None),
            OpCode::replace_disks(iname, node_name(ns)),
        ],
    }
}
