mod common;

use common::*;
use std::collections::BTreeSet;
use stratus::core::cluster::{find_split_instances, instance_pri_group, split_cluster};
use stratus::core::container::Container;
use stratus::core::evac::{
    node_evac_instance, nodes_to_evacuate, try_change_group, try_node_evac, EvacMode,
};
use stratus::core::instance::DiskTemplate;
use stratus::core::opcodes::OpCode;

fn four_node_cluster() -> (
    Container<stratus::core::node::Node>,
    Container<stratus::core::instance::Instance>,
) {
    cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_000_000, 8),
            make_node(1, "n2", 0, 65536, 1_000_000, 8),
            make_node(2, "n3", 0, 65536, 1_000_000, 8),
            make_node(3, "n4", 0, 65536, 1_000_000, 8),
        ],
        vec![drbd_instance(0, "i1", 4096, 50_000, 2, 0, 1)],
    )
}

#[test]
fn plain_instances_cannot_be_relocated() {
    let (nl, il) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_000_000, 8),
            make_node(1, "n2", 0, 65536, 1_000_000, 8),
        ],
        vec![plain_instance(0, "i1", 4096, 50_000, 2, 0)],
    );
    let inst = il.find(0).clone();

    let err = node_evac_instance(&nl, &il, EvacMode::ChangeAll, &inst, 0, &[1]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Instances of type plain cannot be relocated"
    );
}

#[test]
fn external_mirror_rejects_change_secondary() {
    let (nl, il) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_000_000, 8),
            make_node(1, "n2", 0, 65536, 1_000_000, 8),
        ],
        vec![rbd_instance(0, "i1", 4096, 50_000, 2, 0)],
    );
    let inst = il.find(0).clone();

    let err =
        node_evac_instance(&nl, &il, EvacMode::ChangeSecondary, &inst, 0, &[1]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Instances with disk template 'rbd' can't execute change secondary"
    );
}

#[test]
fn external_mirror_changes_primary_via_failover_to_any() {
    let (nl, il) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_000_000, 8),
            make_node(1, "n2", 0, 65536, 1_000_000, 8),
            make_node(2, "n3", 0, 65536, 1_000_000, 8),
        ],
        vec![rbd_instance(0, "i1", 4096, 50_000, 2, 0)],
    );
    let inst = il.find(0).clone();

    let (nl2, il2, ops) =
        node_evac_instance(&nl, &il, EvacMode::ChangePrimary, &inst, 0, &[1, 2]).unwrap();

    let moved = il2.find(0);
    assert_ne!(moved.pnode, 0);
    assert_eq!(moved.snode, None);
    assert_eq!(nl2.find(0).p_list.len(), 0);
    assert_eq!(ops.len(), 1);
    match &ops[0] {
        OpCode::InstanceMigrate { target_node, .. } => {
            assert_eq!(target_node.as_deref(), Some(nl2.name_of(moved.pnode)));
        }
        other => panic!("expected a migrate opcode, got {:?}", other),
    }
}

#[test]
fn drbd_change_primary_is_a_bare_failover() {
    let (nl, il) = four_node_cluster();
    let inst = il.find(0).clone();

    let (nl2, il2, ops) =
        node_evac_instance(&nl, &il, EvacMode::ChangePrimary, &inst, 0, &[2, 3]).unwrap();

    let moved = il2.find(0);
    assert_eq!(moved.pnode, 1);
    assert_eq!(moved.snode, Some(0));
    assert_eq!(nl2.find(1).p_list, vec![0]);
    assert_eq!(ops.len(), 1);
    match &ops[0] {
        OpCode::InstanceMigrate { target_node, .. } => assert_eq!(*target_node, None),
        other => panic!("expected a migrate opcode, got {:?}", other),
    }
}

#[test]
fn drbd_change_secondary_replaces_the_mirror() {
    let (nl, il) = four_node_cluster();
    let inst = il.find(0).clone();

    let (nl2, il2, ops) =
        node_evac_instance(&nl, &il, EvacMode::ChangeSecondary, &inst, 0, &[2, 3]).unwrap();

    let moved = il2.find(0);
    assert_eq!(moved.pnode, 0);
    assert!(moved.snode == Some(2) || moved.snode == Some(3));
    assert_eq!(nl2.find(1).s_list.len(), 0);
    assert_eq!(ops.len(), 1);
    match &ops[0] {
        OpCode::InstanceReplaceDisks { remote_node, .. } => {
            assert_eq!(
                remote_node.as_deref(),
                Some(nl2.name_of(moved.snode.unwrap()))
            );
        }
        other => panic!("expected a replace-disks opcode, got {:?}", other),
    }
}

#[test]
fn drbd_change_all_stages_the_full_relocation() {
    let (nl, il) = four_node_cluster();
    let inst = il.find(0).clone();

    let (nl2, il2, ops) =
        node_evac_instance(&nl, &il, EvacMode::ChangeAll, &inst, 0, &[2, 3]).unwrap();

    let moved = il2.find(0);
    assert_eq!(moved.pnode, 2);
    assert_eq!(moved.snode, Some(3));
    assert!(nl2.find(0).p_list.is_empty());
    assert!(nl2.find(1).s_list.is_empty());
    // replace-secondary, failover, replace-secondary
    assert_eq!(ops.len(), 3);
    assert!(matches!(ops[0], OpCode::InstanceReplaceDisks { .. }));
    assert!(matches!(ops[1], OpCode::InstanceMigrate { .. }));
    assert!(matches!(ops[2], OpCode::InstanceReplaceDisks { .. }));
}

#[test]
fn nodes_to_evacuate_follows_the_mode() {
    let (_, il) = four_node_cluster();

    assert_eq!(
        nodes_to_evacuate(&il, EvacMode::ChangePrimary, &[0]),
        BTreeSet::from([0])
    );
    assert_eq!(
        nodes_to_evacuate(&il, EvacMode::ChangeSecondary, &[0]),
        BTreeSet::from([1])
    );
    assert_eq!(
        nodes_to_evacuate(&il, EvacMode::ChangeAll, &[0]),
        BTreeSet::from([0, 1])
    );
}

#[test]
fn try_node_evac_moves_off_both_nodes() {
    let (nl, il) = four_node_cluster();

    let (nl2, il2, sol) = try_node_evac(&nl, &il, EvacMode::ChangeAll, &[0]).unwrap();

    assert_eq!(sol.moved.len(), 1);
    assert!(sol.failed.is_empty());
    assert_eq!(sol.opcodes.len(), 1);
    let (idx, gdx, nodes) = &sol.moved[0];
    assert_eq!(*idx, 0);
    assert_eq!(*gdx, 0);
    assert_eq!(*nodes, vec![2, 3]);
    let moved = il2.find(0);
    assert_eq!(moved.pnode, 2);
    assert_eq!(moved.snode, Some(3));
    assert!(nl2.find(0).p_list.is_empty() && nl2.find(0).s_list.is_empty());
    assert!(nl2.find(1).p_list.is_empty() && nl2.find(1).s_list.is_empty());
}

#[test]
fn try_node_evac_records_unfixable_instances() {
    // only the two hosting nodes exist, so there is nowhere to go
    let (nl, il) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_000_000, 8),
            make_node(1, "n2", 0, 65536, 1_000_000, 8),
        ],
        vec![drbd_instance(0, "i1", 4096, 50_000, 2, 0, 1)],
    );

    let (_, _, sol) = try_node_evac(&nl, &il, EvacMode::ChangeAll, &[0]).unwrap();

    assert!(sol.moved.is_empty());
    assert_eq!(sol.failed.len(), 1);
    assert_eq!(sol.failed[0].0, 0);
}

#[test]
fn change_group_lands_in_another_group() {
    use stratus::core::group::AllocPolicy;

    let (nl, il) = cluster_with(
        vec![
            make_node(0, "a1", 0, 65536, 1_000_000, 8),
            make_node(1, "a2", 0, 65536, 1_000_000, 8),
            make_node(2, "b1", 1, 65536, 1_000_000, 8),
            make_node(3, "b2", 1, 65536, 1_000_000, 8),
        ],
        vec![drbd_instance(0, "i1", 4096, 50_000, 2, 0, 1)],
    );
    let gl = two_groups(AllocPolicy::Preferred, AllocPolicy::Preferred);

    let (nl2, il2, sol) = try_change_group(&gl, &nl, &il, &[0], &[], 1).unwrap();

    assert!(sol.failed.is_empty(), "failed: {:?}", sol.failed);
    assert_eq!(sol.moved.len(), 1);
    let moved = il2.find(0);
    assert_eq!(instance_pri_group(&nl2, moved), 1);
    assert_eq!(moved.all_nodes(), vec![2, 3]);
}

#[test]
fn split_cluster_partitions_by_group() {
    let (nl, il) = cluster_with(
        vec![
            make_node(0, "a1", 0, 65536, 1_000_000, 8),
            make_node(1, "a2", 0, 65536, 1_000_000, 8),
            make_node(2, "b1", 1, 65536, 1_000_000, 8),
        ],
        vec![
            drbd_instance(0, "i1", 4096, 50_000, 2, 0, 1),
            plain_instance(1, "i2", 2048, 10_000, 1, 2),
        ],
    );

    let parts = split_cluster(&nl, &il);
    assert_eq!(parts.len(), 2);

    let mut node_keys: Vec<usize> = Vec::new();
    let mut inst_keys: Vec<usize> = Vec::new();
    for (_, (gnl, gil)) in &parts {
        node_keys.extend(gnl.keys());
        inst_keys.extend(gil.keys());
    }
    node_keys.sort_unstable();
    inst_keys.sort_unstable();
    // exhaustive and disjoint on both containers
    assert_eq!(node_keys, nl.keys());
    assert_eq!(inst_keys, il.keys());

    let (g0, (gnl0, gil0)) = &parts[0];
    assert_eq!(*g0, 0);
    assert_eq!(gnl0.keys(), vec![0, 1]);
    assert_eq!(gil0.keys(), vec![0]);
}

#[test]
fn split_instances_are_detected() {
    let (nl, il) = cluster_with(
        vec![
            make_node(0, "a1", 0, 65536, 1_000_000, 8),
            make_node(1, "a2", 0, 65536, 1_000_000, 8),
            make_node(2, "b1", 1, 65536, 1_000_000, 8),
        ],
        vec![
            drbd_instance(0, "sane", 4096, 50_000, 2, 0, 1),
            drbd_instance(1, "split", 4096, 50_000, 2, 0, 2),
        ],
    );

    let split = find_split_instances(&nl, &il);
    assert_eq!(split.len(), 1);
    assert_eq!(split[0].name, "split");
}

#[test]
fn evacuation_is_blocked_for_local_disk_templates() {
    for template in [DiskTemplate::Plain, DiskTemplate::File] {
        let mut inst = plain_instance(0, "i1", 4096, 50_000, 2, 0);
        inst.disk_template = template;
        let (nl, il) = cluster_with(
            vec![
                make_node(0, "n1", 0, 65536, 1_000_000, 8),
                make_node(1, "n2", 0, 65536, 1_000_000, 8),
            ],
            vec![inst],
        );

        let (_, _, sol) = try_node_evac(&nl, &il, EvacMode::ChangePrimary, &[0]).unwrap();
        assert_eq!(sol.failed.len(), 1);
        assert!(sol.failed[0].1.contains("cannot be relocated"));
    }
}
