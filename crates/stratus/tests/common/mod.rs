#![allow(dead_code)]

//! Shared builders for the engine tests.
//!
//! Clusters are assembled by placing instances with forced adds, so
//! fixtures can also represent degraded states (N+1 violations,
//! offline primaries) that regular arithmetic would reject.

use stratus::core::container::Container;
use stratus::core::group::{AllocPolicy, Group};
use stratus::core::instance::{DiskTemplate, Instance};
use stratus::core::node::Node;

/// A healthy online node with all of its capacity free.
pub fn make_node(idx: usize, name: &str, group: usize, mem: i64, dsk: i64, cpu: i64) -> Node {
    Node::new(idx, name, group, mem, 0, mem, dsk, dsk, cpu, false)
}

/// A node whose reported free memory differs from its total.
pub fn make_node_free(
    idx: usize,
    name: &str,
    group: usize,
    mem: i64,
    free_mem: i64,
    dsk: i64,
    cpu: i64,
) -> Node {
    Node::new(idx, name, group, mem, 0, free_mem, dsk, dsk, cpu, false)
}

pub fn drbd_instance(
    idx: usize,
    name: &str,
    mem: i64,
    dsk: i64,
    vcpus: i64,
    pdx: usize,
    sdx: usize,
) -> Instance {
    Instance::new(idx, name, mem, dsk, vcpus, true, pdx, Some(sdx), DiskTemplate::Drbd8)
}

pub fn rbd_instance(idx: usize, name: &str, mem: i64, dsk: i64, vcpus: i64, pdx: usize) -> Instance {
    Instance::new(idx, name, mem, dsk, vcpus, true, pdx, None, DiskTemplate::Rbd)
}

pub fn plain_instance(
    idx: usize,
    name: &str,
    mem: i64,
    dsk: i64,
    vcpus: i64,
    pdx: usize,
) -> Instance {
    Instance::new(idx, name, mem, dsk, vcpus, true, pdx, None, DiskTemplate::Plain)
}

/// Builds the snapshot pair with every instance's demand applied to its
/// nodes (forced, so degraded fixtures build too).
pub fn cluster_with(
    nodes: Vec<Node>,
    instances: Vec<Instance>,
) -> (Container<Node>, Container<Instance>) {
    let mut nl = Container::from_list(nodes);
    for inst in &instances {
        let primary = nl
            .find(inst.pnode)
            .add_primary_ex(true, inst)
            .unwrap_or_else(|e| panic!("fixture primary add failed: {}", e));
        nl = nl.add(primary);
        if let Some(sdx) = inst.snode {
            let secondary = nl
                .find(sdx)
                .add_secondary_ex(true, inst, inst.pnode)
                .unwrap_or_else(|e| panic!("fixture secondary add failed: {}", e));
            nl = nl.add(secondary);
        }
    }
    (nl, Container::from_list(instances))
}

pub fn one_group() -> Container<Group> {
    Container::from_list(vec![Group::new(0, "default", AllocPolicy::Preferred)])
}

pub fn two_groups(a: AllocPolicy, b: AllocPolicy) -> Container<Group> {
    Container::from_list(vec![Group::new(0, "ga", a), Group::new(1, "gb", b)])
}
