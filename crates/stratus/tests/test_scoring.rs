mod common;

use common::*;
use stratus::core::capacity::total_resources;
use stratus::core::node::Node;
use stratus::core::score::{comp_cv, comp_cv_nodes, detailed_cv, print_stats, DETAILED_CV_INFO};

#[test]
fn empty_balanced_cluster_scores_zero() {
    let (nl, _) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_048_576, 8),
            make_node(1, "n2", 0, 65536, 1_048_576, 8),
        ],
        vec![],
    );
    assert_eq!(comp_cv(&nl), 0.);
}

#[test]
fn score_is_nonnegative() {
    let (nl, _) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_048_576, 8),
            make_node(1, "n2", 0, 32768, 524_288, 4),
            make_node(2, "n3", 0, 16384, 262_144, 2),
        ],
        vec![
            drbd_instance(0, "i1", 4096, 51_200, 2, 0, 1),
            plain_instance(1, "i2", 2048, 10_000, 1, 2),
        ],
    );
    assert!(comp_cv(&nl) >= 0.);
}

#[test]
fn score_is_invariant_under_node_reordering() {
    let (nl, _) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_048_576, 8),
            make_node(1, "n2", 0, 32768, 524_288, 4),
            make_node(2, "n3", 0, 16384, 262_144, 2),
        ],
        vec![drbd_instance(0, "i1", 4096, 51_200, 2, 0, 1)],
    );
    let nodes: Vec<&Node> = nl.elems().collect();
    let reversed: Vec<&Node> = nl.elems().rev().collect();
    let rotated: Vec<&Node> = {
        let mut v: Vec<&Node> = nl.elems().collect();
        v.rotate_left(1);
        v
    };

    let reference = comp_cv_nodes(&nodes);
    assert!((comp_cv_nodes(&reversed) - reference).abs() < 1e-12);
    assert!((comp_cv_nodes(&rotated) - reference).abs() < 1e-12);
}

#[test]
fn n1_failure_shows_in_third_metric() {
    let (nl, _) = cluster_with(
        vec![
            make_node_free(0, "n1", 0, 16384, 8192, 1_048_576, 8),
            make_node(1, "n2", 0, 32768, 1_048_576, 8),
            make_node(2, "n3", 0, 32768, 1_048_576, 8),
        ],
        vec![drbd_instance(0, "big", 10_240, 10_000, 2, 1, 0)],
    );
    let nodes: Vec<&Node> = nl.elems().collect();
    let metrics = detailed_cv(&nodes);
    assert!(metrics[2] > 0.);
}

#[test]
fn offline_nodes_count_hosted_instances() {
    let mut n1 = make_node(0, "n1", 0, 65536, 1_048_576, 8);
    n1.offline = true;
    let (nl, _) = cluster_with(
        vec![n1, make_node(1, "n2", 0, 65536, 1_048_576, 8)],
        vec![drbd_instance(0, "i1", 4096, 51_200, 2, 0, 1)],
    );
    let nodes: Vec<&Node> = nl.elems().collect();
    let metrics = detailed_cv(&nodes);
    // one instance on an offline node, which is also its primary
    assert_eq!(metrics[4], 1.);
    assert_eq!(metrics[5], 1.);
    // the offline-primary weight dominates the total
    assert!(comp_cv(&nl) >= 16.);
}

#[test]
fn print_stats_names_every_metric() {
    let (nl, _) = cluster_with(
        vec![make_node(0, "n1", 0, 65536, 1_048_576, 8)],
        vec![],
    );
    let stats = print_stats(&nl);
    for (_, name) in DETAILED_CV_INFO.iter() {
        assert!(stats.contains(name), "missing metric {} in {}", name, stats);
    }
}

#[test]
fn total_resources_aggregates_online_nodes() {
    let mut offline = make_node(2, "n3", 0, 65536, 1_048_576, 8);
    offline.offline = true;
    let (nl, _) = cluster_with(
        vec![
            make_node(0, "n1", 0, 65536, 1_048_576, 8),
            make_node(1, "n2", 0, 32768, 524_288, 4),
            offline,
        ],
        vec![plain_instance(0, "i1", 4096, 10_000, 2, 0)],
    );

    let cs = total_resources(&nl);
    assert_eq!(cs.t_mem, 65536 + 32768);
    assert_eq!(cs.t_dsk, 1_048_576 + 524_288);
    assert_eq!(cs.t_cpu, 12);
    assert_eq!(cs.f_mem, (65536 - 4096) + 32768);
    assert_eq!(cs.i_mem, 4096);
    assert_eq!(cs.i_dsk, 10_000);
    assert_eq!(cs.i_cpu, 2);
    assert_eq!(cs.n_inst, 1);
    assert_eq!(cs.m_mem, 65536 - 4096);
    assert!(cs.score >= 0.);
}
