//! Cluster variance scoring.
//!
//! The score of a node set is a weighted sum of thirteen balance
//! metrics; lower is better. The metric order and weights are a single
//! shared table consumed by both the scorer and the stats formatter.

use crate::core::container::Container;
use crate::core::node::Node;

/// Weight and name of every detailed metric, in evaluation order.
///
/// Offline primaries carry the largest weight so that evacuating
/// offline nodes dominates every other consideration.
pub const DETAILED_CV_INFO: [(f64, &str); 13] = [
    (1.0, "mem_dev"),
    (1.0, "disk_dev"),
    (1.0, "n1_fail_count"),
    (1.0, "reserved_mem_dev"),
    (4.0, "offline_inst_count"),
    (16.0, "offline_pri_count"),
    (1.0, "cpu_dev"),
    (1.0, "cpu_load_dev"),
    (1.0, "mem_load_dev"),
    (1.0, "disk_load_dev"),
    (1.0, "net_load_dev"),
    (2.0, "tag_conflict_score"),
    (1.0, "spindle_dev"),
];

/// Population standard deviation; zero for an empty sample.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    (xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n).sqrt()
}

fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den > 0. {
        num / den
    } else {
        0.
    }
}

/// Computes the detailed metric vector over a node set, in the order of
/// [`DETAILED_CV_INFO`].
pub fn detailed_cv(all_nodes: &[&Node]) -> Vec<f64> {
    let (offline, online): (Vec<&Node>, Vec<&Node>) =
        all_nodes.iter().copied().partition(|n| n.offline);

    let mem_dev = std_dev(&online.iter().map(|n| n.p_mem()).collect::<Vec<_>>());
    let dsk_dev = std_dev(&online.iter().map(|n| n.p_dsk()).collect::<Vec<_>>());
    let n1_count = online
        .iter()
        .filter(|n| n.fail_n1())
        .map(|n| n.p_list.len() + n.s_list.len())
        .sum::<usize>() as f64;
    let res_dev = std_dev(&online.iter().map(|n| n.p_rem()).collect::<Vec<_>>());
    let offline_inst = offline
        .iter()
        .map(|n| n.p_list.len() + n.s_list.len())
        .sum::<usize>() as f64;
    let offline_pri = offline.iter().map(|n| n.p_list.len()).sum::<usize>() as f64;
    let cpu_dev = std_dev(&online.iter().map(|n| n.p_cpu()).collect::<Vec<_>>());

    let mut cpu_loads = Vec::with_capacity(online.len());
    let mut mem_loads = Vec::with_capacity(online.len());
    let mut dsk_loads = Vec::with_capacity(online.len());
    let mut net_loads = Vec::with_capacity(online.len());
    for n in &online {
        cpu_loads.push(ratio_or_zero(n.util_load.cpu, n.util_pool.cpu));
        mem_loads.push(ratio_or_zero(n.util_load.mem, n.util_pool.mem));
        dsk_loads.push(ratio_or_zero(n.util_load.dsk, n.util_pool.dsk));
        net_loads.push(ratio_or_zero(n.util_load.net, n.util_pool.net));
    }

    let tag_score = online
        .iter()
        .map(|n| n.conflicting_primaries())
        .sum::<i64>() as f64;
    let spindle_dev = std_dev(
        &online
            .iter()
            .map(|n| ratio_or_zero(n.inst_spindles as f64, n.hi_spindles))
            .collect::<Vec<_>>(),
    );

    vec![
        mem_dev,
        dsk_dev,
        n1_count,
        res_dev,
        offline_inst,
        offline_pri,
        cpu_dev,
        std_dev(&cpu_loads),
        std_dev(&mem_loads),
        std_dev(&dsk_loads),
        std_dev(&net_loads),
        tag_score,
        spindle_dev,
    ]
}

/// Weighted total of the detailed metrics over a node slice.
pub fn comp_cv_nodes(nodes: &[&Node]) -> f64 {
    detailed_cv(nodes)
        .iter()
        .zip(DETAILED_CV_INFO.iter())
        .map(|(metric, (weight, _))| metric * weight)
        .sum()
}

/// Weighted total over a node snapshot.
pub fn comp_cv(nl: &Container<Node>) -> f64 {
    comp_cv_nodes(&nl.elems().collect::<Vec<_>>())
}

/// Renders every metric with its value and weight, for diagnostics.
pub fn print_stats(nl: &Container<Node>) -> String {
    let nodes: Vec<&Node> = nl.elems().collect();
    detailed_cv(&nodes)
        .iter()
        .zip(DETAILED_CV_INFO.iter())
        .map(|(value, (weight, name))| format!("{}={:.8}(x{:.2})", name, value, weight))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_dev_of_empty_sample_is_zero() {
        assert_eq!(std_dev(&[]), 0.);
    }

    #[test]
    fn std_dev_of_constant_sample_is_zero() {
        assert_eq!(std_dev(&[0.25, 0.25, 0.25]), 0.);
    }

    #[test]
    fn std_dev_known_value() {
        // {0, 1}: mean 0.5, population deviation 0.5
        assert!((std_dev(&[0., 1.]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weight_table_matches_metric_count() {
        let nodes: Vec<&Node> = Vec::new();
        assert_eq!(detailed_cv(&nodes).len(), DETAILED_CV_INFO.len());
    }
}
