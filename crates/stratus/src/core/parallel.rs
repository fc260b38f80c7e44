//! Order-preserving parallel map over pure functions.
//!
//! The two search hot spots (pair allocation and balancer victim
//! evaluation) are embarrassingly parallel; results are collected with
//! their input position and re-sorted, so the caller's reduction sees
//! them in input order and stays deterministic regardless of worker
//! count. Small inputs run sequentially with identical results.

use std::sync::mpsc::channel;
use std::sync::Arc;

use threadpool::ThreadPool;

/// Inputs shorter than this are mapped on the calling thread.
pub const SEQUENTIAL_CUTOFF: usize = 4;

pub fn par_map<T, R, F>(items: Vec<T>, workers: usize, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    if workers <= 1 || items.len() < SEQUENTIAL_CUTOFF {
        return items.into_iter().map(f).collect();
    }
    let pool = ThreadPool::new(workers.min(items.len()));
    let (tx, rx) = channel();
    let f = Arc::new(f);
    let len = items.len();
    for (id, item) in items.into_iter().enumerate() {
        let tx = tx.clone();
        let f = Arc::clone(&f);
        pool.execute(move || {
            tx.send((id, f(item))).unwrap();
        });
    }
    let mut results: Vec<(usize, R)> = rx.iter().take(len).collect();
    results.sort_by_key(|r| r.0);
    results.into_iter().map(|r| r.1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_input_order() {
        let xs: Vec<usize> = (0..64).collect();
        let doubled = par_map(xs.clone(), 4, |x| x * 2);
        assert_eq!(doubled, xs.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let xs: Vec<usize> = (0..33).collect();
        let seq = par_map(xs.clone(), 1, |x| x * x + 1);
        let par = par_map(xs, 8, |x| x * x + 1);
        assert_eq!(seq, par);
    }
}
