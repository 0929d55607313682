//! Parallel mode and median computation.
//!
//! An array is cut into contiguous segments, one per requested worker. Each
//! segment is counted into its own [`FrequencyTable`] on the shared
//! [`ThreadPool`], the tables are merged by summing counts, and the mode and
//! median are read off the merged table.
//!
//! Segment jobs never share mutable state: each owns a clone of the array
//! handle and reports its table over a channel. The caller blocks until every
//! segment has reported, so the result does not depend on how many workers
//! were used or in which order they finished.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use tally::stats::{ThreadPool, aggregate};
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let values: Arc<[i32]> = Arc::from(vec![5, 3, 5, 1, 3, 5]);
//! let summary = aggregate(&pool, &values, 2).unwrap();
//!
//! assert_eq!(summary.mode, vec![5]);
//! assert_eq!(summary.median, 4.0);
//! ```
mod frequency;
mod thread;

use std::{
    ops::Range,
    sync::{Arc, mpsc},
};

use log::trace;
use thiserror::Error;

pub use frequency::{FrequencyTable, Summary};
pub use thread::{PoolError, ThreadPool};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("cannot aggregate an empty array")]
    EmptyArray,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("segment worker lost; received {received} of {expected} frequency tables")]
    WorkerLost { expected: usize, received: usize },
}

/// Splits `0..len` into `workers` contiguous ranges.
///
/// Every range but the last is `len / workers` long; the last one absorbs
/// the remainder. With more workers than values the leading ranges are empty
/// and the last covers the whole array.
///
/// # Panics
/// If `workers` is zero.
pub fn segment_bounds(len: usize, workers: usize) -> Vec<Range<usize>> {
    assert!(workers > 0, "worker count must be positive");

    let size = len / workers;
    (0..workers)
        .map(|i| {
            let start = i * size;
            let end = if i == workers - 1 { len } else { start + size };
            start..end
        })
        .collect()
}

/// Computes the mode and median of `values` using `workers` segment jobs.
///
/// # Panics
/// If `workers` is zero; callers validate worker counts first.
pub fn aggregate(
    pool: &ThreadPool,
    values: &Arc<[i32]>,
    workers: usize,
) -> Result<Summary, AggregateError> {
    if values.is_empty() {
        return Err(AggregateError::EmptyArray);
    }

    let segments = segment_bounds(values.len(), workers);
    let expected = segments.len();
    let (sender, receiver) = mpsc::channel();

    for (segment, range) in segments.into_iter().enumerate() {
        let values = Arc::clone(values);
        let sender = sender.clone();
        pool.execute(move || {
            trace!("counting segment {segment} ({range:?})");
            let table = FrequencyTable::from_values(&values[range]);
            // The receiver is gone only if aggregation was abandoned.
            let _ = sender.send(table);
        })?;
    }
    drop(sender);

    let mut merged = FrequencyTable::default();
    let mut received = 0;
    for table in receiver {
        merged.merge(table);
        received += 1;
    }

    if received != expected {
        return Err(AggregateError::WorkerLost { expected, received });
    }

    merged.summary().ok_or(AggregateError::EmptyArray)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random values in `-range..range`.
    fn sample(len: usize, seed: u64, range: i64) -> Vec<i32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as i64 % (2 * range) - range) as i32
            })
            .collect()
    }

    fn sorted_median(values: &[i32]) -> f64 {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        if n % 2 == 1 {
            f64::from(sorted[n / 2])
        } else {
            (f64::from(sorted[n / 2 - 1]) + f64::from(sorted[n / 2])) / 2.0
        }
    }

    #[test]
    fn bounds_cover_array_with_remainder_in_last_segment() {
        assert_eq!(segment_bounds(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(segment_bounds(6, 2), vec![0..3, 3..6]);
        assert_eq!(segment_bounds(4, 1), vec![0..4]);
    }

    #[test]
    fn bounds_with_more_workers_than_values() {
        assert_eq!(segment_bounds(1, 3), vec![0..0, 0..0, 0..1]);
    }

    #[test]
    #[should_panic(expected = "worker count must be positive")]
    fn bounds_reject_zero_workers() {
        segment_bounds(5, 0);
    }

    #[test]
    fn aggregate_mixed_array() {
        let pool = ThreadPool::new(2).unwrap();
        let values: Arc<[i32]> = Arc::from(vec![5, 3, 5, 1, 3, 5]);

        let summary = aggregate(&pool, &values, 2).unwrap();
        assert_eq!(summary.mode, vec![5]);
        assert_eq!(summary.median, 4.0);
    }

    #[test]
    fn aggregate_single_value_with_excess_workers() {
        let pool = ThreadPool::new(2).unwrap();
        let values: Arc<[i32]> = Arc::from(vec![7]);

        let summary = aggregate(&pool, &values, 3).unwrap();
        assert_eq!(summary.mode, vec![7]);
        assert_eq!(summary.median, 7.0);
    }

    #[test]
    fn aggregate_rejects_empty_array() {
        let pool = ThreadPool::new(1).unwrap();
        let values: Arc<[i32]> = Arc::from(Vec::new());

        assert!(matches!(
            aggregate(&pool, &values, 1),
            Err(AggregateError::EmptyArray)
        ));
    }

    #[test]
    fn median_is_independent_of_worker_count() {
        let pool = ThreadPool::new(4).unwrap();

        for (len, seed) in [(1, 1), (2, 2), (17, 3), (64, 4), (101, 5)] {
            let raw = sample(len, seed, 50);
            let expected = sorted_median(&raw);
            let values: Arc<[i32]> = Arc::from(raw);

            for workers in 1..=len {
                let summary = aggregate(&pool, &values, workers).unwrap();
                assert_eq!(summary.median, expected, "len {len}, workers {workers}");
            }
        }
    }

    #[test]
    fn mode_matches_maximum_frequency() {
        let pool = ThreadPool::new(3).unwrap();
        let raw = sample(500, 11, 20);
        let table = FrequencyTable::from_values(&raw);
        let values: Arc<[i32]> = Arc::from(raw.clone());

        let summary = aggregate(&pool, &values, 7).unwrap();
        let max = summary
            .mode
            .iter()
            .map(|&v| raw.iter().filter(|&&x| x == v).count())
            .max()
            .unwrap();

        assert!(!summary.mode.is_empty());
        assert!(summary.mode.windows(2).all(|w| w[0] < w[1]));
        for &value in &summary.mode {
            assert_eq!(table.count(value) as usize, max);
        }
        for &value in &raw {
            assert!(table.count(value) as usize <= max);
            if table.count(value) as usize == max {
                assert!(summary.mode.contains(&value));
            }
        }
    }
}
