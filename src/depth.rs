//! Depth-bucketed accuracy.
//!
//! Scored questions are partitioned into `num_buckets` equal-width depth
//! intervals `[k/n, (k+1)/n)`, the last one closed at 1.0. Empty buckets
//! keep an undefined accuracy so they never read as a real 0%.

use crate::ground_truth::{DepthScale, GroundTruthStore, NeedleInfo};
use crate::matcher::MatchOutcome;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Guards against `0.29 * 100.0 == 28.999...` style flooring errors.
const BUCKET_EPSILON: f64 = 1e-9;

/// Largest supported bucket count; finer buckets no longer get distinct
/// whole-percent labels.
pub const MAX_BUCKETS: usize = 100;

/// Accuracy over one depth interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub bucket_id: usize,
    /// Inclusive lower bound of the depth interval.
    pub low: f64,
    /// Exclusive upper bound, except for the final bucket.
    pub high: f64,
    pub count: usize,
    pub matched: usize,
    /// `None` when the bucket is empty.
    pub accuracy: Option<f64>,
}

impl BucketSummary {
    fn empty(bucket_id: usize, num_buckets: usize) -> Self {
        let n = num_buckets as f64;
        Self {
            bucket_id,
            low: bucket_id as f64 / n,
            high: (bucket_id + 1) as f64 / n,
            count: 0,
            matched: 0,
            accuracy: None,
        }
    }

    fn record(&mut self, matched: bool) {
        self.count += 1;
        if matched {
            self.matched += 1;
        }
        self.accuracy = Some(self.matched as f64 / self.count as f64);
    }

    /// Percent label such as `20-30%`.
    pub fn label(&self) -> String {
        format!(
            "{}-{}%",
            (self.low * 100.0).round() as u32,
            (self.high * 100.0).round().min(100.0) as u32
        )
    }
}

/// Bucket index for a relative depth in `[0, 1]`.
///
/// Depths within `1e-9` below a boundary `k/n` land in bucket `k`, so a
/// depth written as `0.29` counts as 29% rather than 28.999...%. Page
/// positions avoid floats entirely, see [`needle_bucket`].
pub fn bucket_index(depth: f64, num_buckets: usize) -> usize {
    let scaled = (depth.clamp(0.0, 1.0) * num_buckets as f64 + BUCKET_EPSILON).floor() as usize;
    scaled.min(num_buckets - 1)
}

/// Bucket index for a needle.
///
/// Page positions are bucketed exactly as `(page - 1) * n / n_pages`.
pub fn needle_bucket(needle: &NeedleInfo, scale: DepthScale, num_buckets: usize) -> usize {
    match (scale, needle.page) {
        (DepthScale::Pages(n_pages), Some(page)) if n_pages > 0 && page >= 1 => {
            let k = u64::from(page - 1) * num_buckets as u64 / u64::from(n_pages);
            (k as usize).min(num_buckets - 1)
        }
        _ => bucket_index(needle.depth, num_buckets),
    }
}

/// Bucket outcomes by their needle depth.
///
/// Outcomes without metadata are left out of every bucket and logged.
pub fn bucket_by_depth(
    outcomes: &[MatchOutcome],
    store: &GroundTruthStore,
    num_buckets: usize,
) -> Vec<BucketSummary> {
    if num_buckets == 0 {
        return Vec::new();
    }

    let scale = store.depth_scale();
    let mut buckets: Vec<BucketSummary> = (0..num_buckets)
        .map(|k| BucketSummary::empty(k, num_buckets))
        .collect();

    for outcome in outcomes {
        match store.needle(outcome.index) {
            Some(needle) => {
                buckets[needle_bucket(needle, scale, num_buckets)].record(outcome.matched)
            }
            None => warn!(
                question = outcome.index,
                "no needle metadata; question excluded from depth buckets"
            ),
        }
    }

    buckets
}

/// Bucket outcomes by their position when no needle metadata exists.
///
/// Outcomes in ascending index order are cut into consecutive chunks of
/// `ceil(len / num_buckets)`.
pub fn bucket_by_position(outcomes: &[MatchOutcome], num_buckets: usize) -> Vec<BucketSummary> {
    if num_buckets == 0 {
        return Vec::new();
    }

    let mut buckets: Vec<BucketSummary> = (0..num_buckets)
        .map(|k| BucketSummary::empty(k, num_buckets))
        .collect();

    if outcomes.is_empty() {
        return buckets;
    }

    let mut ordered: Vec<&MatchOutcome> = outcomes.iter().collect();
    ordered.sort_by_key(|o| o.index);

    let chunk = outcomes.len().div_ceil(num_buckets);
    for (position, outcome) in ordered.into_iter().enumerate() {
        let k = (position / chunk).min(num_buckets - 1);
        buckets[k].record(outcome.matched);
    }

    buckets
}

/// Unweighted mean of match outcomes, `None` when nothing was scored.
pub fn overall_accuracy(outcomes: &[MatchOutcome]) -> Option<f64> {
    if outcomes.is_empty() {
        return None;
    }
    let matched = outcomes.iter().filter(|o| o.matched).count();
    Some(matched as f64 / outcomes.len() as f64)
}
