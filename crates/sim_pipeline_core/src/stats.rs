//! Pooled reduction of per-worker travel-time statistics.
//!
//! Each worker reports the population (count, mean, variance) of its own
//! samples; the head pools them into the global triple. The formula is
//! exact: it reduces to the single-pass statistics over the union of all
//! underlying samples.

use serde::{Deserialize, Serialize};

use crate::wire::StatRecord;

/// Combined statistics across all workers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl GlobalStats {
    pub fn std_dev(&self) -> f64 {
        // Pooling can dip an all-equal-sample variance epsilon-negative.
        self.variance.max(0.0).sqrt()
    }
}

/// Pool per-worker records:
/// `N = Σ nᵢ`, `mean = Σ μᵢ·nᵢ / N`,
/// `variance = Σ (σ²ᵢ + μ²ᵢ)·nᵢ / N − mean²`.
/// Returns `None` when no worker collected a sample.
pub fn combine_stats(records: &[StatRecord]) -> Option<GlobalStats> {
    let mut total_count = 0.0;
    let mut total_sum = 0.0;
    let mut total_squared_sum = 0.0;

    for record in records {
        total_count += record.count;
        total_sum += record.mean * record.count;
        total_squared_sum += (record.variance + record.mean * record.mean) * record.count;
    }

    if total_count <= 0.0 {
        return None;
    }

    let mean = total_sum / total_count;
    let variance = total_squared_sum / total_count - mean * mean;
    Some(GlobalStats {
        mean,
        variance,
        count: total_count as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population_record(samples: &[f64]) -> StatRecord {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        StatRecord {
            mean,
            variance,
            count: n,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = 1e-9 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tolerance,
            "{actual} != {expected}"
        );
    }

    #[test]
    fn pooling_matches_single_pass_over_the_union() {
        let all: Vec<f64> = (0..60).map(|i| (i as f64 * 1.37).sin() * 25.0 + 40.0).collect();
        // Unequal group sizes on purpose.
        let groups = [&all[0..7], &all[7..30], &all[30..34], &all[34..60]];

        let records: Vec<StatRecord> = groups.iter().map(|g| population_record(g)).collect();
        let combined = combine_stats(&records).expect("non-empty");
        let direct = population_record(&all);

        assert_eq!(combined.count, 60);
        assert_close(combined.mean, direct.mean);
        assert_close(combined.variance, direct.variance);
    }

    #[test]
    fn single_group_is_the_identity() {
        let record = population_record(&[3.0, 5.0, 10.0]);
        let combined = combine_stats(&[record]).expect("non-empty");
        assert_close(combined.mean, record.mean);
        assert_close(combined.variance, record.variance);
        assert_eq!(combined.count, 3);
    }

    #[test]
    fn empty_workers_contribute_nothing() {
        let empty = StatRecord {
            mean: 0.0,
            variance: 0.0,
            count: 0.0,
        };
        let record = population_record(&[2.0, 4.0]);
        let combined = combine_stats(&[empty, record, empty]).expect("non-empty");
        assert_eq!(combined.count, 2);
        assert_close(combined.mean, 3.0);
    }

    #[test]
    fn no_samples_anywhere_is_none() {
        let empty = StatRecord {
            mean: 0.0,
            variance: 0.0,
            count: 0.0,
        };
        assert!(combine_stats(&[empty, empty]).is_none());
        assert!(combine_stats(&[]).is_none());
    }

    #[test]
    fn identical_samples_pool_to_zero_variance() {
        let group = population_record(&[7.0, 7.0, 7.0]);
        let combined = combine_stats(&[group, group]).expect("non-empty");
        assert_close(combined.mean, 7.0);
        assert!(combined.std_dev() < 1e-9);
    }
}
