// tests/property/throughput_test.rs

//! Property-based tests for the throughput estimator
//! Tests the moving-average recurrence, bounds, and the lifetime average

use proptest::prelude::*;
use std::time::Duration;
use txnstats::core::stats::ThroughputEstimator;

const EPSILON: f64 = 1e-9;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_weighted_avg_follows_recurrence(
        deltas in prop::collection::vec(0u64..10_000, 1..50),
        alpha in 0.01f64..=1.0,
        interval_ms in 1u64..5_000
    ) {
        let interval = Duration::from_millis(interval_ms);
        let mut estimator = ThroughputEstimator::new(interval, alpha);
        let mut committed = 0u64;
        let mut expected: Option<f64> = None;

        for delta in &deltas {
            committed += delta;
            let sample = estimator.observe(committed);
            let instant = *delta as f64 / interval.as_secs_f64();
            let next = match expected {
                None => instant,
                Some(prev) => alpha * instant + (1.0 - alpha) * prev,
            };
            prop_assert!((sample.instant - instant).abs() < EPSILON * instant.max(1.0));
            prop_assert!((sample.weighted_avg - next).abs() < 1e-6 * next.max(1.0));
            expected = Some(next);
        }
    }

    #[test]
    fn test_weighted_avg_stays_within_observed_range(
        deltas in prop::collection::vec(0u64..10_000, 1..50),
        alpha in 0.01f64..=1.0
    ) {
        let mut estimator = ThroughputEstimator::new(Duration::from_secs(1), alpha);
        let mut committed = 0u64;
        let (mut lo, mut hi) = (f64::MAX, f64::MIN);
        for delta in &deltas {
            committed += delta;
            let sample = estimator.observe(committed);
            lo = lo.min(sample.instant);
            hi = hi.max(sample.instant);
            prop_assert!(sample.weighted_avg >= lo - 1e-6);
            prop_assert!(sample.weighted_avg <= hi + 1e-6);
        }
    }

    #[test]
    fn test_lifetime_avg_is_total_over_elapsed(
        deltas in prop::collection::vec(0u64..10_000, 1..50)
    ) {
        let mut estimator = ThroughputEstimator::new(Duration::from_secs(2), 0.4);
        let mut committed = 0u64;
        for (i, delta) in deltas.iter().enumerate() {
            committed += delta;
            let sample = estimator.observe(committed);
            let expected = committed as f64 / ((i as f64 + 1.0) * 2.0);
            prop_assert!((sample.lifetime_avg - expected).abs() < 1e-6 * expected.max(1.0));
            prop_assert_eq!(sample.cycle, i as u64 + 1);
        }
    }

    #[test]
    fn test_decreasing_count_never_yields_negative_throughput(
        counts in prop::collection::vec(0u64..1_000, 1..50)
    ) {
        let mut estimator = ThroughputEstimator::new(Duration::from_secs(1), 0.4);
        for count in &counts {
            let sample = estimator.observe(*count);
            prop_assert!(sample.instant >= 0.0);
            prop_assert!(sample.weighted_avg >= 0.0);
            prop_assert_eq!(estimator.previous_committed(), *count);
        }
    }
}
