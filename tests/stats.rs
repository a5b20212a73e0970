use service_metrics::stats::{exponential_weight, mean, percentile, weighted_mean, wilson_lower_bound};

#[test]
fn wilson_bound_is_zero_without_trials() {
    assert_eq!(wilson_lower_bound(0.8, 0.0, 1.64), 0.0);
    assert_eq!(wilson_lower_bound(0.0, 50.0, 1.64), 0.0);
}

#[test]
fn wilson_bound_grows_with_sample_size() {
    for p in [0.1, 0.5, 0.9, 1.0] {
        let mut previous = 0.0;
        for n in 1..=200 {
            let bound = wilson_lower_bound(p, n as f64, 1.64);
            assert!(bound + 1e-12 >= previous, "p={} n={}", p, n);
            assert!(bound <= p + 1e-12);
            previous = bound;
        }
    }
}

#[test]
fn small_perfect_records_are_not_trusted_fully() {
    let two_of_two = wilson_lower_bound(1.0, 2.0, 1.64);
    let twenty_of_twenty = wilson_lower_bound(1.0, 20.0, 1.64);
    assert!(two_of_two < twenty_of_twenty);
    assert!(two_of_two < 0.7);
}

#[test]
fn exponential_weight_half_life() {
    assert!((exponential_weight(0.0, 90.0) - 1.0).abs() < 1e-12);
    assert!((exponential_weight(90.0, 90.0) - 0.5).abs() < 1e-12);
    assert_eq!(exponential_weight(-3.0, 90.0), 1.0);
}

#[test]
fn percentile_interpolates() {
    let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
    assert_eq!(percentile(&sorted, 0.0), Some(1.0));
    assert_eq!(percentile(&sorted, 1.0), Some(5.0));
    assert!((percentile(&sorted, 0.9).expect("p90") - 4.6).abs() < 1e-9);
    assert_eq!(percentile(&[7.0], 0.75), Some(7.0));
    assert_eq!(percentile(&[], 0.5), None);
}

#[test]
fn weighted_mean_ignores_nothing_but_non_finite_values() {
    let result = weighted_mean([(10.0, 0.0), (f64::NAN, 0.0), (20.0, 0.0)], 90.0).expect("mean");
    assert!((result.value - 15.0).abs() < 1e-12);
    assert!((result.denominator - 2.0).abs() < 1e-12);
    assert!(weighted_mean(Vec::<(f64, f64)>::new(), 90.0).is_none());
    assert_eq!(mean(&[]), None);
    assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
}
