mod common;

use common::{at, completed_booking, naive_days_ago, review};
use service_metrics::calendar::offset_from_minutes;
use service_metrics::config::{CategoryFallbacks, SuccessConfig};
use service_metrics::store::{BookingRecord, ServiceResponseRecord};
use service_metrics::success::{
    CancellationPolicy, CategoryAggregate, CategoryAggregator, ServiceAggregate, SignalWeights,
    SuccessRateScorer,
};
use service_metrics::trace::DebugTrace;
use std::collections::BTreeMap;

fn ordinary_service() -> ServiceAggregate {
    ServiceAggregate {
        confirmed_weighted: 3.0,
        confirmed_raw: 3,
        completed_weighted: 3.0,
        completed_raw: 3,
        completed_clean_weighted: 3.0,
        completed_clean_raw: 3,
        revenue: 50.0,
        clients: BTreeMap::from([(1, 1), (2, 1), (3, 1)]),
        rating_weighted_sum: 20.0,
        rating_weight: 10.0,
        review_count: 10,
        stored_response_minutes: Some(120.0),
        ..ServiceAggregate::default()
    }
}

fn standout_service() -> ServiceAggregate {
    ServiceAggregate {
        confirmed_weighted: 1.0,
        confirmed_raw: 1,
        completed_weighted: 1.0,
        completed_raw: 1,
        completed_clean_weighted: 1.0,
        completed_clean_raw: 1,
        revenue: 5_000.0,
        clients: BTreeMap::from([(9, 2)]),
        rating_weighted_sum: 50.0,
        rating_weight: 10.0,
        review_count: 10,
        stored_response_minutes: Some(1.0),
        ..ServiceAggregate::default()
    }
}

fn category_of(services: Vec<(i64, ServiceAggregate)>) -> CategoryAggregate {
    let rating_weighted_sum: f64 = services.iter().map(|(_, s)| s.rating_weighted_sum).sum();
    let rating_weight: f64 = services.iter().map(|(_, s)| s.rating_weight).sum();
    CategoryAggregate {
        booking_rows: services.len(),
        services: services.into_iter().collect(),
        rating_weighted_sum,
        rating_weight,
        ..CategoryAggregate::default()
    }
}

fn twenty_services() -> CategoryAggregate {
    let mut services: Vec<(i64, ServiceAggregate)> =
        (1..=19).map(|id| (id, ordinary_service())).collect();
    services.push((20, standout_service()));
    category_of(services)
}

#[test]
fn default_weights_sum_to_one() {
    assert!((SignalWeights::default().total() - 1.0).abs() < 1e-12);
}

#[test]
fn thin_standout_is_pulled_to_the_prior() {
    let config = SuccessConfig::default();
    let scorer = SuccessRateScorer::new(&config);
    let category = twenty_services();
    let stats = category.stats(&config.fallbacks);

    let ordinary = scorer.base_score(&ordinary_service(), &stats, None).value;
    let standout = scorer.base_score(&standout_service(), &stats, None).value;
    assert!(standout > ordinary + 15.0);

    let mut trace = DebugTrace::new();
    let outcome = scorer.score(7, 20, &category, None, &mut trace);
    let value = outcome.value.expect("value");
    let prior = outcome.breakdown.prior;

    let expected_prior = (19.0 * ordinary + standout) / 20.0;
    assert!((prior - expected_prior).abs() < 1e-9);
    assert!((value - prior).abs() < 0.06 * (standout - prior));
    assert!(standout - value > 0.9 * (standout - prior));
    assert_eq!(outcome.breakdown.category.services, 20);
    assert!(trace.has_stage("final_success_rate"));
}

#[test]
fn no_completed_bookings_means_the_prior_exactly() {
    let config = SuccessConfig::default();
    let scorer = SuccessRateScorer::new(&config);
    let category = twenty_services();

    let outcome = scorer.score(7, 999, &category, None, &mut DebugTrace::new());
    assert_eq!(outcome.breakdown.reliability, Some(0.0));
    let value = outcome.value.expect("value");
    assert!((value - outcome.breakdown.prior).abs() < 1e-9);
    assert_eq!(outcome.breakdown.category.services, 21);
}

#[test]
fn reliability_approaches_one() {
    let config = SuccessConfig::default();
    let scorer = SuccessRateScorer::new(&config);
    assert_eq!(scorer.reliability(0), 0.0);
    assert!((scorer.reliability(20) - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
    let reliability = scorer.reliability(100_000);
    assert!(reliability > 0.999_999);
    let blended = SuccessRateScorer::blend(reliability, 80.0, 30.0);
    assert!((blended - 80.0).abs() < 1e-3);
}

#[test]
fn sub_scores_stay_in_range() {
    let config = SuccessConfig::default();
    let scorer = SuccessRateScorer::new(&config);
    let category = twenty_services();
    let stats = category.stats(&config.fallbacks);
    let noisy = ServiceAggregate {
        confirmed_weighted: 1.0,
        confirmed_raw: 1,
        cancelled_weighted: 9.0,
        cancelled_raw: 9,
        completed_weighted: 1.0,
        completed_raw: 1,
        disputed_weighted: 1.0,
        disputed_raw: 4,
        revenue: 1.0e9,
        stored_response_minutes: Some(-30.0),
        ..ServiceAggregate::default()
    };

    for service in [noisy, ordinary_service(), standout_service(), ServiceAggregate::default()] {
        let base = scorer.base_score(&service, &stats, Some(1.0e6));
        let scores = base.scores;
        for value in [
            scores.rating,
            scores.repeat_clients,
            scores.cancellation,
            scores.completion,
            scores.responsiveness,
            scores.revenue,
            scores.disputes,
        ] {
            assert!((0.0..=100.0).contains(&value), "{:?}", scores);
        }
        assert!((0.0..=100.0).contains(&base.value));
    }
}

#[test]
fn caller_response_time_overrides_stored_minutes() {
    let config = SuccessConfig::default();
    let scorer = SuccessRateScorer::new(&config);
    let category = twenty_services();
    let stats = category.stats(&config.fallbacks);
    assert!((stats.p75_response_minutes - 120.0).abs() < 1e-9);

    let stored = scorer.base_score(&ordinary_service(), &stats, None);
    let fast = scorer.base_score(&ordinary_service(), &stats, Some(30.0));
    assert_eq!(stored.scores.responsiveness, 0.0);
    assert!((fast.scores.responsiveness - 75.0).abs() < 1e-9);
}

#[test]
fn empty_category_falls_back_to_defaults() {
    let fallbacks = CategoryFallbacks::default();
    let stats = CategoryAggregate::default().stats(&fallbacks);
    assert_eq!(stats.mean_rating, 3.5);
    assert_eq!(stats.p90_cancel_ratio, 0.1);
    assert_eq!(stats.p90_revenue, 100.0);
    assert_eq!(stats.p90_dispute_ratio, 0.05);
    assert_eq!(stats.p75_response_minutes, 60.0);
}

#[test]
fn bookings_are_aggregated_by_status_and_window() {
    let config = SuccessConfig::default();
    let now = at(2024, 6, 1, 12, 0);
    let aggregator = CategoryAggregator::new(&config, offset_from_minutes(0), now);

    let mut disputed = completed_booking(1, 11, naive_days_ago(now, 5), 120.0);
    disputed.commission = Some(20.0);
    disputed.final_payment_status = Some("Refunded".to_string());

    let bookings = vec![
        completed_booking(1, 10, naive_days_ago(now, 10), 80.0),
        completed_booking(1, 10, naive_days_ago(now, 300), 80.0),
        disputed,
        BookingRecord {
            service_id: 1,
            status: Some("accepted".to_string()),
            starts_at: Some(naive_days_ago(now, 2)),
            ..BookingRecord::default()
        },
        BookingRecord {
            service_id: 1,
            status: Some("Cancelled".to_string()),
            ordered_at: Some(naive_days_ago(now, 3)),
            ..BookingRecord::default()
        },
        BookingRecord {
            service_id: 1,
            status: Some("completed".to_string()),
            ..BookingRecord::default()
        },
    ];
    let reviews = vec![
        review(1, 7.0, naive_days_ago(now, 1)),
        review(1, 4.0, naive_days_ago(now, 400)),
        review(2, 3.0, naive_days_ago(now, 0)),
    ];
    let responses = vec![ServiceResponseRecord {
        service_id: 3,
        response_minutes: Some(45.0),
    }];

    let category = aggregator.aggregate(&bookings, &reviews, &responses);
    let service = category.service(1).expect("service 1");

    assert_eq!(service.confirmed_raw, 3);
    assert_eq!(service.completed_raw, 2);
    assert_eq!(service.disputed_raw, 1);
    assert_eq!(service.completed_clean_raw, 1);
    assert_eq!(service.cancelled_raw, 1);
    assert!((service.revenue - 180.0).abs() < 1e-9);
    assert_eq!(service.repeat_clients(), (1, 2));
    assert_eq!(service.review_count, 1);
    assert!((service.rating_weighted_sum / service.rating_weight - 5.0).abs() < 1e-9);

    assert!(category.service(2).is_some());
    assert_eq!(category.service(3).and_then(|s| s.stored_response_minutes), Some(45.0));
    assert!(!category.is_empty());
}

#[test]
fn professional_policy_ignores_client_cancellations() {
    let now = at(2024, 6, 1, 12, 0);
    let cancelled = |actor: Option<&str>| BookingRecord {
        service_id: 1,
        status: Some("canceled".to_string()),
        ends_at: Some(naive_days_ago(now, 1)),
        cancelled_by: actor.map(str::to_string),
        ..BookingRecord::default()
    };
    let bookings = vec![
        cancelled(Some("client")),
        cancelled(Some("professional")),
        cancelled(None),
    ];

    let all = SuccessConfig::default();
    let category = CategoryAggregator::new(&all, offset_from_minutes(0), now).aggregate(&bookings, &[], &[]);
    assert_eq!(category.service(1).map(|s| s.cancelled_raw), Some(3));

    let professional = SuccessConfig {
        cancellation_policy: CancellationPolicy::Professional,
        ..SuccessConfig::default()
    };
    let category =
        CategoryAggregator::new(&professional, offset_from_minutes(0), now).aggregate(&bookings, &[], &[]);
    assert_eq!(category.service(1).map(|s| s.cancelled_raw), Some(2));

    assert_eq!(CancellationPolicy::parse(" Professional "), Some(CancellationPolicy::Professional));
    assert_eq!(CancellationPolicy::parse("all"), Some(CancellationPolicy::All));
    assert_eq!(CancellationPolicy::parse("sometimes"), None);
}
