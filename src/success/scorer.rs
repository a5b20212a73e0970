use serde::Serialize;
use serde_json::json;

use crate::config::SuccessConfig;
use crate::stats::{clamp01, mean, wilson_lower_bound};
use crate::success::aggregate::{CategoryAggregate, CategoryStats, ServiceAggregate};
use crate::success::SignalWeights;
use crate::trace::DebugTrace;

/// The seven signals of a service, each on a 0..100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub rating: f64,
    pub repeat_clients: f64,
    pub cancellation: f64,
    pub completion: f64,
    pub responsiveness: f64,
    pub revenue: f64,
    pub disputes: f64,
}

impl SubScores {
    pub fn weighted(&self, weights: &SignalWeights) -> f64 {
        weights.rating * self.rating
            + weights.repeat_clients * self.repeat_clients
            + weights.cancellation * self.cancellation
            + weights.completion * self.completion
            + weights.responsiveness * self.responsiveness
            + weights.revenue * self.revenue
            + weights.disputes * self.disputes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCounts {
    pub completed: u32,
    pub reviews: u32,
    pub confirmed: u32,
    pub cancelled: u32,
    pub disputed: u32,
    pub distinct_clients: u32,
    pub repeat_clients: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseScore {
    pub value: f64,
    pub scores: SubScores,
    pub counts: ServiceCounts,
    pub meets_threshold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    #[serde(flatten)]
    pub stats: CategoryStats,
    pub prior: f64,
    pub services: usize,
}

/// Everything that went into a success rate, returned next to the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBreakdown {
    pub category_id: i64,
    pub base: Option<f64>,
    pub reliability: Option<f64>,
    pub prior: f64,
    pub meets_publication_threshold: bool,
    pub response_minutes: Option<f64>,
    pub counts: ServiceCounts,
    pub scores: Option<SubScores>,
    pub category: CategoryBreakdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuccessOutcome {
    pub value: Option<f64>,
    pub breakdown: SuccessBreakdown,
}

/// Scores a service against its category: a weighted base score per service,
/// the category mean of those as prior, and a blend of the two driven by how
/// many completed bookings back the target's own numbers.
#[derive(Debug, Clone)]
pub struct SuccessRateScorer<'a> {
    config: &'a SuccessConfig,
}

impl<'a> SuccessRateScorer<'a> {
    pub fn new(config: &'a SuccessConfig) -> Self {
        Self { config }
    }

    pub fn reliability(&self, completed: u32) -> f64 {
        let scale = self.config.reliability_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return 1.0;
        }
        clamp01(1.0 - (-(completed as f64) / scale).exp())
    }

    pub fn blend(reliability: f64, base: f64, prior: f64) -> f64 {
        reliability * base + (1.0 - reliability) * prior
    }

    /// Base score of one service. `response_minutes` replaces the stored
    /// response figure when given.
    pub fn base_score(
        &self,
        service: &ServiceAggregate,
        stats: &CategoryStats,
        response_minutes: Option<f64>,
    ) -> BaseScore {
        let z = self.config.wilson_z;
        let prior_count = self.config.rating_prior_count.max(0.0);

        let denominator = prior_count + service.rating_weight;
        let bayes_rating = if denominator > 0.0 {
            (stats.mean_rating * prior_count + service.rating_weighted_sum) / denominator
        } else {
            stats.mean_rating
        };
        let rating = 25.0 * (bayes_rating.clamp(1.0, 5.0) - 1.0);

        let (repeat, distinct) = service.repeat_clients();
        let repeat_ratio = if distinct > 0 {
            repeat as f64 / distinct as f64
        } else {
            0.0
        };
        let repeat_clients = 100.0 * wilson_lower_bound(repeat_ratio, distinct as f64, z);

        let cancel_ratio = service.cancel_ratio().unwrap_or(0.0);
        let cancellation = 100.0 * (1.0 - (cancel_ratio / stats.p90_cancel_ratio.max(0.01)).min(1.0));

        let confirmed = service.confirmed_raw as f64;
        let completion_ratio = if confirmed > 0.0 {
            (service.completed_clean_raw as f64).min(confirmed) / confirmed
        } else {
            0.0
        };
        let completion = 100.0 * wilson_lower_bound(completion_ratio, confirmed, z);

        let minutes = response_minutes
            .filter(|minutes| minutes.is_finite())
            .or(service.stored_response_minutes);
        let responsiveness = match minutes {
            Some(minutes) if stats.p75_response_minutes > 0.0 => {
                100.0 * (1.0 - (minutes.max(0.0) / stats.p75_response_minutes).min(1.0))
            }
            _ => 0.0,
        };

        let log_ceiling = stats.p90_revenue.max(1.0).ln_1p();
        let revenue = if log_ceiling > 0.0 {
            100.0 * (service.revenue.max(0.0).ln_1p() / log_ceiling).min(1.0)
        } else {
            0.0
        };

        let completed = service.completed_raw as f64;
        let dispute_ratio = if completed > 0.0 {
            (service.disputed_raw as f64).min(completed) / completed
        } else {
            0.0
        };
        let disputes = 100.0 * (1.0 - (dispute_ratio / stats.p90_dispute_ratio.max(0.01)).min(1.0));

        let scores = SubScores {
            rating,
            repeat_clients,
            cancellation,
            completion,
            responsiveness,
            revenue,
            disputes,
        };
        let counts = ServiceCounts {
            completed: service.completed_raw,
            reviews: service.review_count,
            confirmed: service.confirmed_raw,
            cancelled: service.cancelled_raw,
            disputed: service.disputed_raw,
            distinct_clients: distinct,
            repeat_clients: repeat,
        };

        BaseScore {
            value: scores.weighted(&self.config.weights),
            scores,
            counts,
            meets_threshold: service.completed_raw >= self.config.min_completed
                && service.review_count >= self.config.min_reviews,
        }
    }

    /// Mean base score over every service in the category, `service_id`
    /// included even when the category has no rows for it.
    pub fn prior(&self, category: &CategoryAggregate, stats: &CategoryStats, service_id: i64) -> (f64, usize) {
        let empty = ServiceAggregate::default();
        let mut bases: Vec<f64> = category
            .services
            .values()
            .map(|service| self.base_score(service, stats, None).value)
            .filter(|value| value.is_finite())
            .collect();
        if !category.services.contains_key(&service_id) {
            let value = self.base_score(&empty, stats, None).value;
            if value.is_finite() {
                bases.push(value);
            }
        }
        let count = bases.len();
        (mean(&bases).unwrap_or(self.config.fallbacks.prior), count)
    }

    pub fn score(
        &self,
        category_id: i64,
        service_id: i64,
        category: &CategoryAggregate,
        response_minutes: Option<f64>,
        trace: &mut DebugTrace,
    ) -> SuccessOutcome {
        let stats = category.stats(&self.config.fallbacks);
        trace.record("category_stats", json!(stats));

        let (prior, services) = self.prior(category, &stats, service_id);
        trace.record(
            "category_prior",
            json!({ "prior": prior, "services": services }),
        );

        let empty = ServiceAggregate::default();
        let service = category.service(service_id).unwrap_or(&empty);
        let response_minutes = response_minutes.filter(|minutes| minutes.is_finite());
        let base = self.base_score(service, &stats, response_minutes);
        let reliability = self.reliability(base.counts.completed);

        let mut breakdown = SuccessBreakdown {
            category_id,
            base: None,
            reliability: None,
            prior,
            meets_publication_threshold: base.meets_threshold,
            response_minutes: response_minutes.or(service.stored_response_minutes),
            counts: base.counts,
            scores: None,
            category: CategoryBreakdown {
                stats,
                prior,
                services,
            },
        };

        if !base.value.is_finite() {
            trace.record("base_score_not_finite", json!({ "serviceId": service_id }));
            return SuccessOutcome {
                value: None,
                breakdown,
            };
        }

        breakdown.base = Some(base.value);
        breakdown.reliability = Some(reliability);
        breakdown.scores = Some(base.scores);
        trace.record(
            "base_score",
            json!({ "base": base.value, "scores": base.scores, "counts": base.counts }),
        );

        let blended = Self::blend(reliability, base.value, prior);
        let value = blended.is_finite().then(|| blended.clamp(0.0, 100.0));
        trace.record(
            "final_success_rate",
            json!({ "value": value, "reliability": reliability, "prior": prior }),
        );
        SuccessOutcome { value, breakdown }
    }
}
