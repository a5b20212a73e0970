use serde::Serialize;
use serde_json::json;

use crate::config::ResponseConfig;
use crate::response::ResponsePair;
use crate::stats::{cmp_f64, percentile, weighted_mean};
use crate::trace::DebugTrace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedPair {
    pub delta: f64,
    pub age_days: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Estimate {
    pub value: Option<f64>,
    pub robust: bool,
    pub winsor_bounds: Option<(f64, f64)>,
    pub winsorized: Vec<WeightedPair>,
    pub trimmed: Vec<WeightedPair>,
}

/// Reduces response pairs to one outlier-robust, recency-weighted figure.
#[derive(Debug, Clone)]
pub struct ResponseTimeEstimator {
    min_pairs: usize,
    half_life_days: f64,
    trim_fraction: f64,
    winsor_lower: f64,
    winsor_upper: f64,
}

impl ResponseTimeEstimator {
    pub fn new(config: &ResponseConfig) -> Self {
        Self {
            min_pairs: config.min_pairs.max(1),
            half_life_days: config.half_life_days,
            trim_fraction: config.trim_fraction.clamp(0.0, 0.5),
            winsor_lower: config.winsor_lower.clamp(0.0, 1.0),
            winsor_upper: config.winsor_upper.clamp(0.0, 1.0),
        }
    }

    pub fn weight(&self, age_days: f64) -> f64 {
        0.5_f64.powf(age_days / self.half_life_days)
    }

    pub fn estimate(&self, pairs: &[ResponsePair], trace: &mut DebugTrace) -> Estimate {
        let raw: Vec<WeightedPair> = pairs
            .iter()
            .filter(|pair| pair.delta_raw.is_finite() && pair.age_days.is_finite())
            .map(|pair| WeightedPair {
                delta: pair.delta_raw,
                age_days: pair.age_days,
            })
            .collect();

        if raw.len() < self.min_pairs {
            trace.record(
                "insufficient_pairs_for_trimmed_mean",
                json!({ "pairCount": raw.len(), "minimumRequired": self.min_pairs }),
            );
            let value = self.recency_mean(&raw, trace);
            trace.record("fallback_weighted_response_time", json!({ "value": value }));
            return Estimate {
                value,
                robust: false,
                ..Estimate::default()
            };
        }

        let mut sorted_deltas: Vec<f64> = raw.iter().map(|pair| pair.delta).collect();
        sorted_deltas.sort_by(cmp_f64);
        let lower = percentile(&sorted_deltas, self.winsor_lower).unwrap_or(0.0);
        let upper = percentile(&sorted_deltas, self.winsor_upper).unwrap_or(lower);
        trace.record("winsorization_bounds", json!({ "p5": lower, "p95": upper }));

        let mut winsorized: Vec<WeightedPair> = raw
            .iter()
            .map(|pair| WeightedPair {
                delta: pair.delta.clamp(lower, upper),
                age_days: pair.age_days,
            })
            .collect();
        winsorized.sort_by(|a, b| cmp_f64(&a.delta, &b.delta));

        let trim_count = (winsorized.len() as f64 * self.trim_fraction).floor() as usize;
        let mut trimmed: Vec<WeightedPair> = if winsorized.len() > 2 * trim_count {
            winsorized[trim_count..winsorized.len() - trim_count].to_vec()
        } else {
            Vec::new()
        };
        trace.record(
            "trimmed_pairs",
            json!({
                "originalCount": winsorized.len(),
                "trimCount": trim_count,
                "resultingCount": trimmed.len(),
            }),
        );
        if trimmed.is_empty() {
            trace.record("trimmed_pairs_empty", json!({}));
            trimmed = winsorized.clone();
        }

        let value = self.recency_mean(&trimmed, trace);
        trace.record("final_response_time", json!({ "value": value }));
        Estimate {
            value,
            robust: true,
            winsor_bounds: Some((lower, upper)),
            winsorized,
            trimmed,
        }
    }

    fn recency_mean(&self, pairs: &[WeightedPair], trace: &mut DebugTrace) -> Option<f64> {
        match weighted_mean(
            pairs.iter().map(|pair| (pair.delta, pair.age_days)),
            self.half_life_days,
        ) {
            Some(mean) => {
                trace.record(
                    "weighted_response_time_computed",
                    json!({
                        "numerator": mean.numerator,
                        "denominator": mean.denominator,
                        "responseTime": mean.value,
                    }),
                );
                Some(mean.value)
            }
            None => {
                trace.record("weighted_response_time_denominator_zero", json!({ "count": pairs.len() }));
                None
            }
        }
    }
}
