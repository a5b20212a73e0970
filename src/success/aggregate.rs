use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::calendar::local_to_utc;
use crate::config::{CategoryFallbacks, SuccessConfig};
use crate::stats::{exponential_weight, percentile, sorted_non_negative, MINUTES_PER_DAY};
use crate::store::{BookingRecord, ReviewRecord, ServiceResponseRecord};
use crate::success::CancellationPolicy;

const CONFIRMED_STATUSES: &[&str] = &["accepted", "confirmed", "completed"];
const CANCELLED_STATUSES: &[&str] = &["cancelled", "canceled"];

/// Booking and review signals of one service. `*_weighted` fields carry
/// recency weights, `*_raw` fields plain counts; both cover the success
/// window only, except `clients`, which spans the retention window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceAggregate {
    pub confirmed_weighted: f64,
    pub confirmed_raw: u32,
    pub cancelled_weighted: f64,
    pub cancelled_raw: u32,
    pub completed_weighted: f64,
    pub completed_raw: u32,
    pub completed_clean_weighted: f64,
    pub completed_clean_raw: u32,
    pub disputed_weighted: f64,
    pub disputed_raw: u32,
    pub revenue: f64,
    pub revenue_weighted: f64,
    /// Completed bookings per client id.
    pub clients: BTreeMap<i64, u32>,
    pub rating_weighted_sum: f64,
    pub rating_weight: f64,
    pub review_count: u32,
    pub stored_response_minutes: Option<f64>,
}

impl ServiceAggregate {
    pub fn cancel_ratio(&self) -> Option<f64> {
        (self.confirmed_weighted > 0.0).then(|| self.cancelled_weighted / self.confirmed_weighted)
    }

    pub fn dispute_ratio(&self) -> Option<f64> {
        (self.completed_weighted > 0.0).then(|| self.disputed_weighted / self.completed_weighted)
    }

    /// `(clients with two or more completed bookings, distinct clients)`.
    pub fn repeat_clients(&self) -> (u32, u32) {
        let repeat = self.clients.values().filter(|count| **count >= 2).count();
        (repeat as u32, self.clients.len() as u32)
    }
}

/// Category-level calibration points every service is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub mean_rating: f64,
    pub p90_cancel_ratio: f64,
    pub p75_response_minutes: f64,
    pub p90_revenue: f64,
    pub p90_dispute_ratio: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryAggregate {
    pub services: BTreeMap<i64, ServiceAggregate>,
    pub rating_weighted_sum: f64,
    pub rating_weight: f64,
    pub booking_rows: usize,
    pub review_rows: usize,
    pub response_rows: usize,
}

impl CategoryAggregate {
    pub fn is_empty(&self) -> bool {
        self.booking_rows == 0 && self.review_rows == 0 && self.response_rows == 0
    }

    pub fn service(&self, service_id: i64) -> Option<&ServiceAggregate> {
        self.services.get(&service_id)
    }

    pub fn stats(&self, fallbacks: &CategoryFallbacks) -> CategoryStats {
        let mut cancel_ratios = Vec::new();
        let mut revenues = Vec::new();
        let mut dispute_ratios = Vec::new();
        let mut response_minutes = Vec::new();
        for service in self.services.values() {
            if let Some(ratio) = service.cancel_ratio() {
                cancel_ratios.push(ratio);
            }
            if service.revenue > 0.0 {
                revenues.push(service.revenue);
            }
            if let Some(ratio) = service.dispute_ratio() {
                dispute_ratios.push(ratio);
            }
            if let Some(minutes) = service.stored_response_minutes {
                response_minutes.push(minutes);
            }
        }

        let mean_rating = if self.rating_weight > 0.0 && self.rating_weighted_sum.is_finite() {
            (self.rating_weighted_sum / self.rating_weight).clamp(1.0, 5.0)
        } else {
            fallbacks.mean_rating
        };

        CategoryStats {
            mean_rating,
            p90_cancel_ratio: positive_percentile(&cancel_ratios, 0.9, fallbacks.p90_cancel_ratio),
            p75_response_minutes: positive_percentile(
                &response_minutes,
                0.75,
                fallbacks.p75_response_minutes,
            ),
            p90_revenue: positive_percentile(&revenues, 0.9, fallbacks.p90_revenue),
            p90_dispute_ratio: positive_percentile(&dispute_ratios, 0.9, fallbacks.p90_dispute_ratio),
        }
    }
}

fn positive_percentile(values: &[f64], fraction: f64, fallback: f64) -> f64 {
    match percentile(&sorted_non_negative(values), fraction) {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => fallback,
    }
}

/// Folds a category's raw booking, review and stored response rows into
/// per-service aggregates as of `now`.
#[derive(Debug, Clone)]
pub struct CategoryAggregator {
    retention_days: f64,
    success_days: f64,
    half_life_days: f64,
    policy: CancellationPolicy,
    offset: FixedOffset,
    now: DateTime<Utc>,
}

impl CategoryAggregator {
    pub fn new(config: &SuccessConfig, offset: FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            retention_days: config.retention_window_days as f64,
            success_days: config.success_window_days as f64,
            half_life_days: config.half_life_days,
            policy: config.cancellation_policy,
            offset,
            now,
        }
    }

    pub fn aggregate(
        &self,
        bookings: &[BookingRecord],
        reviews: &[ReviewRecord],
        responses: &[ServiceResponseRecord],
    ) -> CategoryAggregate {
        let mut category = CategoryAggregate {
            booking_rows: bookings.len(),
            review_rows: reviews.len(),
            response_rows: responses.len(),
            ..CategoryAggregate::default()
        };
        for booking in bookings {
            self.add_booking(&mut category, booking);
        }
        for review in reviews {
            self.add_review(&mut category, review);
        }
        for row in responses {
            let service = category.services.entry(row.service_id).or_default();
            if let Some(minutes) = row.response_minutes.filter(|minutes| minutes.is_finite()) {
                service.stored_response_minutes = Some(minutes);
            }
        }
        category
    }

    fn add_booking(&self, category: &mut CategoryAggregate, booking: &BookingRecord) {
        let service = category.services.entry(booking.service_id).or_default();
        let Some(event) = booking.ends_at.or(booking.starts_at).or(booking.ordered_at) else {
            return;
        };
        let age = self.age_days(event);
        if !age.is_finite() || age > self.retention_days.max(self.success_days) {
            return;
        }

        let in_window = age <= self.success_days;
        let weight = if in_window {
            exponential_weight(age, self.half_life_days)
        } else {
            0.0
        };
        let status = booking.status.as_deref().unwrap_or_default().trim().to_ascii_lowercase();

        if in_window && CONFIRMED_STATUSES.contains(&status.as_str()) {
            service.confirmed_weighted += weight;
            service.confirmed_raw += 1;
        }

        if in_window
            && CANCELLED_STATUSES.contains(&status.as_str())
            && self.policy.counts(booking.cancelled_by.as_deref())
        {
            service.cancelled_weighted += weight;
            service.cancelled_raw += 1;
        }

        if status != "completed" {
            return;
        }
        if age <= self.retention_days {
            if let Some(client) = booking.client_id {
                *service.clients.entry(client).or_insert(0) += 1;
            }
        }
        if !in_window {
            return;
        }

        let net = (finite_or_zero(booking.final_price) - finite_or_zero(booking.commission)).max(0.0);
        service.completed_weighted += weight;
        service.completed_raw += 1;
        service.revenue += net;
        service.revenue_weighted += weight * net;

        let payment = booking
            .final_payment_status
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if payment.contains("dispute") || payment.contains("refund") {
            service.disputed_weighted += weight;
            service.disputed_raw += 1;
        } else {
            service.completed_clean_weighted += weight;
            service.completed_clean_raw += 1;
        }
    }

    fn add_review(&self, category: &mut CategoryAggregate, review: &ReviewRecord) {
        let Some(rating) = review.rating.filter(|rating| rating.is_finite()) else {
            return;
        };
        let Some(reviewed_at) = review.reviewed_at else {
            return;
        };
        let age = self.age_days(reviewed_at);
        if !age.is_finite() || age > self.success_days {
            return;
        }

        let weight = exponential_weight(age, self.half_life_days);
        let rating = rating.clamp(1.0, 5.0);
        let service = category.services.entry(review.service_id).or_default();
        service.rating_weighted_sum += rating * weight;
        service.rating_weight += weight;
        service.review_count += 1;
        category.rating_weighted_sum += rating * weight;
        category.rating_weight += weight;
    }

    fn age_days(&self, at: NaiveDateTime) -> f64 {
        let at = local_to_utc(at, self.offset);
        let minutes = (self.now - at).num_milliseconds() as f64 / 60_000.0;
        (minutes / MINUTES_PER_DAY).max(0.0)
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|value| value.is_finite()).unwrap_or(0.0)
}
