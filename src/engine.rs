use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::calendar::{offset_from_minutes, BusinessCalendar};
use crate::collector::MessageCollector;
use crate::config::{MetricsConfig, ResponseConfig};
use crate::error::StoreError;
use crate::identity::{IdentityResolver, ProfessionalIds};
use crate::response::{ResponsePairBuilder, ResponseTimeEstimator};
use crate::store::{
    DocumentStore, FirestoreClient, MySqlStore, RelationalStore, StoreHandle,
};
use crate::success::{CategoryAggregator, SuccessBreakdown, SuccessRateScorer};
use crate::trace::DebugTrace;

#[derive(Debug, Clone, Serialize)]
pub struct ResponseTimeResult {
    /// Business minutes, `None` when there is nothing to measure.
    pub value: Option<f64>,
    pub debug: DebugTrace,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessRateResult {
    /// 0..100, `None` when the category gives nothing to score against.
    pub value: Option<f64>,
    pub components: Option<SuccessBreakdown>,
    pub debug: DebugTrace,
}

/// Entry point for both service metrics.
///
/// Holds the two store handles for the life of the process. Neither
/// operation returns an error: failures become a `None` value with the
/// reason recorded in the trace.
pub struct MetricsEngine {
    config: MetricsConfig,
    documents: StoreHandle<dyn DocumentStore>,
    relational: StoreHandle<dyn RelationalStore>,
}

impl MetricsEngine {
    /// Stores are connected from `config` on first use.
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            documents: StoreHandle::new("firestore"),
            relational: StoreHandle::new("mysql"),
        }
    }

    pub fn with_stores(
        config: MetricsConfig,
        documents: Option<Arc<dyn DocumentStore>>,
        relational: Option<Arc<dyn RelationalStore>>,
    ) -> Self {
        Self {
            config,
            documents: match documents {
                Some(store) => StoreHandle::ready("firestore", store),
                None => StoreHandle::unavailable("firestore"),
            },
            relational: match relational {
                Some(store) => StoreHandle::ready("mysql", store),
                None => StoreHandle::unavailable("mysql"),
            },
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    fn document_store(&self) -> Option<Arc<dyn DocumentStore>> {
        let config = &self.config.firestore;
        self.documents.get_or_connect(|| {
            let client = FirestoreClient::connect(config)?;
            Ok(Arc::new(client) as Arc<dyn DocumentStore>)
        })
    }

    fn relational_store(&self) -> Option<Arc<dyn RelationalStore>> {
        let config = &self.config.database;
        self.relational.get_or_connect(|| {
            let store = MySqlStore::connect(config)?;
            Ok(Arc::new(store) as Arc<dyn RelationalStore>)
        })
    }

    pub async fn compute_service_response_time(
        &self,
        service_id: &str,
        professional_id: &str,
    ) -> ResponseTimeResult {
        self.compute_service_response_time_at(service_id, professional_id, Utc::now())
            .await
    }

    pub async fn compute_service_response_time_at(
        &self,
        service_id: &str,
        professional_id: &str,
        now: DateTime<Utc>,
    ) -> ResponseTimeResult {
        let mut trace = DebugTrace::new();
        trace.record(
            "request",
            json!({ "serviceId": service_id, "professionalId": professional_id }),
        );
        let value = self
            .response_time(service_id, professional_id, now, &mut trace)
            .await;
        info!(service_id, professional_id, value = ?value, "service response time computed");
        ResponseTimeResult {
            value,
            debug: trace,
        }
    }

    async fn response_time(
        &self,
        service_id: &str,
        professional_id: &str,
        now: DateTime<Utc>,
        trace: &mut DebugTrace,
    ) -> Option<f64> {
        if service_id.trim().is_empty() {
            trace.record("invalid_service_id", json!({}));
            return None;
        }
        let Some(documents) = self.document_store() else {
            trace.record("firestore_unavailable", json!({ "store": self.documents.label() }));
            return None;
        };

        let mut resolver = IdentityResolver::new(ProfessionalIds::seeded(professional_id));
        let collected = MessageCollector::new(documents.as_ref(), &self.config.documents)
            .collect(service_id, &mut resolver, trace)
            .await;
        trace.record(
            "messages_collected",
            json!({
                "count": collected.messages.len(),
                "stage": collected.stage.label(),
                "knownProfessionals": resolver.known().len(),
            }),
        );
        if collected.messages.is_empty() {
            trace.record("no_messages_found", json!({ "serviceId": service_id }));
            return None;
        }

        let relational = self.relational_store();
        let offset = offset_from_minutes(self.config.calendar.utc_offset_minutes);
        let calendar = BusinessCalendar::load(relational.as_deref(), professional_id, offset).await;
        trace.record(
            "calendar_loaded",
            json!({
                "alwaysOpen": calendar.is_always_open(),
                "blackouts": calendar.blackout_count(),
                "relationalAvailable": relational.is_some(),
            }),
        );

        let response = &self.config.response;
        let window = Duration::try_days(response.window_days.max(0))
            .unwrap_or_else(|| Duration::days(ResponseConfig::default().window_days));
        let window_start = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let pairs = ResponsePairBuilder::new(&calendar, response.cap_minutes).build(
            &collected.messages,
            window_start,
            now,
        );
        trace.record(
            "response_pairs_built",
            json!({ "count": pairs.len(), "windowStart": window_start }),
        );

        let estimate = ResponseTimeEstimator::new(response).estimate(&pairs, trace);
        estimate
            .value
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, response.cap_minutes.max(0.0)))
    }

    pub async fn compute_service_success_rate(
        &self,
        service_id: i64,
        category_id: Option<i64>,
        response_minutes: Option<f64>,
    ) -> SuccessRateResult {
        self.compute_service_success_rate_at(service_id, category_id, response_minutes, Utc::now())
            .await
    }

    pub async fn compute_service_success_rate_at(
        &self,
        service_id: i64,
        category_id: Option<i64>,
        response_minutes: Option<f64>,
        now: DateTime<Utc>,
    ) -> SuccessRateResult {
        let mut trace = DebugTrace::new();
        trace.record(
            "request",
            json!({
                "serviceId": service_id,
                "categoryId": category_id,
                "responseTimeMinutes": response_minutes,
            }),
        );
        let (value, components) = match self
            .success_rate(service_id, category_id, response_minutes, now, &mut trace)
            .await
        {
            Some((value, breakdown)) => (value, Some(breakdown)),
            None => (None, None),
        };
        info!(service_id, value = ?value, "service success rate computed");
        SuccessRateResult {
            value,
            components,
            debug: trace,
        }
    }

    async fn success_rate(
        &self,
        service_id: i64,
        category_id: Option<i64>,
        response_minutes: Option<f64>,
        now: DateTime<Utc>,
        trace: &mut DebugTrace,
    ) -> Option<(Option<f64>, SuccessBreakdown)> {
        let Some(store) = self.relational_store() else {
            trace.record("mysql_unavailable", json!({ "store": self.relational.label() }));
            return None;
        };

        let category_id = match category_id.filter(|id| *id > 0) {
            Some(id) => id,
            None => match store.service_category(service_id).await {
                Ok(Some(id)) if id > 0 => {
                    trace.record("category_resolved", json!({ "categoryId": id }));
                    id
                }
                Ok(_) => {
                    trace.record("category_unresolved", json!({ "serviceId": service_id }));
                    return None;
                }
                Err(err) => {
                    warn!(service_id, error = %err, "service category lookup failed");
                    trace.record(
                        "category_unresolved",
                        json!({ "serviceId": service_id, "error": err.to_string() }),
                    );
                    return None;
                }
            },
        };

        let success = &self.config.success;
        let (bookings, reviews, responses) = tokio::join!(
            store.category_bookings(category_id, success.retention_window_days),
            store.category_reviews(category_id, success.success_window_days),
            store.category_response_minutes(category_id),
        );
        let bookings = rows_or_empty("bookings", category_id, bookings, trace);
        let reviews = rows_or_empty("reviews", category_id, reviews, trace);
        let responses = rows_or_empty("response_minutes", category_id, responses, trace);
        trace.record(
            "category_rows_loaded",
            json!({
                "categoryId": category_id,
                "bookings": bookings.len(),
                "reviews": reviews.len(),
                "responseRows": responses.len(),
            }),
        );

        let offset = offset_from_minutes(self.config.calendar.utc_offset_minutes);
        let category =
            CategoryAggregator::new(success, offset, now).aggregate(&bookings, &reviews, &responses);
        if category.is_empty() {
            trace.record("category_empty", json!({ "categoryId": category_id }));
            return None;
        }

        let outcome = SuccessRateScorer::new(success).score(
            category_id,
            service_id,
            &category,
            response_minutes,
            trace,
        );
        Some((outcome.value, outcome.breakdown))
    }
}

fn rows_or_empty<T>(
    query: &str,
    category_id: i64,
    result: Result<Vec<T>, StoreError>,
    trace: &mut DebugTrace,
) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(err) => {
            warn!(query, category_id, error = %err, "category query failed");
            trace.record(
                "category_query_failed",
                json!({ "query": query, "error": err.to_string() }),
            );
            Vec::new()
        }
    }
}
