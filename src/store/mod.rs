pub mod firestore;
pub mod handle;
pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub use firestore::{FirestoreClient, FirestoreConfig};
pub use handle::StoreHandle;
pub use mysql::{DatabaseConfig, MySqlStore};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
}

impl FieldValue {
    /// The raw id plus its numeric form when it parses as one, because
    /// documents store service references either way.
    pub fn candidates(raw: &str) -> Vec<FieldValue> {
        let mut values = Vec::new();
        let trimmed = raw.trim();
        if !raw.is_empty() {
            values.push(FieldValue::Text(raw.to_string()));
        }
        if !trimmed.is_empty() && trimmed != raw {
            values.push(FieldValue::Text(trimmed.to_string()));
        }
        if let Ok(number) = trimmed.parse::<i64>() {
            values.push(FieldValue::Integer(number));
        }
        values
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(text) => write!(f, "{:?}", text),
            FieldValue::Integer(number) => write!(f, "{}", number),
        }
    }
}

/// A document returned by the document store, with its data decoded into
/// plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Slash-separated path relative to the database root, unique per document.
    pub path: String,
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(path: impl Into<String>, data: Value) -> Self {
        let path = path.into();
        let id = path.rsplit('/').next().unwrap_or_default().to_string();
        Self { path, id, data }
    }

    /// Id of the document owning this one's collection, if nested.
    pub fn parent_document_id(&self) -> Option<&str> {
        let segments: Vec<&str> = self.path.split('/').collect();
        (segments.len() >= 4).then(|| segments[segments.len() - 3])
    }
}

/// Read-only access to a schema-flexible document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError>;

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError>;

    async fn subcollection(
        &self,
        parent_path: &str,
        collection: &str,
    ) -> Result<Vec<Document>, StoreError>;

    /// Equality query across every collection named `group`, wherever nested.
    async fn query_group_equal(
        &self,
        group: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailabilityRow {
    pub day_of_week: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnavailabilityRow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingRecord {
    pub service_id: i64,
    pub client_id: Option<i64>,
    pub status: Option<String>,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
    pub ordered_at: Option<NaiveDateTime>,
    pub final_price: Option<f64>,
    pub commission: Option<f64>,
    pub final_payment_status: Option<String>,
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewRecord {
    pub service_id: i64,
    pub rating: Option<f64>,
    pub reviewed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceResponseRecord {
    pub service_id: i64,
    pub response_minutes: Option<f64>,
}

/// Read-only queries over bookings, reviews, services and availability.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn availability(&self, professional_id: &str) -> Result<Vec<AvailabilityRow>, StoreError>;

    async fn unavailability(
        &self,
        professional_id: &str,
    ) -> Result<Vec<UnavailabilityRow>, StoreError>;

    async fn service_category(&self, service_id: i64) -> Result<Option<i64>, StoreError>;

    async fn category_bookings(
        &self,
        category_id: i64,
        window_days: i64,
    ) -> Result<Vec<BookingRecord>, StoreError>;

    async fn category_reviews(
        &self,
        category_id: i64,
        window_days: i64,
    ) -> Result<Vec<ReviewRecord>, StoreError>;

    async fn category_response_minutes(
        &self,
        category_id: i64,
    ) -> Result<Vec<ServiceResponseRecord>, StoreError>;
}
