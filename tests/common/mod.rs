#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use service_metrics::error::StoreError;
use service_metrics::store::{
    AvailabilityRow, BookingRecord, Document, DocumentStore, FieldValue, RelationalStore,
    ReviewRecord, ServiceResponseRecord, UnavailabilityRow,
};

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn naive_days_ago(now: DateTime<Utc>, days: i64) -> NaiveDateTime {
    (now - Duration::days(days)).naive_utc()
}

/// Document store over an in-memory list of documents keyed by path.
#[derive(Default)]
pub struct FakeDocumentStore {
    documents: Vec<Document>,
    failing: HashSet<String>,
    queries: AtomicUsize,
}

impl FakeDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, data: Value) -> Self {
        self.documents.push(Document::new(path, data));
        self
    }

    /// Every query touching `collection` fails.
    pub fn failing(mut self, collection: &str) -> Self {
        self.failing.insert(collection.to_string());
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check(&self, collection: &str) -> Result<(), StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(collection) {
            return Err(StoreError::Query(format!("{} is offline", collection)));
        }
        Ok(())
    }

    fn top_level<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'a Document> + 'a {
        self.documents.iter().filter(move |document| {
            let segments: Vec<&str> = document.path.split('/').collect();
            segments.len() == 2 && segments[0] == collection
        })
    }
}

pub fn matches(value: &Value, needle: &FieldValue) -> bool {
    match needle {
        FieldValue::Text(text) => value.as_str() == Some(text.as_str()),
        FieldValue::Integer(number) => value.as_i64() == Some(*number),
    }
}

#[async_trait]
impl DocumentStore for FakeDocumentStore {
    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        self.check(collection)?;
        Ok(self
            .top_level(collection)
            .filter(|document| {
                document
                    .data
                    .get(field)
                    .map(|found| matches(found, value))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        self.check(collection)?;
        Ok(self
            .top_level(collection)
            .filter(|document| {
                document
                    .data
                    .get(field)
                    .and_then(Value::as_array)
                    .map(|items| items.iter().any(|item| matches(item, value)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn subcollection(
        &self,
        parent_path: &str,
        collection: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.check(collection)?;
        let prefix = format!("{}/{}/", parent_path, collection);
        Ok(self
            .documents
            .iter()
            .filter(|document| {
                document
                    .path
                    .strip_prefix(&prefix)
                    .map(|rest| !rest.is_empty() && !rest.contains('/'))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn query_group_equal(
        &self,
        group: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        self.check(group)?;
        Ok(self
            .documents
            .iter()
            .filter(|document| {
                let segments: Vec<&str> = document.path.split('/').collect();
                segments.len() >= 2 && segments[segments.len() - 2] == group
            })
            .filter(|document| {
                document
                    .data
                    .get(field)
                    .map(|found| matches(found, value))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// Relational store backed by plain vectors. Queries named in `failing`
/// return an error.
#[derive(Default)]
pub struct FakeRelationalStore {
    pub availability: Vec<AvailabilityRow>,
    pub unavailability: Vec<UnavailabilityRow>,
    pub categories: HashMap<i64, i64>,
    pub bookings: HashMap<i64, Vec<BookingRecord>>,
    pub reviews: HashMap<i64, Vec<ReviewRecord>>,
    pub responses: HashMap<i64, Vec<ServiceResponseRecord>>,
    pub failing: HashSet<&'static str>,
}

impl FakeRelationalStore {
    fn check(&self, query: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(query) {
            return Err(StoreError::Query(format!("{} failed", query)));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalStore for FakeRelationalStore {
    async fn availability(&self, _professional_id: &str) -> Result<Vec<AvailabilityRow>, StoreError> {
        self.check("availability")?;
        Ok(self.availability.clone())
    }

    async fn unavailability(
        &self,
        _professional_id: &str,
    ) -> Result<Vec<UnavailabilityRow>, StoreError> {
        self.check("unavailability")?;
        Ok(self.unavailability.clone())
    }

    async fn service_category(&self, service_id: i64) -> Result<Option<i64>, StoreError> {
        self.check("service_category")?;
        Ok(self.categories.get(&service_id).copied())
    }

    async fn category_bookings(
        &self,
        category_id: i64,
        _window_days: i64,
    ) -> Result<Vec<BookingRecord>, StoreError> {
        self.check("bookings")?;
        Ok(self.bookings.get(&category_id).cloned().unwrap_or_default())
    }

    async fn category_reviews(
        &self,
        category_id: i64,
        _window_days: i64,
    ) -> Result<Vec<ReviewRecord>, StoreError> {
        self.check("reviews")?;
        Ok(self.reviews.get(&category_id).cloned().unwrap_or_default())
    }

    async fn category_response_minutes(
        &self,
        category_id: i64,
    ) -> Result<Vec<ServiceResponseRecord>, StoreError> {
        self.check("response_minutes")?;
        Ok(self.responses.get(&category_id).cloned().unwrap_or_default())
    }
}

pub fn completed_booking(service_id: i64, client_id: i64, ended: NaiveDateTime, price: f64) -> BookingRecord {
    BookingRecord {
        service_id,
        client_id: Some(client_id),
        status: Some("completed".to_string()),
        ends_at: Some(ended),
        final_price: Some(price),
        commission: Some(0.0),
        ..BookingRecord::default()
    }
}

pub fn review(service_id: i64, rating: f64, reviewed_at: NaiveDateTime) -> ReviewRecord {
    ReviewRecord {
        service_id,
        rating: Some(rating),
        reviewed_at: Some(reviewed_at),
    }
}
