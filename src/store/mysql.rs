use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::FromRow;

use crate::error::StoreError;
use crate::store::{
    AvailabilityRow, BookingRecord, RelationalStore, ReviewRecord, ServiceResponseRecord,
    UnavailabilityRow,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub max_connections: u32,
    /// Booking column naming who cancelled, when the schema has one.
    pub cancellation_actor_column: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            max_connections: 10,
            cancellation_actor_column: None,
        }
    }
}

impl DatabaseConfig {
    /// Explicit URL, or one assembled from host/user/password/database.
    pub fn connection_url(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|value| !value.trim().is_empty()) {
            return Some(url.trim().to_string());
        }
        let host = self.host.as_deref().filter(|value| !value.trim().is_empty())?;
        let database = self.database.as_deref().filter(|value| !value.trim().is_empty())?;
        let user = self.user.as_deref().unwrap_or("root");
        let credentials = match self.password.as_deref().filter(|value| !value.is_empty()) {
            Some(password) => format!(
                "{}:{}",
                urlencoding::encode(user),
                urlencoding::encode(password)
            ),
            None => urlencoding::encode(user).into_owned(),
        };
        let authority = match self.port {
            Some(port) => format!("{}:{}", host.trim(), port),
            None => host.trim().to_string(),
        };
        Some(format!("mysql://{}@{}/{}", credentials, authority, database.trim()))
    }
}

/// Relational store over the marketplace's MySQL schema.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    cancellation_actor_column: Option<String>,
}

impl MySqlStore {
    /// Creates a lazily-connecting pool; no connection is opened until the
    /// first query.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config.connection_url().ok_or_else(|| {
            StoreError::Unavailable("DATABASE_URL or HOST/DATABASE is not set".to_string())
        })?;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_lazy(&url)?;
        Ok(Self::from_pool(pool, config.cancellation_actor_column.clone()))
    }

    pub fn from_pool(pool: MySqlPool, cancellation_actor_column: Option<String>) -> Self {
        Self {
            pool,
            cancellation_actor_column: cancellation_actor_column.filter(|column| is_identifier(column)),
        }
    }

    fn bookings_sql(&self) -> String {
        let cancelled_by = match self.cancellation_actor_column.as_deref() {
            Some(column) => format!("CAST(b.`{}` AS CHAR)", column),
            None => "CAST(NULL AS CHAR)".to_string(),
        };
        format!(
            r#"
            SELECT
                CAST(b.service_id AS SIGNED) AS service_id,
                CAST(b.user_id AS SIGNED) AS client_id,
                LOWER(b.booking_status) AS status,
                b.booking_start_datetime AS starts_at,
                b.booking_end_datetime AS ends_at,
                b.order_datetime AS ordered_at,
                CAST(b.final_price AS DOUBLE) AS final_price,
                CAST(b.commission AS DOUBLE) AS commission,
                COALESCE(pay.last_status, '') AS final_payment_status,
                {cancelled_by} AS cancelled_by
            FROM booking b
            JOIN service s ON s.id = b.service_id
            LEFT JOIN (
                SELECT
                    booking_id,
                    SUBSTRING_INDEX(GROUP_CONCAT(status ORDER BY id DESC SEPARATOR ','), ',', 1) AS last_status
                FROM payments
                WHERE type = 'final'
                GROUP BY booking_id
            ) pay ON pay.booking_id = b.id
            WHERE s.service_category_id = ?
              AND (
                (b.booking_end_datetime IS NOT NULL AND b.booking_end_datetime >= DATE_SUB(NOW(), INTERVAL ? DAY)) OR
                (b.booking_start_datetime IS NOT NULL AND b.booking_start_datetime >= DATE_SUB(NOW(), INTERVAL ? DAY)) OR
                (b.order_datetime IS NOT NULL AND b.order_datetime >= DATE_SUB(NOW(), INTERVAL ? DAY))
              )
            "#
        )
    }
}

#[derive(FromRow)]
struct AvailabilitySqlRow {
    day_of_week: Option<i64>,
    start_time: Option<String>,
    end_time: Option<String>,
}

#[derive(FromRow)]
struct UnavailabilitySqlRow {
    start_datetime: Option<NaiveDateTime>,
    end_datetime: Option<NaiveDateTime>,
}

#[derive(FromRow)]
struct BookingSqlRow {
    service_id: Option<i64>,
    client_id: Option<i64>,
    status: Option<String>,
    starts_at: Option<NaiveDateTime>,
    ends_at: Option<NaiveDateTime>,
    ordered_at: Option<NaiveDateTime>,
    final_price: Option<f64>,
    commission: Option<f64>,
    final_payment_status: Option<String>,
    cancelled_by: Option<String>,
}

#[derive(FromRow)]
struct ReviewSqlRow {
    service_id: Option<i64>,
    rating: Option<f64>,
    review_datetime: Option<NaiveDateTime>,
}

#[derive(FromRow)]
struct ResponseSqlRow {
    id: Option<i64>,
    action_rate: Option<f64>,
}

#[async_trait]
impl RelationalStore for MySqlStore {
    async fn availability(&self, professional_id: &str) -> Result<Vec<AvailabilityRow>, StoreError> {
        let rows = sqlx::query_as::<_, AvailabilitySqlRow>(
            r#"
            SELECT
                CAST(day_of_week AS SIGNED) AS day_of_week,
                CAST(start_time AS CHAR) AS start_time,
                CAST(end_time AS CHAR) AS end_time
            FROM user_availability
            WHERE user_id = ?
            "#,
        )
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AvailabilityRow {
                day_of_week: row.day_of_week,
                start_time: row.start_time,
                end_time: row.end_time,
            })
            .collect())
    }

    async fn unavailability(
        &self,
        professional_id: &str,
    ) -> Result<Vec<UnavailabilityRow>, StoreError> {
        let rows = sqlx::query_as::<_, UnavailabilitySqlRow>(
            "SELECT start_datetime, end_datetime FROM user_not_available WHERE user_id = ?",
        )
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UnavailabilityRow {
                start: row.start_datetime,
                end: row.end_datetime,
            })
            .collect())
    }

    async fn service_category(&self, service_id: i64) -> Result<Option<i64>, StoreError> {
        let category: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT CAST(service_category_id AS SIGNED) FROM service WHERE id = ? LIMIT 1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category.flatten())
    }

    async fn category_bookings(
        &self,
        category_id: i64,
        window_days: i64,
    ) -> Result<Vec<BookingRecord>, StoreError> {
        let sql = self.bookings_sql();
        let rows = sqlx::query_as::<_, BookingSqlRow>(&sql)
            .bind(category_id)
            .bind(window_days)
            .bind(window_days)
            .bind(window_days)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(BookingRecord {
                    service_id: row.service_id?,
                    client_id: row.client_id,
                    status: row.status,
                    starts_at: row.starts_at,
                    ends_at: row.ends_at,
                    ordered_at: row.ordered_at,
                    final_price: row.final_price,
                    commission: row.commission,
                    final_payment_status: row.final_payment_status,
                    cancelled_by: row.cancelled_by,
                })
            })
            .collect())
    }

    async fn category_reviews(
        &self,
        category_id: i64,
        window_days: i64,
    ) -> Result<Vec<ReviewRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewSqlRow>(
            r#"
            SELECT
                CAST(r.service_id AS SIGNED) AS service_id,
                CAST(r.rating AS DOUBLE) AS rating,
                r.review_datetime
            FROM review r
            JOIN service s ON s.id = r.service_id
            WHERE s.service_category_id = ?
              AND r.review_datetime >= DATE_SUB(NOW(), INTERVAL ? DAY)
              AND r.rating IS NOT NULL
            "#,
        )
        .bind(category_id)
        .bind(window_days)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(ReviewRecord {
                    service_id: row.service_id?,
                    rating: row.rating,
                    reviewed_at: row.review_datetime,
                })
            })
            .collect())
    }

    async fn category_response_minutes(
        &self,
        category_id: i64,
    ) -> Result<Vec<ServiceResponseRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ResponseSqlRow>(
            r#"
            SELECT CAST(id AS SIGNED) AS id, CAST(action_rate AS DOUBLE) AS action_rate
            FROM service
            WHERE service_category_id = ?
              AND action_rate IS NOT NULL
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(ServiceResponseRecord {
                    service_id: row.id?,
                    response_minutes: row.action_rate,
                })
            })
            .collect())
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
