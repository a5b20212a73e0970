use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::store::{DatabaseConfig, FirestoreConfig};
use crate::success::{CancellationPolicy, SignalWeights};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub conversation_collections: Vec<String>,
    pub message_collections: Vec<String>,
    pub service_fields: Vec<String>,
    pub participant_fields: Vec<String>,
    pub message_subcollection: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            conversation_collections: strings(&["conversations", "chats", "serviceChats"]),
            message_collections: strings(&["messages", "chatMessages"]),
            service_fields: strings(&["serviceId", "service_id", "serviceID", "service"]),
            participant_fields: strings(&["participants"]),
            message_subcollection: "messages".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    pub min_pairs: usize,
    pub window_days: i64,
    pub half_life_days: f64,
    pub cap_minutes: f64,
    pub trim_fraction: f64,
    pub winsor_lower: f64,
    pub winsor_upper: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            min_pairs: 3,
            window_days: 180,
            half_life_days: 90.0,
            cap_minutes: 7.0 * 24.0 * 60.0,
            trim_fraction: 0.05,
            winsor_lower: 0.05,
            winsor_upper: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryFallbacks {
    pub p90_cancel_ratio: f64,
    pub p90_revenue: f64,
    pub p90_dispute_ratio: f64,
    pub p75_response_minutes: f64,
    pub mean_rating: f64,
    pub prior: f64,
}

impl Default for CategoryFallbacks {
    fn default() -> Self {
        Self {
            p90_cancel_ratio: 0.1,
            p90_revenue: 100.0,
            p90_dispute_ratio: 0.05,
            p75_response_minutes: 60.0,
            mean_rating: 3.5,
            prior: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuccessConfig {
    pub retention_window_days: i64,
    pub success_window_days: i64,
    pub half_life_days: f64,
    pub wilson_z: f64,
    pub rating_prior_count: f64,
    pub min_completed: u32,
    pub min_reviews: u32,
    pub reliability_scale: f64,
    pub cancellation_policy: CancellationPolicy,
    pub weights: SignalWeights,
    pub fallbacks: CategoryFallbacks,
}

impl Default for SuccessConfig {
    fn default() -> Self {
        Self {
            retention_window_days: 365,
            success_window_days: 180,
            half_life_days: 90.0,
            wilson_z: 1.64,
            rating_prior_count: 10.0,
            min_completed: 5,
            min_reviews: 3,
            reliability_scale: 20.0,
            cancellation_policy: CancellationPolicy::default(),
            weights: SignalWeights::default(),
            fallbacks: CategoryFallbacks::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Offset from UTC, in minutes, that weekly availability and stored
    /// local datetimes are expressed in.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub documents: DocumentConfig,
    pub response: ResponseConfig,
    pub success: SuccessConfig,
    pub calendar: CalendarConfig,
    pub firestore: FirestoreConfig,
    pub database: DatabaseConfig,
}

impl MetricsConfig {
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>), String> {
        let config_path = path.or_else(default_config_path);
        let mut config = if let Some(path) = config_path.as_ref() {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .map_err(|err| format!("failed to read config: {}", err))?;
                toml::from_str(&contents)
                    .map_err(|err| format!("failed to parse config: {}", err))?
            } else {
                MetricsConfig::default()
            }
        } else {
            MetricsConfig::default()
        };

        config.apply_env_overrides();
        Ok((config, config_path))
    }

    pub fn write(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create config dir: {}", err))?;
        }
        let payload = toml::to_string_pretty(self)
            .map_err(|err| format!("failed to serialize config: {}", err))?;
        std::fs::write(path, payload).map_err(|err| format!("failed to write config: {}", err))?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Applies overrides from any key lookup; `apply_env_overrides` passes the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let docs = &mut self.documents;
        if let Some(value) = lookup("FIRESTORE_CONVERSATION_COLLECTIONS") {
            docs.conversation_collections = merge_list(&value, &docs.conversation_collections);
        }
        if let Some(value) = lookup("FIRESTORE_MESSAGE_COLLECTIONS") {
            docs.message_collections = merge_list(&value, &docs.message_collections);
        }
        if let Some(value) = lookup("FIRESTORE_SERVICE_FIELD_NAMES") {
            docs.service_fields = merge_list(&value, &docs.service_fields);
        }
        if let Some(value) = lookup("FIRESTORE_PARTICIPANT_FIELD_NAMES") {
            docs.participant_fields = merge_list(&value, &docs.participant_fields);
        }
        if let Some(value) = non_empty(lookup("FIRESTORE_MESSAGE_SUBCOLLECTION")) {
            docs.message_subcollection = value;
        }

        if let Some(value) = lookup("SERVICE_RESPONSE_TIME_MIN_PAIRS") {
            if let Ok(parsed) = value.trim().parse::<usize>() {
                self.response.min_pairs = parsed;
            }
        }
        self.response.min_pairs = self.response.min_pairs.max(1);

        if let Some(value) = lookup("METRICS_CANCELLATION_POLICY") {
            if let Some(policy) = CancellationPolicy::parse(&value) {
                self.success.cancellation_policy = policy;
            }
        }
        if let Some(value) = lookup("METRICS_CALENDAR_UTC_OFFSET_MINUTES") {
            if let Ok(parsed) = value.trim().parse::<i32>() {
                self.calendar.utc_offset_minutes = parsed;
            }
        }

        let firestore = &mut self.firestore;
        if let Some(value) = non_empty(lookup("FIRESTORE_PROJECT_ID")) {
            firestore.project_id = Some(value);
        }
        if let Some(value) = non_empty(lookup("FIRESTORE_DATABASE")) {
            firestore.database = value;
        }
        if let Some(value) = non_empty(lookup("FIRESTORE_ACCESS_TOKEN")) {
            firestore.access_token = Some(value);
        }
        if let Some(value) = non_empty(lookup("FIRESTORE_EMULATOR_HOST")) {
            firestore.emulator_host = Some(value);
        }
        if let Some(value) = lookup("FIRESTORE_TIMEOUT_MS") {
            if let Ok(parsed) = value.trim().parse::<u64>() {
                firestore.timeout_ms = parsed;
            }
        }

        let database = &mut self.database;
        if let Some(value) = non_empty(lookup("DATABASE_URL")) {
            database.url = Some(value);
        }
        if let Some(value) = non_empty(lookup("HOST")) {
            database.host = Some(value);
        }
        if let Some(value) = lookup("DATABASE_PORT") {
            if let Ok(parsed) = value.trim().parse::<u16>() {
                database.port = Some(parsed);
            }
        }
        if let Some(value) = non_empty(lookup("USER")) {
            database.user = Some(value);
        }
        if let Some(value) = lookup("PASSWORD") {
            database.password = Some(value);
        }
        if let Some(value) = non_empty(lookup("DATABASE")).or_else(|| non_empty(lookup("NAME"))) {
            database.database = Some(value);
        }
        if let Some(value) = lookup("DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                database.max_connections = parsed;
            }
        }
        if let Some(value) = non_empty(lookup("DATABASE_CANCELLATION_ACTOR_COLUMN")) {
            database.cancellation_actor_column = Some(value);
        }
    }
}

/// Comma-separated entries first, then the existing entries not already
/// listed.
pub fn merge_list(raw: &str, existing: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let entries = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .chain(existing.iter().cloned());
    for entry in entries {
        if !merged.contains(&entry) {
            merged.push(entry);
        }
    }
    merged
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn default_config_path() -> Option<PathBuf> {
    env::var("METRICS_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config/metrics.toml")))
}
