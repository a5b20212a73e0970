use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{Document, DocumentStore, FieldValue};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: Option<String>,
    pub database: String,
    pub access_token: Option<String>,
    pub emulator_host: Option<String>,
    pub api_base: String,
    pub timeout_ms: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database: "(default)".to_string(),
            access_token: None,
            emulator_host: None,
            api_base: "https://firestore.googleapis.com/v1".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Document store backed by the Firestore REST `runQuery` endpoint.
#[derive(Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    api_base: String,
    documents_root: String,
    token: Option<String>,
}

impl FirestoreClient {
    pub fn connect(config: &FirestoreConfig) -> Result<Self, StoreError> {
        let project_id = config
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| StoreError::Unavailable("FIRESTORE_PROJECT_ID is not set".to_string()))?;

        let (api_base, token) = match config.emulator_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => {
                (format!("http://{}/v1", host), Some("owner".to_string()))
            }
            _ => {
                let token = config
                    .access_token
                    .clone()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| {
                        StoreError::Unavailable("FIRESTORE_ACCESS_TOKEN is not set".to_string())
                    })?;
                (config.api_base.clone(), Some(token))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| StoreError::Unavailable(format!("failed to build firestore client: {}", err)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            documents_root: format!(
                "projects/{}/databases/{}/documents",
                project_id, config.database
            ),
            token,
        })
    }

    async fn run_query(
        &self,
        parent: &str,
        query: StructuredQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}/{}:runQuery", self.api_base, parent);
        let mut request = self.client.post(url).json(&RunQueryRequest {
            structured_query: query,
        });
        if let Some(token) = self.token.as_deref() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let detail = error_body.trim();
            if detail.is_empty() {
                return Err(StoreError::Query(format!("firestore error: {}", status)));
            }
            return Err(StoreError::Query(format!("firestore error: {} {}", status, detail)));
        }

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|err| StoreError::Decode(format!("firestore response parse failed: {}", err)))?;

        let documents: Vec<Document> = items
            .into_iter()
            .filter_map(|item| item.document)
            .filter_map(|raw| {
                let path = relative_path(&raw.name)?.to_string();
                Some(Document::new(path, decode_fields(&raw.fields)))
            })
            .collect();
        debug!(parent, count = documents.len(), "firestore query completed");
        Ok(documents)
    }

    fn filtered_query(
        collection: &str,
        all_descendants: bool,
        field: &str,
        op: &'static str,
        value: &FieldValue,
    ) -> StructuredQuery {
        StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: collection.to_string(),
                all_descendants,
            }],
            filter: Some(Filter {
                field_filter: FieldFilter {
                    field: FieldReference {
                        field_path: quote_field_path(field),
                    },
                    op,
                    value: encode_value(value),
                },
            }),
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        let query = Self::filtered_query(collection, false, field, "EQUAL", value);
        self.run_query(&self.documents_root, query).await
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        let query = Self::filtered_query(collection, false, field, "ARRAY_CONTAINS", value);
        self.run_query(&self.documents_root, query).await
    }

    async fn subcollection(
        &self,
        parent_path: &str,
        collection: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let parent = format!("{}/{}", self.documents_root, parent_path.trim_matches('/'));
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: collection.to_string(),
                all_descendants: false,
            }],
            filter: None,
        };
        self.run_query(&parent, query).await
    }

    async fn query_group_equal(
        &self,
        group: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        let query = Self::filtered_query(group, true, field, "EQUAL", value);
        self.run_query(&self.documents_root, query).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest {
    structured_query: StructuredQuery,
}

#[derive(Serialize)]
struct StructuredQuery {
    from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<Filter>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector {
    collection_id: String,
    all_descendants: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    field_filter: FieldFilter,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldFilter {
    field: FieldReference,
    op: &'static str,
    value: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference {
    field_path: String,
}

#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<RawDocument>,
}

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => json!({ "stringValue": text }),
        FieldValue::Integer(number) => json!({ "integerValue": number.to_string() }),
    }
}

/// Converts Firestore's typed value encoding into plain JSON. Timestamps
/// become RFC 3339 strings and 64-bit integers become JSON numbers.
pub fn decode_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = map.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.as_bool().map(Value::Bool).unwrap_or(Value::Null),
        "integerValue" => match inner {
            Value::String(text) => text.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            Value::String(text) => text
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_else(|| Value::Object(Map::new())),
        _ => Value::Null,
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), decode_value(value)))
            .collect(),
    )
}

fn relative_path(name: &str) -> Option<&str> {
    name.split_once("/documents/").map(|(_, rest)| rest)
}

fn quote_field_path(field: &str) -> String {
    let simple = field
        .chars()
        .next()
        .map(|first| first.is_ascii_alphabetic() || first == '_')
        .unwrap_or(false)
        && field.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('`', "\\`"))
    }
}
