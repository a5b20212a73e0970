use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::DocumentConfig;
use crate::error::StoreError;
use crate::identity::{ConversationScope, IdentityResolver};
use crate::record::{
    extract_conversation_id, extract_message_id, extract_sender_id, extract_timestamp,
    normalize_identifier,
};
use crate::store::{Document, DocumentStore, FieldValue};
use crate::trace::DebugTrace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_professional: bool,
}

/// Turns a raw message record into a `Message`. Records without a parseable
/// timestamp or a decidable author are dropped.
pub fn normalize_message(
    raw: &Value,
    conversation_id: &str,
    resolver: &IdentityResolver,
    scope: &ConversationScope,
) -> Option<Message> {
    if !raw.is_object() {
        return None;
    }
    let timestamp = extract_timestamp(raw)?;
    let sender_id = extract_sender_id(raw);
    let is_from_professional = resolver.resolve(raw, sender_id.as_deref(), scope)?;
    let id = extract_message_id(raw).unwrap_or_else(|| {
        format!("{}::{}", timestamp.timestamp_millis(), is_from_professional)
    });
    let conversation_id = extract_conversation_id(raw).unwrap_or_else(|| conversation_id.to_string());

    Some(Message {
        id,
        conversation_id,
        timestamp,
        is_from_professional,
    })
}

/// Messages keyed by conversation and message id.
#[derive(Debug, Default)]
pub struct MessageSet {
    messages: BTreeMap<(String, String), Message>,
}

impl MessageSet {
    pub fn insert(&mut self, message: Message) -> bool {
        let key = (message.conversation_id.clone(), message.id.clone());
        if self.messages.contains_key(&key) {
            return false;
        }
        self.messages.insert(key, message);
        true
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_vec(self) -> Vec<Message> {
        self.messages.into_values().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStage {
    Conversations,
    MessageCollections,
    Participants,
    Exhausted,
}

impl CollectionStage {
    pub fn label(self) -> &'static str {
        match self {
            CollectionStage::Conversations => "conversations",
            CollectionStage::MessageCollections => "message_collections",
            CollectionStage::Participants => "participants",
            CollectionStage::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug)]
pub struct Collected {
    pub messages: Vec<Message>,
    pub stage: CollectionStage,
}

#[derive(Debug, Clone, Copy)]
enum QueryKind {
    Equal,
    ArrayContains,
    GroupEqual,
}

#[derive(Debug, Clone)]
struct QuerySpec {
    kind: QueryKind,
    collection: String,
    field: String,
    value: FieldValue,
}

/// Finds every message plausibly belonging to a service, without knowing
/// which collections or fields the client that wrote it used.
pub struct MessageCollector<'a> {
    store: &'a dyn DocumentStore,
    config: &'a DocumentConfig,
}

impl<'a> MessageCollector<'a> {
    pub fn new(store: &'a dyn DocumentStore, config: &'a DocumentConfig) -> Self {
        Self { store, config }
    }

    pub async fn collect(
        &self,
        service_id: &str,
        resolver: &mut IdentityResolver,
        trace: &mut DebugTrace,
    ) -> Collected {
        let service_values = FieldValue::candidates(service_id);

        let conversations = self
            .fan_out(
                self.service_queries(&self.config.conversation_collections, QueryKind::Equal, &service_values),
                trace,
            )
            .await;
        trace.record(
            "conversations_matched",
            json!({ "count": conversations.len() }),
        );
        let messages = self.from_conversations(conversations, resolver, trace).await;
        if !messages.is_empty() {
            return Collected {
                messages: messages.into_vec(),
                stage: CollectionStage::Conversations,
            };
        }

        let mut queries = self.service_queries(&self.config.message_collections, QueryKind::Equal, &service_values);
        queries.extend(self.service_queries(
            std::slice::from_ref(&self.config.message_subcollection),
            QueryKind::GroupEqual,
            &service_values,
        ));
        let documents = self.fan_out(queries, trace).await;
        trace.record(
            "message_documents_matched",
            json!({ "count": documents.len() }),
        );
        let messages = from_message_documents(documents, resolver);
        if !messages.is_empty() {
            return Collected {
                messages: messages.into_vec(),
                stage: CollectionStage::MessageCollections,
            };
        }

        if resolver.known().is_empty() {
            return Collected {
                messages: Vec::new(),
                stage: CollectionStage::Exhausted,
            };
        }

        let conversations = self.fan_out(self.participant_queries(resolver), trace).await;
        trace.record(
            "participant_conversations_matched",
            json!({ "count": conversations.len() }),
        );
        let messages = self.from_conversations(conversations, resolver, trace).await;
        let stage = if messages.is_empty() {
            CollectionStage::Exhausted
        } else {
            CollectionStage::Participants
        };
        Collected {
            messages: messages.into_vec(),
            stage,
        }
    }

    fn service_queries(
        &self,
        collections: &[String],
        kind: QueryKind,
        values: &[FieldValue],
    ) -> Vec<QuerySpec> {
        let mut queries = Vec::new();
        for collection in collections {
            for field in &self.config.service_fields {
                for value in values {
                    queries.push(QuerySpec {
                        kind,
                        collection: collection.clone(),
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        queries
    }

    fn participant_queries(&self, resolver: &IdentityResolver) -> Vec<QuerySpec> {
        let needles: Vec<FieldValue> = resolver
            .known()
            .iter()
            .flat_map(FieldValue::candidates)
            .collect();

        let mut queries = Vec::new();
        for collection in &self.config.conversation_collections {
            for field in &self.config.participant_fields {
                for needle in &needles {
                    queries.push(QuerySpec {
                        kind: QueryKind::ArrayContains,
                        collection: collection.clone(),
                        field: field.clone(),
                        value: needle.clone(),
                    });
                }
            }
        }
        queries
    }

    async fn run(&self, spec: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        match spec.kind {
            QueryKind::Equal => {
                self.store
                    .query_equal(&spec.collection, &spec.field, &spec.value)
                    .await
            }
            QueryKind::ArrayContains => {
                self.store
                    .query_array_contains(&spec.collection, &spec.field, &spec.value)
                    .await
            }
            QueryKind::GroupEqual => {
                self.store
                    .query_group_equal(&spec.collection, &spec.field, &spec.value)
                    .await
            }
        }
    }

    /// Runs every query concurrently and merges the hits by document path. A
    /// failing query contributes nothing.
    async fn fan_out(&self, specs: Vec<QuerySpec>, trace: &mut DebugTrace) -> BTreeMap<String, Document> {
        let results = join_all(specs.iter().map(|spec| self.run(spec))).await;

        let mut merged = BTreeMap::new();
        for (spec, result) in specs.iter().zip(results) {
            match result {
                Ok(documents) => {
                    for document in documents {
                        merged.entry(document.path.clone()).or_insert(document);
                    }
                }
                Err(err) => {
                    warn!(
                        collection = %spec.collection,
                        field = %spec.field,
                        value = %spec.value,
                        error = %err,
                        "document query failed"
                    );
                    trace.record(
                        "document_query_failed",
                        json!({
                            "collection": spec.collection,
                            "field": spec.field,
                            "value": spec.value,
                            "kind": format!("{:?}", spec.kind),
                            "error": err.to_string(),
                        }),
                    );
                }
            }
        }
        debug!(queries = specs.len(), documents = merged.len(), "fan-out merged");
        merged
    }

    async fn from_conversations(
        &self,
        conversations: BTreeMap<String, Document>,
        resolver: &mut IdentityResolver,
        trace: &mut DebugTrace,
    ) -> MessageSet {
        let nested = join_all(
            conversations
                .values()
                .map(|conversation| self.store.subcollection(&conversation.path, &self.config.message_subcollection)),
        )
        .await;

        let mut collected = MessageSet::default();
        for (conversation, nested) in conversations.values().zip(nested) {
            let mut raw_messages: Vec<Value> = conversation
                .data
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            match nested {
                Ok(documents) => raw_messages.extend(documents.iter().map(with_document_id)),
                Err(err) => {
                    warn!(path = %conversation.path, error = %err, "message sub-collection read failed");
                    trace.record(
                        "message_subcollection_failed",
                        json!({ "path": conversation.path, "error": err.to_string() }),
                    );
                }
            }

            let conversation_id = conversation
                .data
                .get("conversationId")
                .and_then(normalize_identifier)
                .unwrap_or_else(|| conversation.id.clone());

            let scope = resolver.learn_from_conversation(&conversation.data);
            for raw in &raw_messages {
                resolver.learn_from_message(raw);
            }
            for raw in &raw_messages {
                if let Some(message) = normalize_message(raw, &conversation_id, resolver, &scope) {
                    collected.insert(message);
                }
            }
        }
        collected
    }
}

fn from_message_documents(
    documents: BTreeMap<String, Document>,
    resolver: &mut IdentityResolver,
) -> MessageSet {
    let global = ConversationScope::new();
    for document in documents.values() {
        resolver.learn_from_message(&document.data);
    }

    let mut collected = MessageSet::default();
    for document in documents.values() {
        let raw = with_document_id(document);
        let conversation_id = document
            .parent_document_id()
            .unwrap_or(document.id.as_str())
            .to_string();
        if let Some(message) = normalize_message(&raw, &conversation_id, resolver, &global) {
            collected.insert(message);
        }
    }
    collected
}

/// Document data with the document id filled in when the data has none.
fn with_document_id(document: &Document) -> Value {
    let mut data = document.data.clone();
    if let Value::Object(map) = &mut data {
        map.entry("id")
            .or_insert_with(|| Value::String(document.id.clone()));
    }
    data
}
