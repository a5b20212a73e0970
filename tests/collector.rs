mod common;

use common::FakeDocumentStore;
use serde_json::json;
use service_metrics::collector::{CollectionStage, MessageCollector};
use service_metrics::config::DocumentConfig;
use service_metrics::identity::{IdentityResolver, ProfessionalIds};
use service_metrics::trace::DebugTrace;

fn conversation_store() -> FakeDocumentStore {
    FakeDocumentStore::new()
        .with(
            "conversations/c1",
            json!({
                "serviceId": 5,
                "service": "5",
                "professionalId": "pro-1",
                "messages": [
                    { "id": "m1", "senderId": "client-1", "createdAt": "2024-01-01T10:00:00Z" }
                ]
            }),
        )
        .with(
            "conversations/c1/messages/m1",
            json!({ "senderId": "client-1", "createdAt": "2024-01-01T10:00:00Z" }),
        )
        .with(
            "conversations/c1/messages/m2",
            json!({ "senderId": "pro-1", "createdAt": "2024-01-01T10:30:00Z" }),
        )
        .with(
            "conversations/c1/messages/m3",
            json!({ "senderId": "client-1", "text": "no timestamp" }),
        )
}

#[tokio::test]
async fn collects_from_matching_conversations() {
    let store = conversation_store();
    let config = DocumentConfig::default();
    let mut resolver = IdentityResolver::new(ProfessionalIds::new());
    let mut trace = DebugTrace::new();

    let collected = MessageCollector::new(&store, &config)
        .collect("5", &mut resolver, &mut trace)
        .await;

    assert_eq!(collected.stage, CollectionStage::Conversations);
    assert_eq!(collected.messages.len(), 2);
    let professional: Vec<&str> = collected
        .messages
        .iter()
        .filter(|message| message.is_from_professional)
        .map(|message| message.id.as_str())
        .collect();
    assert_eq!(professional, vec!["m2"]);
    assert!(collected.messages.iter().all(|message| message.conversation_id == "c1"));
    assert!(trace.has_stage("conversations_matched"));
}

#[tokio::test]
async fn repeated_collection_is_identical() {
    let store = conversation_store();
    let config = DocumentConfig::default();

    let mut first_resolver = IdentityResolver::new(ProfessionalIds::new());
    let first = MessageCollector::new(&store, &config)
        .collect("5", &mut first_resolver, &mut DebugTrace::new())
        .await;
    let mut second_resolver = IdentityResolver::new(ProfessionalIds::new());
    let second = MessageCollector::new(&store, &config)
        .collect("5", &mut second_resolver, &mut DebugTrace::new())
        .await;

    assert_eq!(first.messages, second.messages);
}

#[tokio::test]
async fn falls_back_to_message_collections() {
    let store = FakeDocumentStore::new()
        .with(
            "messages/m1",
            json!({ "serviceId": "svc-2", "chatId": "c9", "senderRole": "client", "createdAt": "2024-01-01T10:00:00Z" }),
        )
        .with(
            "messages/m2",
            json!({ "serviceId": "svc-2", "chatId": "c9", "senderRole": "professional", "createdAt": "2024-01-01T11:00:00Z" }),
        )
        .with(
            "chats/c7/messages/m3",
            json!({ "service_id": "svc-2", "isFromProfessional": false, "createdAt": "2024-01-02T08:00:00Z" }),
        );
    let config = DocumentConfig::default();
    let mut resolver = IdentityResolver::new(ProfessionalIds::new());
    let mut trace = DebugTrace::new();

    let collected = MessageCollector::new(&store, &config)
        .collect("svc-2", &mut resolver, &mut trace)
        .await;

    assert_eq!(collected.stage, CollectionStage::MessageCollections);
    assert_eq!(collected.messages.len(), 3);
    let nested = collected
        .messages
        .iter()
        .find(|message| message.id == "m3")
        .expect("nested message collected");
    assert_eq!(nested.conversation_id, "c7");
    assert!(collected
        .messages
        .iter()
        .filter(|message| message.id != "m3")
        .all(|message| message.conversation_id == "c9"));
}

#[tokio::test]
async fn falls_back_to_participant_conversations() {
    let store = FakeDocumentStore::new()
        .with(
            "chats/c3",
            json!({ "participants": ["pro-3", "client-3"] }),
        )
        .with(
            "chats/c3/messages/a",
            json!({ "senderId": "client-3", "createdAt": "2024-01-01T10:00:00Z" }),
        )
        .with(
            "chats/c3/messages/b",
            json!({ "senderId": "pro-3", "createdAt": "2024-01-01T10:05:00Z" }),
        );
    let config = DocumentConfig::default();
    let mut resolver = IdentityResolver::new(ProfessionalIds::seeded("pro-3"));
    let mut trace = DebugTrace::new();

    let collected = MessageCollector::new(&store, &config)
        .collect("svc-3", &mut resolver, &mut trace)
        .await;

    assert_eq!(collected.stage, CollectionStage::Participants);
    assert_eq!(collected.messages.len(), 2);
    assert!(trace.has_stage("participant_conversations_matched"));
}

#[tokio::test]
async fn failed_queries_do_not_abort_collection() {
    let store = conversation_store().failing("chats").failing("messages");
    let config = DocumentConfig::default();
    let mut resolver = IdentityResolver::new(ProfessionalIds::new());
    let mut trace = DebugTrace::new();

    let collected = MessageCollector::new(&store, &config)
        .collect("5", &mut resolver, &mut trace)
        .await;

    assert_eq!(collected.stage, CollectionStage::Conversations);
    assert_eq!(collected.messages.len(), 1);
    assert!(trace.has_stage("document_query_failed"));
    assert!(trace.has_stage("message_subcollection_failed"));
}

#[tokio::test]
async fn nothing_found_is_exhausted() {
    let store = FakeDocumentStore::new();
    let config = DocumentConfig::default();
    let mut resolver = IdentityResolver::new(ProfessionalIds::new());
    let mut trace = DebugTrace::new();

    let collected = MessageCollector::new(&store, &config)
        .collect("404", &mut resolver, &mut trace)
        .await;

    assert_eq!(collected.stage, CollectionStage::Exhausted);
    assert!(collected.messages.is_empty());
    assert!(store.query_count() > 0);
}

#[tokio::test]
async fn descriptive_pro_keys_do_not_narrow_the_conversation() {
    let store = FakeDocumentStore::new()
        .with(
            "conversations/c9",
            json!({ "serviceId": 5, "professionalName": "Ana Garcia", "profileImage": "a.png" }),
        )
        .with(
            "conversations/c9/messages/m1",
            json!({ "senderId": "client-1", "createdAt": "2024-01-01T10:00:00Z" }),
        )
        .with(
            "conversations/c9/messages/m2",
            json!({ "senderId": "pro-1", "createdAt": "2024-01-01T10:20:00Z" }),
        );
    let config = DocumentConfig::default();
    let mut resolver = IdentityResolver::new(ProfessionalIds::seeded("pro-1"));

    let collected = MessageCollector::new(&store, &config)
        .collect("5", &mut resolver, &mut DebugTrace::new())
        .await;

    assert_eq!(collected.messages.len(), 2);
    for message in &collected.messages {
        assert_eq!(message.is_from_professional, message.id == "m2", "{}", message.id);
    }
}
