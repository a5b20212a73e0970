use serde_json::json;
use service_metrics::store::firestore::{decode_fields, decode_value, encode_value, FirestoreClient, FirestoreConfig};
use service_metrics::store::{Document, FieldValue};

#[test]
fn decodes_typed_values_into_plain_json() {
    let fields = json!({
        "serviceId": { "integerValue": "42" },
        "price": { "doubleValue": 12.5 },
        "closed": { "booleanValue": false },
        "note": { "nullValue": null },
        "createdAt": { "timestampValue": "2024-01-01T10:00:00Z" },
        "participants": { "arrayValue": { "values": [
            { "stringValue": "pro-1" },
            { "integerValue": "7" }
        ] } },
        "sender": { "mapValue": { "fields": {
            "id": { "stringValue": "client-1" },
            "isProfessional": { "booleanValue": false }
        } } },
        "empty": { "arrayValue": {} }
    });

    let decoded = decode_fields(fields.as_object().expect("object"));
    assert_eq!(
        decoded,
        json!({
            "serviceId": 42,
            "price": 12.5,
            "closed": false,
            "note": null,
            "createdAt": "2024-01-01T10:00:00Z",
            "participants": ["pro-1", 7],
            "sender": { "id": "client-1", "isProfessional": false },
            "empty": []
        })
    );
}

#[test]
fn unknown_value_kinds_decode_to_null() {
    assert_eq!(decode_value(&json!({ "mysteryValue": 1 })), json!(null));
    assert_eq!(decode_value(&json!("bare")), json!(null));
}

#[test]
fn encodes_query_values() {
    assert_eq!(
        encode_value(&FieldValue::Text("svc".to_string())),
        json!({ "stringValue": "svc" })
    );
    assert_eq!(
        encode_value(&FieldValue::Integer(42)),
        json!({ "integerValue": "42" })
    );
}

#[test]
fn service_ids_are_tried_as_text_and_number() {
    assert_eq!(
        FieldValue::candidates(" 42"),
        vec![
            FieldValue::Text(" 42".to_string()),
            FieldValue::Text("42".to_string()),
            FieldValue::Integer(42),
        ]
    );
    assert_eq!(
        FieldValue::candidates("abc"),
        vec![FieldValue::Text("abc".to_string())]
    );
}

#[test]
fn document_paths_expose_ids() {
    let nested = Document::new("conversations/c1/messages/m1", json!({}));
    assert_eq!(nested.id, "m1");
    assert_eq!(nested.parent_document_id(), Some("c1"));

    let top = Document::new("messages/m2", json!({}));
    assert_eq!(top.id, "m2");
    assert_eq!(top.parent_document_id(), None);
}

#[test]
fn client_requires_project_and_credentials() {
    assert!(FirestoreClient::connect(&FirestoreConfig::default()).is_err());

    let without_token = FirestoreConfig {
        project_id: Some("demo".to_string()),
        ..FirestoreConfig::default()
    };
    assert!(FirestoreClient::connect(&without_token).is_err());

    let emulator = FirestoreConfig {
        project_id: Some("demo".to_string()),
        emulator_host: Some("localhost:8080".to_string()),
        ..FirestoreConfig::default()
    };
    assert!(FirestoreClient::connect(&emulator).is_ok());
}
