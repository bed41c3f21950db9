//! Shared fixtures for unit tests: seeded in-memory store records, a
//! canned extractor, and payload builders. Seeded tenants authenticate
//! with the token `tok-{username}`.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use lib_store::{MemStore, RecordStore};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    model::{
        collection::{Collection, CollectionCtrl},
        document::DocumentCtrl,
        DATABASES_SET, QUOTAS_SET, USERS_SET,
    },
    prompt::{ExtractedRecords, StructuredExtractor},
    schema::{fields_to_schema, FieldSpec},
    ServerState,
};

pub async fn seed_tenant(store: &MemStore, username: &str, credits: i64) -> String {
    let fields = json!({
        "email": format!("{}@example.com", username),
        "username": username,
        "credits": credits,
    });
    let record = store
        .create(USERS_SET, fields.as_object().cloned().unwrap())
        .await
        .unwrap();
    store.register_token(&format!("tok-{}", username), &record.id);
    record.id
}

pub async fn seed_database(store: &MemStore, user_id: &str, name: &str) -> String {
    let fields = json!({"name": name, "user": user_id});
    let record = store
        .create(DATABASES_SET, fields.as_object().cloned().unwrap())
        .await
        .unwrap();
    record.id
}

pub async fn seed_collection(
    store: &MemStore,
    user_id: &str,
    database_id: &str,
    name: &str,
    fields: &[FieldSpec],
    description: Option<&str>,
) -> String {
    CollectionCtrl::create(store, user_id, database_id, name, fields, description)
        .await
        .unwrap()
        .id
}

pub async fn seed_quota(store: &MemStore, user_id: &str, used: i64, total: i64) {
    let fields = json!({"user": user_id, "used": used, "total": total});
    store
        .create(QUOTAS_SET, fields.as_object().cloned().unwrap())
        .await
        .unwrap();
}

/// Stores an email document the way live ingestion would, with an empty
/// HTML body and the given plain text.
pub async fn seed_email_document(
    store: &MemStore,
    user_id: &str,
    database_id: &str,
    emails_collection_id: &str,
    message_id: &str,
    text_body: &str,
) -> String {
    let data = json!({
        "messageId": message_id,
        "from": "sender@example.com",
        "subject": "fixture",
        "htmlBody": "",
        "textBody": text_body,
    });
    DocumentCtrl::insert(
        store,
        user_id,
        database_id,
        emails_collection_id,
        data.as_object().cloned().unwrap(),
        None,
    )
    .await
    .unwrap()
    .id
}

/// A collection value that never touched a store, for pure schema and
/// prompt tests.
pub fn collection_fixture(name: &str, fields: &[FieldSpec]) -> Collection {
    Collection {
        id: format!("col-{}", name),
        name: name.to_string(),
        database: "db-fixture".to_string(),
        user: "user-fixture".to_string(),
        description: None,
        doc_data_schema: fields_to_schema(fields),
    }
}

pub fn inbound_payload(
    to: &str,
    message_id: &str,
    text_body: &str,
) -> crate::email::inbound::InboundEmail {
    crate::email::inbound::InboundEmail {
        message_id: message_id.to_string(),
        from: "sender@example.com".to_string(),
        to: to.to_string(),
        subject: "fixture".to_string(),
        text_body: text_body.to_string(),
        html_body: if text_body.is_empty() {
            String::new()
        } else {
            format!("<p>{}</p>", text_body)
        },
        ..Default::default()
    }
}

/// Turns a `json!` object of arrays into the extractor result type.
pub fn extracted(value: Value) -> ExtractedRecords {
    let mut records = ExtractedRecords::new();
    let Value::Object(map) = value else {
        panic!("extracted fixture must be an object");
    };
    for (name, items) in map {
        let Value::Array(items) = items else {
            panic!("extracted fixture values must be arrays");
        };
        let rows = items
            .into_iter()
            .map(|item| item.as_object().cloned().unwrap())
            .collect();
        records.insert(name, rows);
    }
    records
}

/// Canned extractor: returns a fixed result (or a fixed error) and counts
/// invocations.
pub struct StubExtractor {
    result: ExtractedRecords,
    fail: bool,
    calls: AtomicUsize,
}

impl StubExtractor {
    pub fn returning(result: ExtractedRecords) -> Self {
        Self {
            result,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: ExtractedRecords::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredExtractor for StubExtractor {
    async fn extract(
        &self,
        _email_content: &str,
        _collections: &[Collection],
    ) -> AppResult<ExtractedRecords> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow::anyhow!("canned extractor failure").into());
        }
        Ok(self.result.clone())
    }
}

/// State for handler-level tests, backed by a shared in-memory store and a
/// no-op extractor.
pub fn server_state() -> (ServerState, Arc<MemStore>) {
    let store = Arc::new(MemStore::new());
    let state = ServerState {
        http_client: reqwest::Client::new(),
        store: store.clone(),
        extractor: Arc::new(StubExtractor::returning(ExtractedRecords::new())),
    };
    (state, store)
}
