use anyhow::Context;
use lib_store::{Filter, Record, RecordStore, Sort, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    schema::{fields_to_schema, FieldSpec, FieldType, StoredSchema, EMAILS_COLLECTION},
};

use super::COLLECTIONS_SET;

#[derive(Debug, Clone)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub database: String,
    pub user: String,
    pub description: Option<String>,
    pub doc_data_schema: StoredSchema,
}

impl Collection {
    pub fn from_record(record: Record) -> AppResult<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Fields {
            name: String,
            database: String,
            user: String,
            #[serde(default)]
            description: Option<String>,
            #[serde(default)]
            doc_data_schema: Option<StoredSchema>,
        }

        let id = record.id;
        let fields: Fields = serde_json::from_value(Value::Object(record.fields))
            .context("Malformed collection record")?;

        Ok(Collection {
            id,
            name: fields.name,
            database: fields.database,
            user: fields.user,
            description: fields.description.filter(|d| !d.is_empty()),
            doc_data_schema: fields.doc_data_schema.unwrap_or_default(),
        })
    }

    pub fn is_emails(&self) -> bool {
        self.name == EMAILS_COLLECTION
    }

    pub fn has_schema(&self) -> bool {
        !self.doc_data_schema.is_empty()
    }
}

/// Fixed schema of the canonical `emails` collection. Never a target of
/// generic extraction.
pub fn email_schema() -> StoredSchema {
    fields_to_schema(&[
        FieldSpec::new("messageId", FieldType::String, "Unique message id"),
        FieldSpec::new("from", FieldType::Email, "Sender address"),
        FieldSpec::new("subject", FieldType::String, "Email subject"),
        FieldSpec::new("htmlBody", FieldType::String, "Raw HTML body"),
        FieldSpec::new("textBody", FieldType::String, "Plain text body"),
    ])
}

/// Starter collections seeded into a fresh database by the kickstart
/// endpoint: (name, fields, extraction guidance).
pub fn starter_collections() -> Vec<(&'static str, Vec<FieldSpec>, &'static str)> {
    vec![
        (
            "news",
            vec![
                FieldSpec::new("image", FieldType::Url, "News image"),
                FieldSpec::new("title", FieldType::String, "News title"),
                FieldSpec::new("link", FieldType::Url, "Link to the news article"),
                FieldSpec::new("summary", FieldType::String, "News summary"),
            ],
            "Collect all news from emails, no matter how small.",
        ),
        (
            "people_mentions",
            vec![
                FieldSpec::new("name", FieldType::String, "Name of the person mentioned"),
                FieldSpec::new(
                    "company",
                    FieldType::String,
                    "Company where they work if available",
                ),
                FieldSpec::new("link", FieldType::Url, "Link associated"),
                FieldSpec::new(
                    "context",
                    FieldType::String,
                    "Context in which the person was mentioned",
                ),
            ],
            "Collect mentions of people in emails, when they said something, did something.",
        ),
        (
            "images",
            vec![
                FieldSpec::new("image", FieldType::Url, "Image URL"),
                FieldSpec::new(
                    "description",
                    FieldType::String,
                    "Description of the image based on the context",
                ),
            ],
            "Collect images from emails, no matter how small.",
        ),
    ]
}

pub struct CollectionCtrl;

impl CollectionCtrl {
    pub async fn get_by_id(store: &dyn RecordStore, collection_id: &str) -> AppResult<Collection> {
        let record = store
            .get(COLLECTIONS_SET, collection_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::NotFound("Collection not found".to_string()),
                other => other.into(),
            })?;

        Collection::from_record(record)
    }

    pub async fn get_for_database(
        store: &dyn RecordStore,
        database_id: &str,
    ) -> AppResult<Vec<Collection>> {
        let records = store
            .get_full_list(
                COLLECTIONS_SET,
                &Filter::new().eq("database", database_id),
                Sort::CreatedAsc,
            )
            .await?;

        records.into_iter().map(Collection::from_record).collect()
    }

    pub async fn create(
        store: &dyn RecordStore,
        user_id: &str,
        database_id: &str,
        name: &str,
        fields: &[FieldSpec],
        description: Option<&str>,
    ) -> AppResult<Collection> {
        let schema = fields_to_schema(fields);
        let record_fields = json!({
            "name": name,
            "database": database_id,
            "user": user_id,
            "description": description.unwrap_or_default(),
            "docDataSchema": serde_json::to_value(&schema).context("Schema serialization")?,
        });

        let record = store
            .create(COLLECTIONS_SET, record_fields.as_object().cloned().unwrap())
            .await?;
        tracing::info!(
            "Collection {} created in database {} for user {}",
            name,
            database_id,
            user_id
        );
        Collection::from_record(record)
    }

    /// Fetches the canonical `emails` collection of a database, creating it
    /// with its fixed schema when missing.
    pub async fn ensure_emails_collection(
        store: &dyn RecordStore,
        user_id: &str,
        database_id: &str,
    ) -> AppResult<Collection> {
        let filter = Filter::new()
            .eq("name", EMAILS_COLLECTION)
            .eq("database", database_id);
        match store.get_first_matching(COLLECTIONS_SET, &filter).await {
            Ok(record) => Collection::from_record(record),
            Err(StoreError::NotFound) => {
                let record_fields = json!({
                    "name": EMAILS_COLLECTION,
                    "database": database_id,
                    "user": user_id,
                    "docDataSchema": serde_json::to_value(email_schema())
                        .context("Schema serialization")?,
                });
                let record = store
                    .create(COLLECTIONS_SET, record_fields.as_object().cloned().unwrap())
                    .await?;
                tracing::info!(
                    "Emails collection created in database {} for user {}",
                    database_id,
                    user_id
                );
                Collection::from_record(record)
            }
            Err(e) => Err(e.into()),
        }
    }
}
