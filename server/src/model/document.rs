use anyhow::Context;
use chrono::{DateTime, Utc};
use lib_store::{Filter, Record, RecordStore, Sort, StoreError};
use serde_json::{json, Map, Value};

use crate::error::AppResult;

use super::DOCUMENTS_SET;

#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub user: String,
    pub database: String,
    pub collection: String,
    pub data: Map<String, Value>,
    /// Back-reference to the `emails` document this record was extracted
    /// from, when there is one.
    pub source_email: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Document {
    pub fn from_record(record: Record) -> AppResult<Self> {
        let data = record
            .field("data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let source_email = record
            .str_field("sourceEmail")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let user = record.str_field("user").unwrap_or_default().to_string();
        let database = record.str_field("database").unwrap_or_default().to_string();
        let collection = record
            .str_field("collection")
            .context("Document record missing collection")?
            .to_string();

        Ok(Document {
            id: record.id,
            user,
            database,
            collection,
            data,
            source_email,
            created: record.created,
            updated: record.updated,
        })
    }
}

pub struct DocumentCtrl;

impl DocumentCtrl {
    pub async fn insert(
        store: &dyn RecordStore,
        user_id: &str,
        database_id: &str,
        collection_id: &str,
        data: Map<String, Value>,
        source_email: Option<&str>,
    ) -> AppResult<Document> {
        let fields = json!({
            "user": user_id,
            "database": database_id,
            "collection": collection_id,
            "data": data,
            "sourceEmail": source_email.unwrap_or_default(),
        });

        let record = store
            .create(DOCUMENTS_SET, fields.as_object().cloned().unwrap())
            .await?;
        Document::from_record(record)
    }

    /// Dedup lookup: the already-ingested email with this message id, if any.
    pub async fn find_by_message_id(
        store: &dyn RecordStore,
        emails_collection_id: &str,
        message_id: &str,
    ) -> AppResult<Option<Document>> {
        let filter = Filter::new()
            .eq("collection", emails_collection_id)
            .eq("data.messageId", message_id);
        match store.get_first_matching(DOCUMENTS_SET, &filter).await {
            Ok(record) => Ok(Some(Document::from_record(record)?)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_for_collection(
        store: &dyn RecordStore,
        collection_id: &str,
        sort: Sort,
    ) -> AppResult<Vec<Document>> {
        let records = store
            .get_full_list(
                DOCUMENTS_SET,
                &Filter::new().eq("collection", collection_id),
                sort,
            )
            .await?;

        records.into_iter().map(Document::from_record).collect()
    }

    /// Deletes every document of a collection, returning how many went.
    pub async fn delete_all_in_collection(
        store: &dyn RecordStore,
        collection_id: &str,
    ) -> AppResult<usize> {
        let documents = Self::list_for_collection(store, collection_id, Sort::Unsorted).await?;
        let mut deleted = 0;
        for document in &documents {
            store.delete(DOCUMENTS_SET, &document.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}
