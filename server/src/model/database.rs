use anyhow::Context;
use lib_store::{Filter, Record, RecordStore, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

use super::DATABASES_SET;

#[derive(Debug, Clone)]
pub struct Database {
    pub id: String,
    pub name: String,
    pub user: String,
}

impl Database {
    pub fn from_record(record: Record) -> AppResult<Self> {
        #[derive(Deserialize)]
        struct Fields {
            name: String,
            user: String,
        }

        let id = record.id;
        let fields: Fields = serde_json::from_value(Value::Object(record.fields))
            .context("Malformed database record")?;

        Ok(Database {
            id,
            name: fields.name,
            user: fields.user,
        })
    }
}

pub struct DatabaseCtrl;

impl DatabaseCtrl {
    pub async fn get(store: &dyn RecordStore, database_id: &str) -> AppResult<Database> {
        let record = store
            .get(DATABASES_SET, database_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::NotFound("Database not found".to_string()),
                other => other.into(),
            })?;

        Database::from_record(record)
    }

    /// Fetches the user's database by name, creating it on first use.
    pub async fn ensure(
        store: &dyn RecordStore,
        user_id: &str,
        name: &str,
    ) -> AppResult<Database> {
        let filter = Filter::new().eq("name", name).eq("user", user_id);
        match store.get_first_matching(DATABASES_SET, &filter).await {
            Ok(record) => Database::from_record(record),
            Err(StoreError::NotFound) => {
                let fields = json!({ "name": name, "user": user_id });
                let record = store
                    .create(DATABASES_SET, fields.as_object().cloned().unwrap())
                    .await?;
                tracing::info!("Database {} created for user {}", name, user_id);
                Database::from_record(record)
            }
            Err(e) => Err(e.into()),
        }
    }
}
