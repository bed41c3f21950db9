use anyhow::Context;
use lib_store::{Filter, Record, RecordStore, StoreError};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

use super::USERS_SET;

/// Tenant record. `credits` is the decrementing balance gating live
/// ingestion.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub credits: i64,
}

impl User {
    pub fn from_record(record: Record) -> AppResult<Self> {
        #[derive(Deserialize)]
        struct Fields {
            #[serde(default)]
            email: String,
            username: String,
            #[serde(default)]
            credits: i64,
        }

        let id = record.id;
        let fields: Fields = serde_json::from_value(Value::Object(record.fields))
            .context("Malformed user record")?;

        Ok(User {
            id,
            email: fields.email,
            username: fields.username,
            credits: fields.credits,
        })
    }
}

pub struct UserCtrl;

impl UserCtrl {
    pub async fn get_by_username(store: &dyn RecordStore, username: &str) -> AppResult<User> {
        let record = store
            .get_first_matching(USERS_SET, &Filter::new().eq("username", username))
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::NotFound("User not found".to_string()),
                other => other.into(),
            })?;

        User::from_record(record)
    }

    pub async fn get_by_id(store: &dyn RecordStore, user_id: &str) -> AppResult<User> {
        let record = store.get(USERS_SET, user_id).await.map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("User not found".to_string()),
            other => other.into(),
        })?;

        User::from_record(record)
    }

    /// Resolves a session token to its user via the store's auth refresh.
    pub async fn from_token(store: &dyn RecordStore, token: &str) -> AppResult<User> {
        let record = store.auth_refresh(token).await.map_err(|e| match e {
            StoreError::Unauthorized | StoreError::NotFound => {
                AppError::Unauthorized("Invalid token".to_string())
            }
            other => other.into(),
        })?;

        User::from_record(record)
    }

    /// Atomically takes one credit from the user's balance, failing with
    /// `InsufficientCredits` at the floor of zero. Must run before any
    /// extraction attempt for an email.
    pub async fn debit_credit(store: &dyn RecordStore, user_id: &str) -> AppResult<i64> {
        store
            .adjust(USERS_SET, user_id, "credits", -1, 0, i64::MAX)
            .await
            .map_err(|e| match e {
                StoreError::OutOfRange => AppError::InsufficientCredits,
                other => other.into(),
            })
    }
}
