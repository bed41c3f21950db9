use anyhow::Context;
use lib_store::{Filter, Record, RecordStore, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    server_config::cfg,
};

use super::QUOTAS_SET;

/// Per-tenant used/total counter bounding bulk reprocessing volume.
#[derive(Debug, Clone)]
pub struct Quota {
    pub id: String,
    pub user: String,
    pub used: i64,
    pub total: i64,
}

impl Quota {
    pub fn from_record(record: Record) -> AppResult<Self> {
        #[derive(Deserialize)]
        struct Fields {
            user: String,
            #[serde(default)]
            used: i64,
            #[serde(default)]
            total: i64,
        }

        let id = record.id;
        let fields: Fields = serde_json::from_value(Value::Object(record.fields))
            .context("Malformed quota record")?;

        Ok(Quota {
            id,
            user: fields.user,
            used: fields.used,
            total: fields.total,
        })
    }
}

pub struct QuotaCtrl;

impl QuotaCtrl {
    /// Fetches the user's quota record, creating it with the default ceiling
    /// on first use.
    pub async fn ensure(store: &dyn RecordStore, user_id: &str) -> AppResult<Quota> {
        let filter = Filter::new().eq("user", user_id);
        match store.get_first_matching(QUOTAS_SET, &filter).await {
            Ok(record) => Quota::from_record(record),
            Err(StoreError::NotFound) => {
                let fields = json!({
                    "user": user_id,
                    "used": 0,
                    "total": cfg.limits.default_quota_total,
                });
                let record = store
                    .create(QUOTAS_SET, fields.as_object().cloned().unwrap())
                    .await?;
                tracing::info!(
                    "Quota created for user {} with default limit of {}",
                    user_id,
                    cfg.limits.default_quota_total
                );
                Quota::from_record(record)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Consumes one unit of quota. Fails with the distinguished exceeded
    /// error once `used` has reached `total`, leaving the counter untouched.
    pub async fn use_one(store: &dyn RecordStore, user_id: &str) -> AppResult<()> {
        let quota = Self::ensure(store, user_id).await?;
        let used = store
            .adjust(QUOTAS_SET, &quota.id, "used", 1, 0, quota.total)
            .await
            .map_err(|e| match e {
                StoreError::OutOfRange => AppError::QuotaExceeded {
                    used: quota.used,
                    total: quota.total,
                },
                other => other.into(),
            })?;

        tracing::info!("Quota used for user {}: {}/{}", user_id, used, quota.total);
        Ok(())
    }

    pub async fn status(store: &dyn RecordStore, user_id: &str) -> AppResult<Quota> {
        Self::ensure(store, user_id).await
    }

    /// Admin operation: puts the used counter back to zero.
    pub async fn reset(store: &dyn RecordStore, user_id: &str) -> AppResult<()> {
        let quota = Self::ensure(store, user_id).await?;
        store
            .update(
                QUOTAS_SET,
                &quota.id,
                json!({"used": 0}).as_object().cloned().unwrap(),
            )
            .await?;
        tracing::info!("Quota reset for user {}", user_id);
        Ok(())
    }

    /// Admin operation: replaces the ceiling.
    pub async fn set_total(store: &dyn RecordStore, user_id: &str, total: i64) -> AppResult<()> {
        let quota = Self::ensure(store, user_id).await?;
        store
            .update(
                QUOTAS_SET,
                &quota.id,
                json!({"total": total}).as_object().cloned().unwrap(),
            )
            .await?;
        tracing::info!("Quota limit updated for user {}: {}", user_id, total);
        Ok(())
    }
}
