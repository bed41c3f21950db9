//! Client library for the record store backing the server.
//!
//! The store is an external service holding named record sets (`users`,
//! `databases`, `collections`, `documents`, `quotas`). Everything the server
//! needs from it goes through the [`RecordStore`] trait so request handlers
//! and pipelines can be tested against [`MemStore`] while production uses
//! [`HttpStore`].

mod http_store;
mod mem_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use http_store::HttpStore;
pub use mem_store::MemStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// One record in a record set. Everything beyond the id and the server-side
/// timestamps is carried as flattened JSON fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Looks up a field by name, following dots into nested objects
    /// (`data.messageId`).
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn str_field(&self, path: &str) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }

    pub fn int_field(&self, path: &str) -> Option<i64> {
        self.field(path).and_then(Value::as_i64)
    }
}

#[derive(Debug, Display)]
pub enum StoreError {
    #[display("record not found")]
    NotFound,
    #[display("unauthorized")]
    Unauthorized,
    #[display("value out of range")]
    OutOfRange,
    #[display("store backend error: {_0}")]
    Backend(String),
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

/// Conjunction of field = value terms. Field names may use dotted paths into
/// nested JSON objects.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    terms: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    pub fn terms(&self) -> &[(String, Value)] {
        &self.terms
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| record.field(field) == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Unsorted,
    CreatedAsc,
    CreatedDesc,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, set: &str, fields: Map<String, Value>) -> StoreResult<Record>;

    async fn get(&self, set: &str, id: &str) -> StoreResult<Record>;

    /// First record matching the filter, or `StoreError::NotFound`.
    async fn get_first_matching(&self, set: &str, filter: &Filter) -> StoreResult<Record>;

    async fn get_full_list(&self, set: &str, filter: &Filter, sort: Sort)
        -> StoreResult<Vec<Record>>;

    async fn update(&self, set: &str, id: &str, patch: Map<String, Value>) -> StoreResult<Record>;

    async fn delete(&self, set: &str, id: &str) -> StoreResult<()>;

    /// Applies `delta` to an integer counter field, failing with
    /// `StoreError::OutOfRange` when the result would leave `[min, max]`.
    /// Returns the new value. This is the seam where counter atomicity is
    /// pushed down into the store.
    async fn adjust(
        &self,
        set: &str,
        id: &str,
        field: &str,
        delta: i64,
        min: i64,
        max: i64,
    ) -> StoreResult<i64>;

    /// Validates a user session token and returns the authenticated user
    /// record.
    async fn auth_refresh(&self, token: &str) -> StoreResult<Record>;
}
