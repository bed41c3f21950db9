use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::{Filter, Record, RecordStore, Sort, StoreError, StoreResult};

/// In-memory record store with the same semantics as the HTTP backend.
/// Ids and created timestamps are deterministic so tests can rely on
/// insertion order surviving a `created` sort.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sets: HashMap<String, Vec<Record>>,
    // session token -> user record id
    tokens: HashMap<String, String>,
    next_id: u64,
}

impl Inner {
    fn timestamp(&self) -> DateTime<Utc> {
        // One second apart per record, far enough in the past to stay fixed.
        Utc.timestamp_opt(1_700_000_000 + self.next_id as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn find(&mut self, set: &str, id: &str) -> StoreResult<&mut Record> {
        self.sets
            .get_mut(set)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or(StoreError::NotFound)
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session token resolving to the given user record id.
    pub fn register_token(&self, token: &str, user_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.tokens.insert(token.to_string(), user_id.to_string());
    }

    pub fn count(&self, set: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.sets.get(set).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordStore for MemStore {
    async fn create(&self, set: &str, fields: Map<String, Value>) -> StoreResult<Record> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let now = inner.timestamp();
        let record = Record {
            id: format!("rec{:012}", inner.next_id),
            created: now,
            updated: now,
            fields,
        };
        inner
            .sets
            .entry(set.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn get(&self, set: &str, id: &str) -> StoreResult<Record> {
        let mut inner = self.inner.lock().unwrap();
        inner.find(set, id).map(|r| r.clone())
    }

    async fn get_first_matching(&self, set: &str, filter: &Filter) -> StoreResult<Record> {
        let inner = self.inner.lock().unwrap();
        inner
            .sets
            .get(set)
            .and_then(|records| records.iter().find(|r| filter.matches(r)))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_full_list(
        &self,
        set: &str,
        filter: &Filter,
        sort: Sort,
    ) -> StoreResult<Vec<Record>> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<Record> = inner
            .sets
            .get(set)
            .map(|records| records.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();

        match sort {
            Sort::Unsorted => {}
            Sort::CreatedAsc => records.sort_by(|a, b| (a.created, &a.id).cmp(&(b.created, &b.id))),
            Sort::CreatedDesc => {
                records.sort_by(|a, b| (b.created, &b.id).cmp(&(a.created, &a.id)))
            }
        }

        Ok(records)
    }

    async fn update(&self, set: &str, id: &str, patch: Map<String, Value>) -> StoreResult<Record> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let record = inner.find(set, id)?;
        for (field, value) in patch {
            record.fields.insert(field, value);
        }
        record.updated = now;
        Ok(record.clone())
    }

    async fn delete(&self, set: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let records = inner.sets.get_mut(set).ok_or(StoreError::NotFound)?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn adjust(
        &self,
        set: &str,
        id: &str,
        field: &str,
        delta: i64,
        min: i64,
        max: i64,
    ) -> StoreResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.find(set, id)?;
        let current = record.fields.get(field).and_then(Value::as_i64).unwrap_or(0);
        let next = current + delta;
        if next < min || next > max {
            return Err(StoreError::OutOfRange);
        }
        record.fields.insert(field.to_string(), json!(next));
        Ok(next)
    }

    async fn auth_refresh(&self, token: &str) -> StoreResult<Record> {
        let user_id = {
            let inner = self.inner.lock().unwrap();
            inner.tokens.get(token).cloned()
        }
        .ok_or(StoreError::Unauthorized)?;

        self.get("users", &user_id).await
    }
}
