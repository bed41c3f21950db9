use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{Filter, Record, RecordStore, Sort, StoreError, StoreResult};

/// Record store client speaking a PocketBase-style REST API
/// (`/api/collections/{set}/records`). Authenticated with a superuser token
/// held for the lifetime of the process.
pub struct HttpStore {
    base_url: String,
    admin_token: String,
    http_client: reqwest::Client,
}

const PER_PAGE: i64 = 500;

#[derive(Deserialize)]
struct ListResponse {
    #[serde(rename = "totalPages", default = "single_page")]
    total_pages: i64,
    items: Vec<Record>,
}

fn single_page() -> i64 {
    1
}

#[derive(Deserialize)]
struct AuthRefreshResponse {
    record: Record,
}

impl HttpStore {
    pub fn new(base_url: &str, admin_token: &str, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_token: admin_token.to_string(),
            http_client,
        }
    }

    fn records_url(&self, set: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, set)
    }

    fn record_url(&self, set: &str, id: &str) -> String {
        format!("{}/{}", self.records_url(set), id)
    }

    fn render_filter(filter: &Filter) -> String {
        filter
            .terms()
            .iter()
            .map(|(field, value)| match value {
                // backslashes first, so escaped quotes stay escaped
                Value::String(s) => format!(
                    "{}=\"{}\"",
                    field,
                    s.replace('\\', "\\\\").replace('"', "\\\"")
                ),
                other => format!("{}={}", field, other),
            })
            .collect::<Vec<_>>()
            .join(" && ")
    }

    fn sort_param(sort: Sort) -> Option<&'static str> {
        match sort {
            Sort::Unsorted => None,
            Sort::CreatedAsc => Some("created"),
            Sort::CreatedDesc => Some("-created"),
        }
    }

    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Backend(format!("{}: {}", status, body)))
            }
        }
    }
}

#[async_trait]
impl RecordStore for HttpStore {
    async fn create(&self, set: &str, fields: Map<String, Value>) -> StoreResult<Record> {
        let response = self
            .http_client
            .post(self.records_url(set))
            .header("Authorization", &self.admin_token)
            .json(&Value::Object(fields))
            .send()
            .await?;

        Ok(Self::check(response).await?.json::<Record>().await?)
    }

    async fn get(&self, set: &str, id: &str) -> StoreResult<Record> {
        let response = self
            .http_client
            .get(self.record_url(set, id))
            .header("Authorization", &self.admin_token)
            .send()
            .await?;

        Ok(Self::check(response).await?.json::<Record>().await?)
    }

    async fn get_first_matching(&self, set: &str, filter: &Filter) -> StoreResult<Record> {
        let response = self
            .http_client
            .get(self.records_url(set))
            .header("Authorization", &self.admin_token)
            .query(&[("filter", Self::render_filter(filter)), ("perPage", "1".to_string())])
            .send()
            .await?;

        let list = Self::check(response).await?.json::<ListResponse>().await?;
        list.items.into_iter().next().ok_or(StoreError::NotFound)
    }

    // Walks every page; the backend caps a single response at `perPage`
    // items, so one request is not the full list.
    async fn get_full_list(
        &self,
        set: &str,
        filter: &Filter,
        sort: Sort,
    ) -> StoreResult<Vec<Record>> {
        let mut base_query = vec![
            ("filter", Self::render_filter(filter)),
            ("perPage", PER_PAGE.to_string()),
        ];
        if let Some(sort) = Self::sort_param(sort) {
            base_query.push(("sort", sort.to_string()));
        }

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let mut query = base_query.clone();
            query.push(("page", page.to_string()));

            let response = self
                .http_client
                .get(self.records_url(set))
                .header("Authorization", &self.admin_token)
                .query(&query)
                .send()
                .await?;

            let list = Self::check(response).await?.json::<ListResponse>().await?;
            records.extend(list.items);
            if page >= list.total_pages.max(1) {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn update(&self, set: &str, id: &str, patch: Map<String, Value>) -> StoreResult<Record> {
        let response = self
            .http_client
            .patch(self.record_url(set, id))
            .header("Authorization", &self.admin_token)
            .json(&Value::Object(patch))
            .send()
            .await?;

        Ok(Self::check(response).await?.json::<Record>().await?)
    }

    async fn delete(&self, set: &str, id: &str) -> StoreResult<()> {
        let response = self
            .http_client
            .delete(self.record_url(set, id))
            .header("Authorization", &self.admin_token)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    // Read-then-write over HTTP; the backend's collection rules are expected
    // to enforce the same bounds so a concurrent writer cannot push the
    // counter past them. A lost increment between the read and the patch is
    // the accepted low-volume race.
    async fn adjust(
        &self,
        set: &str,
        id: &str,
        field: &str,
        delta: i64,
        min: i64,
        max: i64,
    ) -> StoreResult<i64> {
        let record = self.get(set, id).await?;
        let current = record.int_field(field).unwrap_or(0);
        let next = current + delta;
        if next < min || next > max {
            return Err(StoreError::OutOfRange);
        }

        let mut patch = Map::new();
        patch.insert(field.to_string(), json!(next));
        self.update(set, id, patch).await?;
        Ok(next)
    }

    async fn auth_refresh(&self, token: &str) -> StoreResult<Record> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/collections/users/auth-refresh",
                self.base_url
            ))
            .header("Authorization", token)
            .send()
            .await?;

        let auth = Self::check(response)
            .await?
            .json::<AuthRefreshResponse>()
            .await?;
        Ok(auth.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_filter() {
        let filter = Filter::new()
            .eq("name", "emails")
            .eq("database", "db123")
            .eq("used", 3);
        assert_eq!(
            HttpStore::render_filter(&filter),
            r#"name="emails" && database="db123" && used=3"#
        );
    }

    #[test]
    fn test_render_filter_escapes_quotes() {
        let filter = Filter::new().eq("data.messageId", "a\"b");
        assert_eq!(
            HttpStore::render_filter(&filter),
            r#"data.messageId="a\"b""#
        );
    }

    #[test]
    fn test_render_filter_escapes_backslashes() {
        // a trailing backslash must not swallow the closing quote
        let filter = Filter::new().eq("data.messageId", "m1\\");
        assert_eq!(HttpStore::render_filter(&filter), r#"data.messageId="m1\\""#);

        let filter = Filter::new().eq("data.messageId", "a\\\"b");
        assert_eq!(
            HttpStore::render_filter(&filter),
            r#"data.messageId="a\\\"b""#
        );
    }

    /// Serves one canned response per expected request, asserting each
    /// request line contains the expected substring.
    async fn serve_pages(
        listener: tokio::net::TcpListener,
        pages: Vec<(&'static str, String)>,
    ) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        for (expected, body) in pages {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
                if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            assert!(request.contains(expected), "unexpected request: {request}");

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        }
    }

    fn record_json(id: &str) -> String {
        format!(
            r#"{{"id":"{id}","created":"2024-05-01T00:00:01Z","updated":"2024-05-01T00:00:01Z"}}"#
        )
    }

    #[tokio::test]
    async fn test_get_full_list_walks_every_page() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pages = vec![
            (
                "page=1",
                format!(
                    r#"{{"page":1,"totalPages":2,"items":[{},{}]}}"#,
                    record_json("r1"),
                    record_json("r2")
                ),
            ),
            (
                "page=2",
                format!(r#"{{"page":2,"totalPages":2,"items":[{}]}}"#, record_json("r3")),
            ),
        ];
        let server = tokio::spawn(serve_pages(listener, pages));

        let store = HttpStore::new(
            &format!("http://{}", addr),
            "token",
            reqwest::Client::new(),
        );
        let records = store
            .get_full_list("documents", &Filter::new(), Sort::CreatedAsc)
            .await
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_full_list_single_page() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pages = vec![(
            "page=1",
            format!(r#"{{"page":1,"totalPages":1,"items":[{}]}}"#, record_json("r1")),
        )];
        let server = tokio::spawn(serve_pages(listener, pages));

        let store = HttpStore::new(
            &format!("http://{}", addr),
            "token",
            reqwest::Client::new(),
        );
        let records = store
            .get_full_list("documents", &Filter::new(), Sort::Unsorted)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        server.await.unwrap();
    }
}
