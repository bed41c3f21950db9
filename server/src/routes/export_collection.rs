use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use lib_store::Sort;
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    export::generate_csv,
    model::{collection::CollectionCtrl, document::DocumentCtrl, user::UserCtrl},
    ServerState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub collection_id: String,
    pub database_id: String,
    pub token: String,
}

pub async fn handler(
    State(ServerState { store, .. }): State<ServerState>,
    Json(params): Json<ExportParams>,
) -> AppResult<Response> {
    let user = UserCtrl::from_token(store.as_ref(), &params.token).await?;
    let collection = CollectionCtrl::get_by_id(store.as_ref(), &params.collection_id).await?;
    if collection.user != user.id || collection.database != params.database_id {
        return Err(AppError::Forbidden(
            "Collection does not belong to this user".to_string(),
        ));
    }

    let documents =
        DocumentCtrl::list_for_collection(store.as_ref(), &collection.id, Sort::CreatedAsc)
            .await?;
    if documents.is_empty() {
        return Err(AppError::BadRequest("No data to export".to_string()));
    }

    let csv = generate_csv(&documents, &collection);
    let filename = format!("{}-{}.csv", collection.name, Utc::now().format("%Y-%m-%d"));
    tracing::info!(
        "Exported {} documents from collection {} for user {}",
        documents.len(),
        collection.name,
        user.username
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{FieldSpec, FieldType},
        testing::common::{seed_collection, seed_database, seed_tenant, server_state},
    };
    use axum::extract::State;
    use serde_json::json;

    #[tokio::test]
    async fn test_export_returns_csv_attachment() {
        let (state, store) = server_state();
        let user_id = seed_tenant(&store, "alice", 5).await;
        let db_id = seed_database(&store, &user_id, "notes").await;
        let col_id = seed_collection(
            &store,
            &user_id,
            &db_id,
            "tasks",
            &[FieldSpec::new("title", FieldType::String, "Title")],
            None,
        )
        .await;
        DocumentCtrl::insert(
            &*store,
            &user_id,
            &db_id,
            &col_id,
            json!({"title": "Buy milk"}).as_object().cloned().unwrap(),
            None,
        )
        .await
        .unwrap();

        let params = ExportParams {
            collection_id: col_id,
            database_id: db_id,
            token: "tok-alice".to_string(),
        };
        let response = handler(State(state), Json(params)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"tasks-"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("id,created,updated,title\r\n"));
        assert!(body.contains("Buy milk"));
    }

    #[tokio::test]
    async fn test_export_empty_collection_is_rejected() {
        let (state, store) = server_state();
        let user_id = seed_tenant(&store, "alice", 5).await;
        let db_id = seed_database(&store, &user_id, "notes").await;
        let col_id = seed_collection(
            &store,
            &user_id,
            &db_id,
            "tasks",
            &[FieldSpec::new("title", FieldType::String, "Title")],
            None,
        )
        .await;

        let params = ExportParams {
            collection_id: col_id,
            database_id: db_id,
            token: "tok-alice".to_string(),
        };
        let err = handler(State(state), Json(params)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_export_checks_database_binding() {
        let (state, store) = server_state();
        let user_id = seed_tenant(&store, "alice", 5).await;
        let db_id = seed_database(&store, &user_id, "notes").await;
        let other_db = seed_database(&store, &user_id, "work").await;
        let col_id = seed_collection(
            &store,
            &user_id,
            &db_id,
            "tasks",
            &[FieldSpec::new("title", FieldType::String, "Title")],
            None,
        )
        .await;

        // right collection, wrong database
        let params = ExportParams {
            collection_id: col_id,
            database_id: other_db,
            token: "tok-alice".to_string(),
        };
        let err = handler(State(state), Json(params)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
