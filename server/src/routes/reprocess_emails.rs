use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    email::reprocessor::{reprocess_database, ReprocessSummary},
    error::AppJsonResult,
    model::user::UserCtrl,
    ServerState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessParams {
    pub database_id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: ReprocessSummary,
}

pub async fn handler(
    State(ServerState {
        store, extractor, ..
    }): State<ServerState>,
    Json(params): Json<ReprocessParams>,
) -> AppJsonResult<ReprocessResponse> {
    let user = UserCtrl::from_token(store.as_ref(), &params.token).await?;
    let summary = reprocess_database(
        store.as_ref(),
        extractor.as_ref(),
        &user,
        &params.database_id,
    )
    .await?;

    Ok(Json(ReprocessResponse {
        success: true,
        summary,
    }))
}
