//! Seeds a fresh database with the canonical `emails` collection and a set
//! of starter collections. Refuses to touch a database that already has
//! collections.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppJsonResult},
    model::{
        collection::{starter_collections, CollectionCtrl},
        database::DatabaseCtrl,
        user::UserCtrl,
    },
    ServerState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickstartParams {
    pub database_id: String,
    pub token: String,
}

pub async fn handler(
    State(ServerState { store, .. }): State<ServerState>,
    Json(params): Json<KickstartParams>,
) -> AppJsonResult<Value> {
    let user = UserCtrl::from_token(store.as_ref(), &params.token).await?;
    let database = DatabaseCtrl::get(store.as_ref(), &params.database_id).await?;
    if database.user != user.id {
        return Err(AppError::Forbidden(
            "Database does not belong to this user".to_string(),
        ));
    }

    let existing = CollectionCtrl::get_for_database(store.as_ref(), &database.id).await?;
    if !existing.is_empty() {
        return Err(AppError::BadRequest(
            "Database already has collections. Please delete them first.".to_string(),
        ));
    }

    CollectionCtrl::ensure_emails_collection(store.as_ref(), &user.id, &database.id).await?;
    for (name, fields, description) in starter_collections() {
        CollectionCtrl::create(
            store.as_ref(),
            &user.id,
            &database.id,
            name,
            &fields,
            Some(description),
        )
        .await?;
    }

    tracing::info!(
        "Database {} kickstarted for user {}",
        database.name,
        user.username
    );
    Ok(Json(json!({"success": true})))
}
