//! Inbound email webhook. The shared secret in the query string is the
//! only gate; past it the reply is always 200 so the relay never retries
//! business-level outcomes.

use std::env;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    email::{
        inbound::InboundEmail,
        pipeline::{process_inbound, WebhookReply},
    },
    error::{AppError, AppJsonResult},
    ServerState,
};

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    #[serde(default)]
    pub secret: String,
}

fn verify_secret(provided: &str) -> bool {
    match env::var("INBOUND_WEBHOOK_SECRET") {
        Ok(expected) => !expected.is_empty() && provided == expected,
        Err(_) => false,
    }
}

pub async fn handler(
    State(ServerState {
        store, extractor, ..
    }): State<ServerState>,
    Query(params): Query<WebhookParams>,
    Json(payload): Json<InboundEmail>,
) -> AppJsonResult<WebhookReply> {
    if !verify_secret(&params.secret) {
        return Err(AppError::Unauthorized("Invalid webhook secret".to_string()));
    }

    tracing::info!(
        "Inbound email {} to {} from {}",
        payload.message_id,
        payload.to,
        payload.from
    );

    let reply = process_inbound(store.as_ref(), extractor.as_ref(), &payload).await;
    Ok(Json(reply))
}
