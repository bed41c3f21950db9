//! One pass of the live ingestion pipeline per inbound webhook delivery.
//!
//! Routing failures never surface as transport errors: the mail relay
//! retries on non-2xx, so every business outcome short of a bad shared
//! secret is converted to a success-shaped reply at the single
//! [`process_inbound`] boundary.

use lib_store::RecordStore;
use serde::Serialize;

use crate::{
    email::{address, content::email_content, inbound::InboundEmail},
    error::{AppError, AppResult},
    model::{
        collection::{Collection, CollectionCtrl},
        database::DatabaseCtrl,
        document::DocumentCtrl,
        user::UserCtrl,
    },
    prompt::StructuredExtractor,
};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insufficient_balance: Option<bool>,
}

impl WebhookReply {
    fn ok(message: impl Into<String>) -> Self {
        WebhookReply {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    fn ok_with_id(message: impl Into<String>, message_id: &str) -> Self {
        WebhookReply {
            success: true,
            message: Some(message.into()),
            message_id: Some(message_id.to_string()),
            ..Default::default()
        }
    }
}

/// Runs the pipeline and normalizes any uncaught error into a
/// `{success: false, error}` reply. The webhook handler always answers 200
/// with whatever this returns.
pub async fn process_inbound(
    store: &dyn RecordStore,
    extractor: &dyn StructuredExtractor,
    payload: &InboundEmail,
) -> WebhookReply {
    match run(store, extractor, payload).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(
                "Error processing inbound email {}: {:?}",
                payload.message_id,
                e
            );
            WebhookReply {
                success: false,
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

async fn run(
    store: &dyn RecordStore,
    extractor: &dyn StructuredExtractor,
    payload: &InboundEmail,
) -> AppResult<WebhookReply> {
    payload.log_attachments();

    let username = address::username_from_address(&payload.to);
    let user = match UserCtrl::get_by_username(store, &username).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            tracing::error!("No tenant for recipient {}, dropping email", payload.to);
            return Ok(WebhookReply::ok("unknown recipient, nothing ingested"));
        }
        Err(e) => return Err(e),
    };

    let database_name = address::database_from_address(&payload.to);
    if database_name.is_empty() {
        tracing::error!(
            "No database segment in recipient {}, dropping email",
            payload.to
        );
        return Ok(WebhookReply::ok("unroutable recipient, nothing ingested"));
    }

    let database = DatabaseCtrl::ensure(store, &user.id, &database_name).await?;
    let emails = CollectionCtrl::ensure_emails_collection(store, &user.id, &database.id).await?;

    // at-least-once delivery from the relay: replay of a known message id is
    // acknowledged without touching anything
    if DocumentCtrl::find_by_message_id(store, &emails.id, &payload.message_id)
        .await?
        .is_some()
    {
        tracing::info!("Email {} already ingested, skipping", payload.message_id);
        return Ok(WebhookReply::ok_with_id(
            "email already processed",
            &payload.message_id,
        ));
    }

    let email_doc = DocumentCtrl::insert(
        store,
        &user.id,
        &database.id,
        &emails.id,
        payload.canonical_fields(),
        None,
    )
    .await?;

    // the credit debit must land before any extraction attempt
    match UserCtrl::debit_credit(store, &user.id).await {
        Ok(remaining) => {
            tracing::info!("Credit debited for {}: {} remaining", user.username, remaining)
        }
        Err(AppError::InsufficientCredits) => {
            tracing::warn!(
                "Insufficient balance for {}, email {} stored without extraction",
                user.username,
                payload.message_id
            );
            return Ok(WebhookReply {
                success: true,
                message: Some("insufficient balance, extraction skipped".to_string()),
                message_id: Some(payload.message_id.clone()),
                insufficient_balance: Some(true),
                ..Default::default()
            });
        }
        Err(e) => return Err(e),
    }

    let Some(content) = email_content(&payload.html_body, &payload.text_body) else {
        tracing::info!("Email {} has no content, nothing to extract", payload.message_id);
        return Ok(WebhookReply::ok_with_id(
            "email stored, no content to extract",
            &payload.message_id,
        ));
    };

    let collections = CollectionCtrl::get_for_database(store, &database.id).await?;
    let eligible: Vec<Collection> = collections
        .into_iter()
        .filter(|c| !c.is_emails() && c.has_schema())
        .collect();
    if eligible.is_empty() {
        tracing::info!(
            "No collections with schemas in database {}, skipping extraction",
            database.name
        );
        return Ok(WebhookReply::ok_with_id(
            "email stored, no collections with schemas",
            &payload.message_id,
        ));
    }

    let extracted = match extractor.extract(&content, &eligible).await {
        Ok(extracted) => extracted,
        Err(e) => {
            // the email itself is already stored; extraction failure is not
            // a delivery failure
            tracing::error!(
                "Extraction failed for email {}: {:?}",
                payload.message_id,
                e
            );
            return Ok(WebhookReply::ok_with_id(
                "email stored, extraction failed",
                &payload.message_id,
            ));
        }
    };

    let inserted = persist_extracted(
        store,
        &user.id,
        &database.id,
        &eligible,
        &extracted,
        &email_doc.id,
    )
    .await;

    Ok(WebhookReply::ok_with_id(
        format!("email processed, {} documents extracted", inserted),
        &payload.message_id,
    ))
}

/// Inserts extracted records into their pre-existing collections. Failures
/// are logged per document and never abort sibling inserts.
pub(crate) async fn persist_extracted(
    store: &dyn RecordStore,
    user_id: &str,
    database_id: &str,
    collections: &[Collection],
    extracted: &crate::prompt::ExtractedRecords,
    source_email_id: &str,
) -> usize {
    let mut inserted = 0;
    for (name, records) in extracted {
        if records.is_empty() {
            continue;
        }
        let Some(collection) = collections.iter().find(|c| &c.name == name) else {
            tracing::warn!("Extractor returned unknown collection {}, skipping", name);
            continue;
        };
        for record in records {
            match DocumentCtrl::insert(
                store,
                user_id,
                database_id,
                &collection.id,
                record.clone(),
                Some(source_email_id),
            )
            .await
            {
                Ok(_) => inserted += 1,
                Err(e) => {
                    tracing::error!(
                        "Error inserting extracted document into {}: {:?}",
                        name,
                        e
                    );
                }
            }
        }
    }
    inserted
}
