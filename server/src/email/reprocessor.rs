//! Bulk replay of a database's stored emails through extraction.
//!
//! The run wipes every extracted collection first, then replays the
//! `emails` collection oldest-first. Each replayed email consumes one unit
//! of quota; once the quota is exhausted the run stops early and reports
//! how many emails it left behind.

use lib_store::{RecordStore, Sort};
use serde::Serialize;
use serde_json::Value;

use crate::{
    email::{content::email_content, pipeline::persist_extracted},
    error::{AppError, AppResult},
    model::{
        collection::{Collection, CollectionCtrl},
        database::DatabaseCtrl,
        document::{Document, DocumentCtrl},
        quota::QuotaCtrl,
        user::User,
    },
    prompt::StructuredExtractor,
};

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessSummary {
    pub processed_emails: usize,
    pub extracted_documents: usize,
    pub total_emails: usize,
    pub skipped_quota_count: usize,
}

pub async fn reprocess_database(
    store: &dyn RecordStore,
    extractor: &dyn StructuredExtractor,
    user: &User,
    database_id: &str,
) -> AppResult<ReprocessSummary> {
    let database = DatabaseCtrl::get(store, database_id).await?;
    if database.user != user.id {
        return Err(AppError::Forbidden(
            "Database does not belong to this user".to_string(),
        ));
    }

    let collections = CollectionCtrl::get_for_database(store, database_id).await?;
    let emails = collections
        .iter()
        .find(|c| c.is_emails())
        .ok_or_else(|| AppError::NotFound("Database has no emails collection".to_string()))?
        .clone();
    let targets: Vec<Collection> = collections
        .into_iter()
        .filter(|c| !c.is_emails())
        .collect();

    // extracted collections start empty so the replay fully rebuilds them
    for collection in &targets {
        let deleted = DocumentCtrl::delete_all_in_collection(store, &collection.id).await?;
        tracing::info!(
            "Cleared {} documents from collection {} before reprocessing",
            deleted,
            collection.name
        );
    }

    let eligible: Vec<Collection> = targets.into_iter().filter(|c| c.has_schema()).collect();

    let email_docs =
        DocumentCtrl::list_for_collection(store, &emails.id, Sort::CreatedAsc).await?;

    let mut summary = ReprocessSummary {
        total_emails: email_docs.len(),
        ..Default::default()
    };

    for (index, email_doc) in email_docs.iter().enumerate() {
        match QuotaCtrl::use_one(store, &user.id).await {
            Ok(()) => {}
            Err(AppError::QuotaExceeded { used, total }) => {
                summary.skipped_quota_count = email_docs.len() - index;
                tracing::warn!(
                    "Quota exhausted for user {} ({}/{}), skipping {} remaining emails",
                    user.username,
                    used,
                    total,
                    summary.skipped_quota_count
                );
                break;
            }
            Err(e) => return Err(e),
        }

        match replay_email(store, extractor, user, database_id, &eligible, email_doc).await {
            Ok(Some(extracted)) => {
                summary.processed_emails += 1;
                summary.extracted_documents += extracted;
            }
            Ok(None) => {
                // no content: quota spent, nothing processed
            }
            Err(e) => {
                tracing::error!("Error reprocessing email {}: {:?}", email_doc.id, e);
            }
        }
    }

    tracing::info!(
        "Reprocessed database {}: {}/{} emails, {} documents extracted, {} skipped",
        database.name,
        summary.processed_emails,
        summary.total_emails,
        summary.extracted_documents,
        summary.skipped_quota_count
    );
    Ok(summary)
}

/// Replays a single stored email. Returns `None` when the email carries no
/// content and `Some(inserted)` otherwise.
async fn replay_email(
    store: &dyn RecordStore,
    extractor: &dyn StructuredExtractor,
    user: &User,
    database_id: &str,
    eligible: &[Collection],
    email_doc: &Document,
) -> AppResult<Option<usize>> {
    let html_body = email_doc
        .data
        .get("htmlBody")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let text_body = email_doc
        .data
        .get("textBody")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let Some(content) = email_content(html_body, text_body) else {
        tracing::info!("Stored email {} has no content, skipping", email_doc.id);
        return Ok(None);
    };

    if eligible.is_empty() {
        return Ok(Some(0));
    }

    let extracted = extractor.extract(&content, eligible).await?;
    let inserted = persist_extracted(
        store,
        &user.id,
        database_id,
        eligible,
        &extracted,
        &email_doc.id,
    )
    .await;

    Ok(Some(inserted))
}
