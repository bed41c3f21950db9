use anyhow::{anyhow, Context};
use async_trait::async_trait;
use indoc::formatdoc;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    model::collection::Collection,
    schema::{eligible_collections, extraction_schema},
    server_config::cfg,
    HttpClient,
};

use super::{ChatApiResponseOrError, ExtractedRecords, StructuredExtractor};

fn system_prompt() -> String {
    formatdoc! {r#"
        You are a careful assistant that extracts structured records from emails.
        You will be given a set of collections, each with a name, an optional description of what to collect, and a list of fields.
        Populate only the collections and fields defined below; never invent new collections or fields.
        Every field is optional: omit a field when the email does not provide it.
        Respond only with a JSON object whose keys are collection names and whose values are arrays of records. Do not provide explanations."#}
}

fn collections_prompt(collections: &[&Collection]) -> String {
    let mut lines = Vec::new();
    for collection in collections {
        match &collection.description {
            Some(description) => {
                lines.push(format!("Collection \"{}\": {}", collection.name, description))
            }
            None => lines.push(format!("Collection \"{}\":", collection.name)),
        }
        for (name, stored) in &collection.doc_data_schema {
            let field_type = crate::schema::stored_field_type(stored);
            match &stored.description {
                Some(description) => {
                    lines.push(format!("  - {} ({}): {}", name, field_type, description))
                }
                None => lines.push(format!("  - {} ({})", name, field_type)),
            }
        }
    }
    lines.join("\n")
}

fn user_prompt(email_content: &str, collections: &[&Collection]) -> String {
    formatdoc! {r#"
        Extract all matching data from the email content between the <EMAIL_CONTENT> tags into the collections defined here:
        {collections}

        <EMAIL_CONTENT>{email_content}</EMAIL_CONTENT>"#,
    collections = collections_prompt(collections)}
}

fn parse_extracted(content: &str) -> AppResult<ExtractedRecords> {
    let value: Value =
        serde_json::from_str(content).context("Extractor returned non-JSON content")?;
    let Value::Object(map) = value else {
        return Err(anyhow!("Extractor returned a non-object payload: {}", content).into());
    };

    let mut records = ExtractedRecords::new();
    for (name, value) in map {
        let Value::Array(items) = value else { continue };
        let rows: Vec<_> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect();
        records.insert(name, rows);
    }
    Ok(records)
}

/// Extraction over an OpenRouter-compatible chat completions endpoint,
/// constrained to the combined schema of the target collections.
pub struct LlmExtractor {
    http_client: HttpClient,
}

impl LlmExtractor {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    async fn extract(
        &self,
        email_content: &str,
        collections: &[Collection],
    ) -> AppResult<ExtractedRecords> {
        let eligible = eligible_collections(collections);
        let Some(schema) = extraction_schema(&eligible) else {
            // nothing to constrain against, skip the call entirely
            return Ok(ExtractedRecords::new());
        };

        let resp = self
            .http_client
            .post(&cfg.api.endpoint)
            .bearer_auth(&cfg.api.key)
            .json(&json!(
              {
                "model": &cfg.model.id,
                "temperature": cfg.model.temperature,
                "messages": [
                  {
                    "role": "system",
                    "content": system_prompt()
                  },
                  {
                    "role": "user",
                    "content": user_prompt(email_content, &eligible)
                  }
                ],
                "response_format": {
                  "type": "json_schema",
                  "json_schema": {
                    "name": "email_extraction",
                    "schema": schema
                  }
                }
              }
            ))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| {
                if let Some(status) = e.status() {
                    match status {
                        StatusCode::BAD_REQUEST => AppError::BadRequest(e.to_string()),
                        StatusCode::REQUEST_TIMEOUT => AppError::RequestTimeout,
                        StatusCode::TOO_MANY_REQUESTS => AppError::TooManyRequests,
                        _ => AppError::Internal(e.into()),
                    }
                } else {
                    AppError::Internal(e.into())
                }
            })?;

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(resp.clone())
            .context(format!("Could not parse chat response: {}", resp))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => {
                return Err(anyhow!("Chat API error: {:?}", error).into());
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        let choice = parsed.choices.first().context("No choices in response")?;
        parse_extracted(&choice.message.content)
    }
}
