pub mod data_extraction;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::AppResult, model::collection::Collection};

/// Extraction result: collection name -> extracted records.
pub type ExtractedRecords = HashMap<String, Vec<Map<String, Value>>>;

/// The opaque structured-generation seam. Production uses the chat
/// completions API; tests stub it.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Extracts records for the given collections out of normalized email
    /// content. Implementations must ignore the `emails` collection and any
    /// collection without a schema, and must not invent collection names.
    async fn extract(
        &self,
        email_content: &str,
        collections: &[Collection],
    ) -> AppResult<ExtractedRecords>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ModelLength,
    Error,
    ToolCalls,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: PromptUsage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}
