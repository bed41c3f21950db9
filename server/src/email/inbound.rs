//! Inbound webhook payload as the mail relay posts it (Postmark shape,
//! PascalCase keys). Unknown keys are ignored and missing ones default so a
//! partial relay payload still routes.

use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InboundEmail {
    #[serde(rename = "MessageID")]
    pub message_id: String,
    pub from: String,
    pub from_name: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub reply_to: String,
    pub subject: String,
    pub date: String,
    pub mailbox_hash: String,
    pub text_body: String,
    pub html_body: String,
    pub stripped_text_reply: String,
    pub tag: String,
    pub headers: Vec<EmailHeader>,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EmailHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EmailAttachment {
    pub name: String,
    pub content_type: String,
    pub content_length: i64,
    #[serde(rename = "ContentID")]
    pub content_id: String,
}

impl InboundEmail {
    /// The canonical fields stored as the `emails` document's data.
    pub fn canonical_fields(&self) -> Map<String, Value> {
        json!({
            "messageId": self.message_id,
            "from": self.from,
            "subject": self.subject,
            "htmlBody": self.html_body,
            "textBody": self.text_body,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    /// Attachments are logged but not stored.
    pub fn log_attachments(&self) {
        if self.attachments.is_empty() {
            return;
        }
        tracing::info!(
            "Email {} has {} attachment(s)",
            self.message_id,
            self.attachments.len()
        );
        for attachment in &self.attachments {
            tracing::info!(
                "Attachment: name={}, contentType={}, contentLength={}",
                attachment.name,
                attachment.content_type,
                attachment.content_length
            );
        }
    }
}
