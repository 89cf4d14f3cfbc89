// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API client implementing [`OutboundGateway`].
//!
//! Owns the transport-imposed payload limits: at most 3 buttons with
//! 20-char titles, at most 10 list rows with 24-char titles and 72-char
//! descriptions, 1024-char image captions. When the channel is configured
//! non-interactive, button and list messages degrade to numbered plain
//! text so the dialogue keeps working on transports without structured
//! messages.

use async_trait::async_trait;
use serde_json::{json, Value};
use sokoni_config::WhatsAppConfig;
use sokoni_core::types::{ButtonOption, ListSection, MessageId};
use sokoni_core::{OutboundGateway, SokoniError};
use tracing::debug;

const MAX_BUTTONS: usize = 3;
const MAX_BUTTON_TITLE: usize = 20;
const MAX_LIST_ROWS: usize = 10;
const MAX_ROW_TITLE: usize = 24;
const MAX_ROW_DESCRIPTION: usize = 72;
const MAX_CAPTION: usize = 1024;

/// Outbound gateway over the Graph API `/{phone_number_id}/messages` endpoint.
pub struct WhatsAppClient {
    http: reqwest::Client,
    messages_url: String,
    access_token: String,
    interactive: bool,
}

impl WhatsAppClient {
    /// Builds a client from config. Requires `access_token` and
    /// `phone_number_id` to be set and non-empty.
    pub fn new(config: &WhatsAppConfig) -> Result<Self, SokoniError> {
        let access_token = config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SokoniError::Config("whatsapp.access_token is required for the WhatsApp adapter".into())
            })?;
        let phone_number_id = config
            .phone_number_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                SokoniError::Config("whatsapp.phone_number_id is required for the WhatsApp adapter".into())
            })?;

        let messages_url = format!(
            "{}/{}/messages",
            config.api_base.trim_end_matches('/'),
            phone_number_id
        );

        Ok(Self {
            http: reqwest::Client::new(),
            messages_url,
            access_token: access_token.to_string(),
            interactive: config.interactive,
        })
    }

    async fn post(&self, payload: Value) -> Result<Value, SokoniError> {
        debug!(url = %self.messages_url, "posting cloud api payload");

        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SokoniError::Send {
                message: format!("cloud api request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(SokoniError::Send {
                message: format!("cloud api returned {status}: {body}"),
                source: None,
            });
        }
        Ok(body)
    }

    fn sent_message_id(body: &Value) -> MessageId {
        let id = body
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("id"))
            .and_then(|id| id.as_str())
            .unwrap_or_default();
        MessageId(id.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Plain-text rendition of a button prompt for non-interactive transports.
fn degrade_buttons(body: &str, buttons: &[ButtonOption]) -> String {
    let mut text = format!("{body}\n\n");
    for (index, button) in buttons.iter().take(MAX_BUTTONS).enumerate() {
        text.push_str(&format!("{}. {} (reply: {})\n", index + 1, button.title, button.id));
    }
    text
}

/// Plain-text rendition of a list prompt for non-interactive transports.
fn degrade_list(body: &str, sections: &[ListSection]) -> String {
    let mut text = format!("{body}\n\n");
    let mut index = 0usize;
    for section in sections {
        for row in &section.rows {
            if index >= MAX_LIST_ROWS {
                return text;
            }
            index += 1;
            text.push_str(&format!("{}. {} (reply: {})\n", index, row.title, row.id));
        }
    }
    text
}

#[async_trait]
impl OutboundGateway for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageId, SokoniError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": false, "body": body },
        });
        let response = self.post(payload).await?;
        Ok(Self::sent_message_id(&response))
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<MessageId, SokoniError> {
        if !self.interactive {
            return self.send_text(to, &degrade_buttons(body, buttons)).await;
        }

        let buttons: Vec<Value> = buttons
            .iter()
            .take(MAX_BUTTONS)
            .map(|button| {
                json!({
                    "type": "reply",
                    "reply": {
                        "id": button.id,
                        "title": truncate(&button.title, MAX_BUTTON_TITLE),
                    },
                })
            })
            .collect();

        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": body },
                "action": { "buttons": buttons },
            },
        });
        let response = self.post(payload).await?;
        Ok(Self::sent_message_id(&response))
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        sections: &[ListSection],
        header: Option<&str>,
        footer: Option<&str>,
    ) -> Result<MessageId, SokoniError> {
        if !self.interactive {
            return self.send_text(to, &degrade_list(body, sections)).await;
        }

        // The 10-row cap applies across all sections combined.
        let mut remaining = MAX_LIST_ROWS;
        let sections: Vec<Value> = sections
            .iter()
            .map(|section| {
                let rows: Vec<Value> = section
                    .rows
                    .iter()
                    .take(remaining)
                    .map(|row| {
                        json!({
                            "id": row.id,
                            "title": truncate(&row.title, MAX_ROW_TITLE),
                            "description": row
                                .description
                                .as_deref()
                                .map(|d| truncate(d, MAX_ROW_DESCRIPTION)),
                        })
                    })
                    .collect();
                remaining = remaining.saturating_sub(rows.len());
                json!({ "title": section.title, "rows": rows })
            })
            .collect();

        let mut interactive = json!({
            "type": "list",
            "body": { "text": body },
            "action": { "button": button, "sections": sections },
        });
        if let Some(header) = header {
            interactive["header"] = json!({ "type": "text", "text": header });
        }
        if let Some(footer) = footer {
            interactive["footer"] = json!({ "text": footer });
        }

        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "interactive",
            "interactive": interactive,
        });
        let response = self.post(payload).await?;
        Ok(Self::sent_message_id(&response))
    }

    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<MessageId, SokoniError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "image",
            "image": {
                "link": image_url,
                "caption": truncate(caption, MAX_CAPTION),
            },
        });
        let response = self.post(payload).await?;
        Ok(Self::sent_message_id(&response))
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SokoniError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });
        self.post(payload).await?;
        Ok(())
    }
}
