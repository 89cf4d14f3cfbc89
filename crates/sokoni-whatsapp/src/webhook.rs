// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload types and inbound message extraction.
//!
//! The Cloud API delivers batches: one payload can carry several entries,
//! each with several changes, each with several messages. [`extract_messages`]
//! flattens the batch into normalized [`InboundMessage`]s; everything the
//! dialogue does not consume (reactions, media, stickers) is skipped with a
//! debug log rather than rejected.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sokoni_core::types::{InboundMessage, MessageContent};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Top-level webhook payload.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub statuses: Vec<DeliveryStatus>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookContact {
    pub profile: Option<ContactProfile>,
    pub wa_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactProfile {
    pub name: Option<String>,
}

/// A delivery/read receipt for a message we sent.
#[derive(Debug, Deserialize)]
pub struct DeliveryStatus {
    pub id: String,
    pub status: String,
    pub recipient_id: Option<String>,
}

/// One inbound message in transport shape.
#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub id: String,
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<TextBody>,
    pub interactive: Option<InteractiveReply>,
    pub button: Option<ButtonPayload>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveReply {
    pub button_reply: Option<ReplyRef>,
    pub list_reply: Option<ReplyRef>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRef {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ButtonPayload {
    pub payload: String,
    pub text: Option<String>,
}

/// Whether this payload belongs to a WhatsApp business account at all.
pub fn is_whatsapp_payload(payload: &WebhookPayload) -> bool {
    payload.object == "whatsapp_business_account"
}

/// Flatten a webhook payload into normalized inbound messages.
pub fn extract_messages(payload: &WebhookPayload) -> Vec<InboundMessage> {
    let mut inbound = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                continue;
            }
            let contact_name = change
                .value
                .contacts
                .first()
                .and_then(|c| c.profile.as_ref())
                .and_then(|p| p.name.clone());

            for message in &change.value.messages {
                let Some(content) = normalize(message) else {
                    debug!(
                        message_id = %message.id,
                        kind = %message.kind,
                        "skipping unsupported message type"
                    );
                    continue;
                };
                inbound.push(InboundMessage {
                    id: message.id.clone(),
                    from: message.from.clone(),
                    contact_name: contact_name.clone(),
                    content,
                });
            }
        }
    }

    inbound
}

/// Delivery receipts carried by a payload (logged by the handler).
pub fn extract_statuses(payload: &WebhookPayload) -> Vec<&DeliveryStatus> {
    payload
        .entry
        .iter()
        .flat_map(|entry| &entry.changes)
        .filter(|change| change.field == "messages")
        .flat_map(|change| &change.value.statuses)
        .collect()
}

fn normalize(message: &WebhookMessage) -> Option<MessageContent> {
    match message.kind.as_str() {
        "text" => message
            .text
            .as_ref()
            .map(|t| MessageContent::Text(t.body.trim().to_string())),
        "interactive" => {
            let interactive = message.interactive.as_ref()?;
            let reply = interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref())?;
            Some(MessageContent::Reply {
                id: reply.id.clone(),
            })
        }
        "button" => message.button.as_ref().map(|b| MessageContent::Reply {
            id: b.payload.clone(),
        }),
        _ => None,
    }
}

/// Compute the `X-Hub-Signature-256` header value for a payload body.
pub fn signature_for(app_secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook body against its `X-Hub-Signature-256` header.
///
/// Comparison is constant-time via the hmac verifier.
pub fn verify_signature(app_secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
