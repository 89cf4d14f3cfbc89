// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock outbound gateway for deterministic testing.
//!
//! `MockGateway` implements `OutboundGateway` with captured outbound
//! messages for assertion in tests, and a switch to simulate transport
//! failures.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use sokoni_core::types::{ButtonOption, ListSection, MessageId};
use sokoni_core::{OutboundGateway, SokoniError};

/// One captured outbound message.
#[derive(Debug, Clone)]
pub enum SentMessage {
    Text {
        to: String,
        body: String,
    },
    Buttons {
        to: String,
        body: String,
        buttons: Vec<ButtonOption>,
    },
    List {
        to: String,
        body: String,
        button: String,
        sections: Vec<ListSection>,
        header: Option<String>,
        footer: Option<String>,
    },
    Image {
        to: String,
        image_url: String,
        caption: String,
    },
}

impl SentMessage {
    /// Recipient of this message.
    pub fn to(&self) -> &str {
        match self {
            SentMessage::Text { to, .. }
            | SentMessage::Buttons { to, .. }
            | SentMessage::List { to, .. }
            | SentMessage::Image { to, .. } => to,
        }
    }

    /// The human-visible body/caption of this message.
    pub fn body(&self) -> &str {
        match self {
            SentMessage::Text { body, .. }
            | SentMessage::Buttons { body, .. }
            | SentMessage::List { body, .. } => body,
            SentMessage::Image { caption, .. } => caption,
        }
    }
}

/// A mock chat transport capturing everything sent through it.
#[derive(Default)]
pub struct MockGateway {
    sent: Mutex<Vec<SentMessage>>,
    read_receipts: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured messages, in send order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Count of captured messages.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// The last captured message, if any.
    pub async fn last(&self) -> Option<SentMessage> {
        self.sent.lock().await.last().cloned()
    }

    /// Captured messages addressed to one phone.
    pub async fn sent_to(&self, phone: &str) -> Vec<SentMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to() == phone)
            .cloned()
            .collect()
    }

    /// Drop all captured messages.
    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }

    /// Message ids acknowledged via `mark_read`.
    pub async fn read_receipts(&self) -> Vec<String> {
        self.read_receipts.lock().await.clone()
    }

    /// When set, every send (but not `mark_read`) fails with a transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    async fn capture(&self, msg: SentMessage) -> Result<MessageId, SokoniError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SokoniError::Send {
                message: "mock transport down".into(),
                source: None,
            });
        }
        self.sent.lock().await.push(msg);
        Ok(MessageId(format!("mock-{}", uuid::Uuid::new_v4())))
    }
}

#[async_trait]
impl OutboundGateway for MockGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageId, SokoniError> {
        self.capture(SentMessage::Text {
            to: to.to_string(),
            body: body.to_string(),
        })
        .await
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<MessageId, SokoniError> {
        self.capture(SentMessage::Buttons {
            to: to.to_string(),
            body: body.to_string(),
            buttons: buttons.to_vec(),
        })
        .await
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
        self.capture(SentMessage::List {
            to: to.to_string(),
            body: body.to_string(),
            button: button.to_string(),
            sections: sections.to_vec(),
            header: header.map(str::to_string),
            footer: footer.map(str::to_string),
        })
        .await
    }

    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<MessageId, SokoniError> {
        self.capture(SentMessage::Image {
            to: to.to_string(),
            image_url: image_url.to_string(),
            caption: caption.to_string(),
        })
        .await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SokoniError> {
        self.read_receipts.lock().await.push(message_id.to_string());
        Ok(())
    }
}
