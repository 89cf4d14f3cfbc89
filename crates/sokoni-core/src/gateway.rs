// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound gateway trait for the chat transport.

use async_trait::async_trait;

use crate::error::SokoniError;
use crate::types::{ButtonOption, ListSection, MessageId};

/// Raw send primitives of the chat transport.
///
/// The dialogue engine, notifier, and cart scanner all talk to the customer
/// through this trait. Implementations own transport-specific concerns such
/// as payload limits and degrading structured messages to plain text.
#[async_trait]
pub trait OutboundGateway: Send + Sync {
    /// Sends a plain text message.
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageId, SokoniError>;

    /// Sends a message with up to three quick-reply buttons.
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<MessageId, SokoniError>;

    /// Sends an interactive list message (at most ten rows across sections).
    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        sections: &[ListSection],
        header: Option<&str>,
        footer: Option<&str>,
    ) -> Result<MessageId, SokoniError>;

    /// Sends an image by URL with a caption.
    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<MessageId, SokoniError>;

    /// Acknowledges an inbound message as read.
    async fn mark_read(&self, message_id: &str) -> Result<(), SokoniError>;
}
