// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API adapter for the Sokoni commerce engine.
//!
//! [`WhatsAppClient`] implements the outbound gateway (text, buttons,
//! lists, images, read receipts) with the transport's payload limits and an
//! optional plain-text degradation mode. The [`webhook`] module owns the
//! inbound side: payload types, message extraction, and signature
//! verification.

pub mod client;
pub mod webhook;

pub use client::WhatsAppClient;
pub use webhook::{
    extract_messages, extract_statuses, is_whatsapp_payload, verify_signature, WebhookPayload,
};
