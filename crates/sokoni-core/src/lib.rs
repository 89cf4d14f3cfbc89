// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Sokoni conversational commerce engine.
//!
//! Defines the error taxonomy, the canonical domain types (sessions, carts,
//! orders, catalog entities), and the outbound gateway trait that the
//! transport adapter implements.

pub mod error;
pub mod gateway;
pub mod types;

pub use error::SokoniError;
pub use gateway::OutboundGateway;
pub use types::{
    ButtonOption, CartLine, Flow, InboundMessage, ListRow, ListSection, MessageContent,
    MessageId, NewOrder, NewOrderLine, Order, OrderLine, OrderStats, OrderStatus, Session,
    SessionState,
};
