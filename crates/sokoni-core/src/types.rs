// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical domain types shared across the Sokoni workspace.
//!
//! Sessions, carts, orders, and catalog entities are defined here so the
//! storage, dialogue, and order crates agree on one representation.
//! Timestamps are RFC 3339 strings in UTC, matching how they are stored.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Dialogue session ---

/// Discriminant of the dialogue state machine.
///
/// Persisted as its snake_case string so the abandoned-cart sweep can
/// filter on the raw column without deserializing the flow JSON.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    MainMenu,
    BrowsingCategories,
    ViewingItems,
    Searching,
    SearchingByCode,
    AddingToCart,
    CartReview,
    EnteringAddress,
    ConfirmingOrder,
    TrackingOrder,
    RatingOrder,
    ProvidingFeedback,
    ViewingOrderHistory,
    SelectingReorder,
}

/// Dialogue state plus the scratch data that state needs, as one tagged value.
///
/// Each variant carries only the fields its handlers read, so stale scratch
/// from a previous flow cannot leak into the next one. The cart is NOT part
/// of the flow -- it lives on the session because it survives every
/// transition until checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Flow {
    MainMenu,
    BrowsingCategories,
    ViewingItems {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_query: Option<String>,
    },
    Searching,
    SearchingByCode,
    AddingToCart {
        item_id: i64,
    },
    CartReview,
    EnteringAddress,
    ConfirmingOrder {
        delivery_address: String,
    },
    TrackingOrder,
    RatingOrder {
        /// Order ids offered for rating, in the order they were listed.
        unrated: Vec<i64>,
        /// Set once the customer has picked an order and owes us a star count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected: Option<i64>,
    },
    ProvidingFeedback {
        order_id: i64,
        rating: u8,
    },
    ViewingOrderHistory {
        /// Order ids offered for reorder, in the order they were listed.
        history: Vec<i64>,
    },
    SelectingReorder {
        source_order_id: i64,
    },
}

impl Flow {
    /// The state discriminant for this flow value.
    pub fn state(&self) -> SessionState {
        match self {
            Flow::MainMenu => SessionState::MainMenu,
            Flow::BrowsingCategories => SessionState::BrowsingCategories,
            Flow::ViewingItems { .. } => SessionState::ViewingItems,
            Flow::Searching => SessionState::Searching,
            Flow::SearchingByCode => SessionState::SearchingByCode,
            Flow::AddingToCart { .. } => SessionState::AddingToCart,
            Flow::CartReview => SessionState::CartReview,
            Flow::EnteringAddress => SessionState::EnteringAddress,
            Flow::ConfirmingOrder { .. } => SessionState::ConfirmingOrder,
            Flow::TrackingOrder => SessionState::TrackingOrder,
            Flow::RatingOrder { .. } => SessionState::RatingOrder,
            Flow::ProvidingFeedback { .. } => SessionState::ProvidingFeedback,
            Flow::ViewingOrderHistory { .. } => SessionState::ViewingOrderHistory,
            Flow::SelectingReorder { .. } => SessionState::SelectingReorder,
        }
    }
}

impl Default for Flow {
    fn default() -> Self {
        Flow::MainMenu
    }
}

/// One line of an in-progress cart, held in session context until checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: i64,
    /// Name snapshot at the time the line was added.
    pub item_name: String,
    pub quantity: i64,
    /// Price snapshot at the time the line was added.
    pub unit_price: f64,
    pub total_price: f64,
    /// Warehouse the reserved stock will be taken from.
    pub warehouse_id: i64,
}

impl CartLine {
    /// Builds a line with `total_price` derived from quantity and unit price.
    pub fn new(
        item_id: i64,
        item_name: impl Into<String>,
        quantity: i64,
        unit_price: f64,
        warehouse_id: i64,
    ) -> Self {
        Self {
            item_id,
            item_name: item_name.into(),
            quantity,
            unit_price,
            total_price: unit_price * quantity as f64,
            warehouse_id,
        }
    }
}

/// Merges a line into a cart: same item ids sum quantities and recompute the
/// line total from the existing unit price; new items are appended.
pub fn merge_cart_line(cart: &mut Vec<CartLine>, line: CartLine) {
    match cart.iter_mut().find(|l| l.item_id == line.item_id) {
        Some(existing) => {
            existing.quantity += line.quantity;
            existing.total_price = existing.unit_price * existing.quantity as f64;
        }
        None => cart.push(line),
    }
}

/// Sum of line totals for a cart.
pub fn cart_total(cart: &[CartLine]) -> f64 {
    cart.iter().map(|l| l.total_price).sum()
}

/// Durable per-customer dialogue record, keyed by phone number.
#[derive(Debug, Clone)]
pub struct Session {
    pub phone_number: String,
    pub flow: Flow,
    pub cart: Vec<CartLine>,
    /// Last processed transport message id, used to drop webhook redeliveries.
    pub last_message_id: Option<String>,
    /// When the last abandoned-cart reminder went out, if ever.
    pub last_reminder_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// --- Orders ---

/// Lifecycle states of an order. `Delivered` and `Cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Whether no further status mutation is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

/// A confirmed purchase with its immutable line-item snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub customer_phone: String,
    pub customer_id: Option<i64>,
    pub warehouse_id: i64,
    pub lines: Vec<OrderLine>,
    /// Sum of line totals at creation time. Never mutated afterwards.
    pub total_amount: f64,
    pub status: OrderStatus,
    pub delivery_address: Option<String>,
    pub notes: Option<String>,
    /// Last status for which a notification was successfully sent.
    pub notified_status: Option<OrderStatus>,
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub rated_at: Option<String>,
    pub created_at: String,
    pub confirmed_at: Option<String>,
    pub delivered_at: Option<String>,
}

/// One line of an order. Prices and names are snapshots taken at order time
/// and are never re-read from the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub id: i64,
    pub item_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Input for creating an order from a confirmed cart.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_phone: String,
    pub warehouse_id: i64,
    pub lines: Vec<NewOrderLine>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One requested line of a new order. Prices are resolved at creation time,
/// never supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderLine {
    pub item_id: i64,
    pub quantity: i64,
}

/// Aggregate order counts and revenue (cancelled orders excluded from revenue).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub total: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub processing: u64,
    pub ready: u64,
    pub delivered: u64,
    pub cancelled: u64,
    pub total_revenue: f64,
}

// --- Catalog ---

/// Physical condition of a catalog item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    New,
    Used,
}

/// A catalog item with its active price and per-warehouse stock.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub condition: ItemCondition,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category_id: Option<i64>,
    /// Selling price from the currently active price row, if any.
    pub active_price: Option<f64>,
    pub stock: Vec<StockLevel>,
}

impl Item {
    /// Stock record for a specific warehouse.
    pub fn stock_at(&self, warehouse_id: i64) -> Option<&StockLevel> {
        self.stock.iter().find(|s| s.warehouse_id == warehouse_id)
    }

    /// First stock record, the default warehouse for cart lines.
    pub fn primary_stock(&self) -> Option<&StockLevel> {
        self.stock.first()
    }
}

/// Quantity of one item held at one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockLevel {
    pub id: i64,
    pub item_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
}

/// An item category.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub code: String,
    pub description: String,
}

/// A customer-directory record.
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: String,
}

/// A warehouse.
#[derive(Debug, Clone, Serialize)]
pub struct Warehouse {
    pub id: i64,
    pub name: String,
}

/// Input for one accounting-ledger sale row, written at delivery time.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub customer_id: i64,
    pub item_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    pub amount_paid: f64,
    pub remarks: Option<String>,
}

/// A persisted accounting-ledger sale row.
#[derive(Debug, Clone, Serialize)]
pub struct SaleRecord {
    pub id: i64,
    pub customer_id: i64,
    pub item_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    pub amount_paid: f64,
    pub remarks: Option<String>,
    pub created_at: String,
}

// --- Inbound messages ---

/// An inbound customer message, already normalized from the transport shape.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Transport message id, used for read receipts and redelivery dedup.
    pub id: String,
    /// Sender phone number.
    pub from: String,
    /// Profile name supplied by the transport, when available.
    pub contact_name: Option<String>,
    pub content: MessageContent,
}

/// The content of an inbound message, reduced to what the dialogue needs.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Free text, trimmed.
    Text(String),
    /// The id of a tapped button or list row.
    Reply { id: String },
}

impl MessageContent {
    /// The dispatch token: raw text, or the selected option id.
    pub fn token(&self) -> &str {
        match self {
            MessageContent::Text(body) => body,
            MessageContent::Reply { id } => id,
        }
    }
}

// --- Outbound message building blocks ---

/// Identifier assigned by the transport to a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// One of up to three quick-reply buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonOption {
    pub id: String,
    pub title: String,
}

impl ButtonOption {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One row of an interactive list message.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description,
        }
    }
}

/// A titled group of list rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSection {
    pub title: Option<String>,
    pub rows: Vec<ListRow>,
}
