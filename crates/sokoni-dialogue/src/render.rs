// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message rendering for the dialogue engine.
//!
//! Pure functions from domain values to message bodies and list rows, kept
//! free of I/O so they can be tested in isolation. Transport limits (24-char
//! row titles, 72-char descriptions, 10 rows per list) are applied here
//! where rows are built; the gateway applies them again defensively.

use sokoni_core::types::{CartLine, Item, ItemCondition, ListRow, ListSection, Order};

/// How many rows a list may carry before the appended back row.
pub const MAX_CONTENT_ROWS: usize = 9;

/// Which prompt introduced the quantity question; the wording differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityPrompt {
    /// Reached by browsing or name search.
    Browse,
    /// Reached by exact product-code entry.
    CodeSearch,
    /// Reached through an ORDER:<id> deep link.
    QuickOrder,
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Format an RFC 3339 timestamp as a short date, falling back to the raw
/// string when it does not parse.
pub fn short_date(rfc3339: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map(|d| d.format("%d %b %Y").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}

pub fn help_text() -> &'static str {
    "❓ Help & Commands\n\n\
     🔹 Type \"menu\" - Show main menu\n\
     🔹 Type \"cart\" - View your cart\n\
     🔹 Type \"track\" - Track your orders\n\
     🔹 Type \"rate\" - Rate your delivered orders\n\
     🔹 Type \"help\" - Show this help message\n\n\
     Need assistance? Contact our support team!"
}

pub fn apology() -> &'static str {
    "Sorry, something went wrong. Please try again or type \"menu\" to return to the main menu."
}

/// The seven top-level actions.
pub fn main_menu_sections() -> Vec<ListSection> {
    let rows = vec![
        ListRow::new(
            "browse_categories",
            "📂 Browse Categories",
            Some("View products by category".into()),
        ),
        ListRow::new(
            "search_products",
            "🔍 Search Products",
            Some("Search for specific items".into()),
        ),
        ListRow::new(
            "search_by_code",
            "🔢 Search by Code",
            Some("Enter product code directly".into()),
        ),
        ListRow::new(
            "view_cart",
            "🛒 View Cart",
            Some("Review your shopping cart".into()),
        ),
        ListRow::new(
            "track_order",
            "📦 Track Order",
            Some("Check your order status".into()),
        ),
        ListRow::new(
            "rate_order",
            "⭐ Rate Order",
            Some("Rate your delivered orders".into()),
        ),
        ListRow::new(
            "quick_reorder",
            "🔄 Quick Reorder",
            Some("Reorder from your history".into()),
        ),
    ];
    vec![ListSection { title: None, rows }]
}

/// A selectable row for one catalog item: price and stock at a glance.
pub fn item_row(item: &Item) -> ListRow {
    let price = match item.active_price {
        Some(p) => format!("TZS {p:.0}"),
        None => "Price N/A".to_string(),
    };
    let stock = match item.primary_stock() {
        Some(s) => format!("Stock: {}", s.quantity),
        None => "Out of stock".to_string(),
    };
    ListRow::new(
        format!("item_{}", item.id),
        truncate(&item.name, 24),
        Some(truncate(&format!("{price} | {stock}"), 72)),
    )
}

/// A row appended to every list for navigating back.
pub fn back_row(id: &str, description: &str) -> ListRow {
    ListRow::new(id, "⬅️ Back", Some(description.to_string()))
}

fn condition_badge(condition: ItemCondition) -> &'static str {
    match condition {
        ItemCondition::Used => "🔄 Used",
        ItemCondition::New => "✨ New",
    }
}

/// The product detail + quantity prompt.
pub fn product_details(item: &Item, prompt: QuantityPrompt) -> String {
    let price = match item.active_price {
        Some(p) => format!("TZS {p:.2}"),
        None => "N/A".to_string(),
    };
    let available = item.primary_stock().map(|s| s.quantity).unwrap_or(0);
    let badge = condition_badge(item.condition);

    let mut details = String::new();
    match prompt {
        QuantityPrompt::Browse => {}
        QuantityPrompt::CodeSearch => details.push_str("✅ Product Found!\n\n"),
        QuantityPrompt::QuickOrder => details.push_str("🎯 Quick Order\n\n"),
    }
    details.push_str(&format!("📦 *{}*\n{badge}\n", item.name));
    if prompt != QuantityPrompt::Browse {
        details.push_str(&format!(
            "🔢 Code: {}\n",
            item.code.as_deref().unwrap_or("N/A")
        ));
    }
    details.push_str(&format!(
        "💰 Price: {price}\n📊 Available: {available} units\n"
    ));
    if prompt == QuantityPrompt::CodeSearch
        && let Some(desc) = item.description.as_deref().filter(|d| !d.is_empty())
    {
        details.push_str(&format!("\n📝 {desc}\n"));
    }
    details.push_str(
        "\nPlease enter the quantity you want to order (or type \"cancel\" to go back):",
    );
    details
}

/// Numbered cart lines with per-line and grand totals.
pub fn cart_summary(cart: &[CartLine]) -> String {
    let mut message = String::from("🛒 Your Shopping Cart\n\n");
    let mut total = 0.0;
    for (index, line) in cart.iter().enumerate() {
        message.push_str(&format!("{}. {}\n", index + 1, line.item_name));
        message.push_str(&format!(
            "   Qty: {} x TZS {:.2} = TZS {:.2}\n\n",
            line.quantity, line.unit_price, line.total_price
        ));
        total += line.total_price;
    }
    message.push_str("━━━━━━━━━━━━━━━━\n");
    message.push_str(&format!("💰 Total: TZS {total:.2}"));
    message
}

/// The pre-confirmation order summary.
pub fn order_summary(cart: &[CartLine], delivery_address: &str) -> String {
    let mut message = String::from("📋 Order Summary\n\n");
    let mut total = 0.0;
    for (index, line) in cart.iter().enumerate() {
        message.push_str(&format!("{}. {}\n", index + 1, line.item_name));
        message.push_str(&format!(
            "   {} x TZS {:.2} = TZS {:.2}\n\n",
            line.quantity, line.unit_price, line.total_price
        ));
        total += line.total_price;
    }
    message.push_str("━━━━━━━━━━━━━━━━\n");
    message.push_str(&format!("💰 Total: TZS {total:.2}\n\n"));
    if !delivery_address.is_empty() {
        message.push_str(&format!("📍 Delivery: {delivery_address}\n\n"));
    }
    message.push_str("Confirm your order?");
    message
}

/// Full order detail for the tracking view.
pub fn order_details(order: &Order) -> String {
    let mut details = String::from("📦 Order Details\n\n");
    details.push_str(&format!("Order #{}\n", order.order_number));
    details.push_str(&format!(
        "Status: {}\n",
        order.status.to_string().to_uppercase()
    ));
    details.push_str(&format!("Date: {}\n\n", short_date(&order.created_at)));

    details.push_str("Items:\n");
    for (index, line) in order.lines.iter().enumerate() {
        details.push_str(&format!("{}. {}\n", index + 1, line.item_name));
        details.push_str(&format!(
            "   {} x TZS {:.2} = TZS {:.2}\n",
            line.quantity, line.unit_price, line.total_price
        ));
    }

    details.push_str("\n━━━━━━━━━━━━━━━━\n");
    details.push_str(&format!("💰 Total: TZS {:.2}\n", order.total_amount));

    if let Some(address) = order.delivery_address.as_deref().filter(|a| !a.is_empty()) {
        details.push_str(&format!("\n📍 Delivery: {address}"));
    }
    details
}

/// Numbered delivered-but-unrated orders for the rating flow.
pub fn rating_order_list(orders: &[Order]) -> String {
    let mut message = String::from("⭐ *Rate Your Orders*\n\nPlease select an order to rate:\n\n");
    for (index, order) in orders.iter().enumerate() {
        let delivered = order
            .delivered_at
            .as_deref()
            .map(short_date)
            .unwrap_or_else(|| "-".to_string());
        message.push_str(&format!("{}. Order #{}\n", index + 1, order.order_number));
        message.push_str(&format!("   📅 Delivered: {delivered}\n"));
        message.push_str(&format!("   💰 Total: TZS {:.2}\n", order.total_amount));
        message.push_str(&format!("   📦 Items: {}\n\n", order.lines.len()));
    }
    message.push_str(&format!(
        "Type the number (1-{}) or \"cancel\" to go back:",
        orders.len()
    ));
    message
}

/// The 1-5 star prompt for one selected order.
pub fn rating_prompt(order: &Order) -> String {
    let mut message = format!("📦 *Order #{}*\n\n🛍️ Items:\n", order.order_number);
    for line in &order.lines {
        message.push_str(&format!("• {} x{}\n", line.item_name, line.quantity));
    }
    message.push_str(&format!("\n💰 Total: TZS {:.2}\n\n", order.total_amount));
    message.push_str("⭐ *How would you rate this order?*\n\n");
    message.push_str("Please rate from 1 to 5 stars:\n");
    message.push_str("1 ⭐ - Very Poor\n");
    message.push_str("2 ⭐⭐ - Poor\n");
    message.push_str("3 ⭐⭐⭐ - Average\n");
    message.push_str("4 ⭐⭐⭐⭐ - Good\n");
    message.push_str("5 ⭐⭐⭐⭐⭐ - Excellent\n\n");
    message.push_str("Type a number (1-5) or \"cancel\":");
    message
}

/// Numbered order history for the reorder flow.
pub fn history_list(orders: &[Order]) -> String {
    let mut message = String::from("🔄 *Quick Reorder*\n\nSelect an order to reorder:\n\n");
    for (index, order) in orders.iter().enumerate() {
        let glyph = match order.status {
            sokoni_core::types::OrderStatus::Delivered => "✅",
            sokoni_core::types::OrderStatus::Cancelled => "❌",
            _ => "⏳",
        };
        let items = order
            .lines
            .iter()
            .map(|l| format!("{} x{}", l.item_name, l.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!(
            "{}. {glyph} Order #{}\n",
            index + 1,
            order.order_number
        ));
        message.push_str(&format!("   📅 Date: {}\n", short_date(&order.created_at)));
        message.push_str(&format!("   💰 Total: TZS {:.2}\n", order.total_amount));
        message.push_str(&format!("   📦 Items: {items}\n\n"));
    }
    message.push_str(&format!(
        "Type the number (1-{}) to reorder, or \"cancel\":",
        orders.len()
    ));
    message
}

/// The confirm-before-merging summary of a reorder.
pub fn reorder_confirmation(order: &Order) -> String {
    let mut message = format!(
        "🔄 *Reorder Confirmation*\n\n📦 Order #{}\n\n🛍️ Items to be added to your cart:\n\n",
        order.order_number
    );
    for line in &order.lines {
        message.push_str(&format!("• {}\n", line.item_name));
        message.push_str(&format!(
            "  Qty: {} × TZS {:.2} = TZS {:.2}\n\n",
            line.quantity, line.unit_price, line.total_price
        ));
    }
    message.push_str(&format!("💰 Total: TZS {:.2}\n\n", order.total_amount));
    message.push_str("✅ Type \"confirm\" to add these items to your cart\n");
    message.push_str("❌ Type \"cancel\" to go back");
    message
}
