// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-customer dialogue state machine.
//!
//! One inbound message is one *turn*: acknowledge receipt, load the session,
//! dispatch on `(flow, token)`, persist the next flow, then send the
//! replies. Persistence always happens before sends, and send failures are
//! logged rather than raised, so a transport outage can never corrupt or
//! roll back dialogue state.
//!
//! Turns for the same phone number are serialized through a per-key mutex:
//! webhook deliveries are concurrent and unordered, and an unserialized
//! read-modify-write would let one turn clobber another's cart. Redelivered
//! message ids are dropped using the session's `last_message_id`.
//!
//! Any error escaping a turn is caught at the top, answered with a generic
//! apology, and the customer is returned to the main menu -- the machine
//! must never leave a customer stuck in a broken state.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use sokoni_core::types::{ButtonOption, CartLine, Flow, InboundMessage, ListSection};
use sokoni_core::{OutboundGateway, SokoniError};
use sokoni_orders::OrderService;
use sokoni_storage::queries::{catalog, customers, sessions};
use sokoni_storage::{Database, Item, NewOrder, NewOrderLine};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::render::{self, QuantityPrompt, MAX_CONTENT_ROWS};

/// How many recent orders the tracking list shows.
const TRACKING_LIMIT: usize = 5;
/// How many orders the reorder history shows.
const HISTORY_LIMIT: u32 = 10;

/// A wa.me deep link that re-enters the flow at quantity entry for one item.
#[derive(Debug, Clone, Serialize)]
pub struct ProductLink {
    pub item_id: i64,
    pub name: String,
    pub code: Option<String>,
    pub price: Option<f64>,
    pub stock: i64,
    /// The click-to-chat URL.
    pub link: String,
    /// The pre-filled message the link carries.
    pub prefill: String,
}

/// Interprets inbound messages against per-phone session state.
pub struct DialogueEngine {
    db: Arc<Database>,
    gateway: Arc<dyn OutboundGateway>,
    orders: Arc<OrderService>,
    /// Business number for wa.me deep links, digits only.
    business_phone: Option<String>,
    /// Per-phone turn serialization. Entries are never removed; the key
    /// space is bounded by the customer base.
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DialogueEngine {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn OutboundGateway>,
        orders: Arc<OrderService>,
        business_phone: Option<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            orders,
            business_phone,
            turn_locks: DashMap::new(),
        }
    }

    fn turn_lock(&self, phone: &str) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(phone.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Process one inbound message end to end. Never returns an error; all
    /// failures degrade into an apology plus a reset to the main menu.
    pub async fn handle_inbound(&self, msg: InboundMessage) {
        let phone = msg.from.clone();

        // Receipt ack is idempotent and best-effort.
        if let Err(e) = self.gateway.mark_read(&msg.id).await {
            debug!(error = %e, message_id = %msg.id, "mark_read failed");
        }

        let lock = self.turn_lock(&phone);
        let _guard = lock.lock().await;

        if let Err(e) = self.run_turn(&msg).await {
            warn!(error = %e, phone = %phone, "turn failed, returning customer to main menu");
            self.say(&phone, render::apology()).await;
            if let Err(e) = sessions::set_flow(&self.db, &phone, &Flow::MainMenu).await {
                error!(error = %e, phone = %phone, "failed to reset session after error");
            }
        }
    }

    async fn run_turn(&self, msg: &InboundMessage) -> Result<(), SokoniError> {
        let phone = &msg.from;
        let session = sessions::get_or_create(&self.db, phone).await?;

        // The transport may redeliver a webhook; the same message id is
        // processed at most once.
        if session.last_message_id.as_deref() == Some(msg.id.as_str()) {
            debug!(phone = %phone, message_id = %msg.id, "duplicate message id, skipping");
            return Ok(());
        }
        sessions::set_last_message_id(&self.db, phone, &msg.id).await?;

        // Directory record is best-effort; ordering works without it.
        let name = msg
            .contact_name
            .clone()
            .unwrap_or_else(|| format!("Customer {phone}"));
        if let Err(e) = customers::ensure(&self.db, phone, &name).await {
            warn!(error = %e, phone = %phone, "customer directory create failed");
        }

        let token = msg.content.token().trim().to_string();
        debug!(phone = %phone, state = %session.flow.state(), token = %token, "dispatching turn");

        // Deep-link shortcut, honored in any state.
        if let Some(identifier) = token.strip_prefix("ORDER:") {
            return self.quick_order(phone, identifier.trim()).await;
        }

        // Global commands.
        match token.to_lowercase().as_str() {
            "menu" | "start" => return self.show_main_menu(phone).await,
            "help" => {
                self.say(phone, render::help_text()).await;
                return Ok(());
            }
            _ => {}
        }

        match session.flow {
            Flow::MainMenu => self.on_main_menu(phone, &token).await,
            Flow::BrowsingCategories => self.on_category_selection(phone, &token).await,
            Flow::ViewingItems { .. } => self.on_item_selection(phone, &token).await,
            Flow::Searching => self.on_search(phone, &token).await,
            Flow::SearchingByCode => self.on_code_search(phone, &token).await,
            Flow::AddingToCart { item_id } => self.on_quantity(phone, item_id, &token).await,
            Flow::CartReview => self.on_cart_review(phone, &token).await,
            Flow::EnteringAddress => self.on_address(phone, &token).await,
            Flow::ConfirmingOrder { delivery_address } => {
                self.on_confirmation(phone, &delivery_address, &token).await
            }
            Flow::TrackingOrder => self.on_tracking(phone, &token).await,
            Flow::RatingOrder { unrated, selected } => {
                self.on_rating(phone, &unrated, selected, &token).await
            }
            Flow::ProvidingFeedback { order_id, rating } => {
                self.on_feedback(phone, order_id, rating, &token).await
            }
            Flow::ViewingOrderHistory { history } => {
                self.on_history_selection(phone, &history, &token).await
            }
            Flow::SelectingReorder { source_order_id } => {
                self.on_reorder_confirmation(phone, source_order_id, &token).await
            }
        }
    }

    // --- Send helpers: fire-and-forget relative to persisted state ---

    async fn say(&self, phone: &str, body: &str) {
        if let Err(e) = self.gateway.send_text(phone, body).await {
            warn!(error = %e, phone = %phone, "text send failed");
        }
    }

    async fn say_buttons(&self, phone: &str, body: &str, buttons: Vec<ButtonOption>) {
        if let Err(e) = self.gateway.send_buttons(phone, body, &buttons).await {
            warn!(error = %e, phone = %phone, "button send failed");
        }
    }

    async fn say_list(
        &self,
        phone: &str,
        body: &str,
        button: &str,
        sections: Vec<ListSection>,
        header: Option<&str>,
    ) {
        if let Err(e) = self
            .gateway
            .send_list(phone, body, button, &sections, header, None)
            .await
        {
            warn!(error = %e, phone = %phone, "list send failed");
        }
    }

    async fn say_image(&self, phone: &str, url: &str, caption: &str) {
        if let Err(e) = self.gateway.send_image(phone, url, caption).await {
            warn!(error = %e, phone = %phone, "image send failed");
        }
    }

    // --- Main menu ---

    async fn show_main_menu(&self, phone: &str) -> Result<(), SokoniError> {
        sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;
        self.say_list(
            phone,
            "Welcome to our store! 🛒\n\nHow can I help you today?",
            "Select Option",
            render::main_menu_sections(),
            Some("🏪 Main Menu"),
        )
        .await;
        Ok(())
    }

    async fn on_main_menu(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        match token.to_lowercase().as_str() {
            "browse_categories" => self.show_categories(phone).await,
            "search_products" => {
                sessions::set_flow(&self.db, phone, &Flow::Searching).await?;
                self.say(
                    phone,
                    "🔍 Search for products\n\nPlease enter the product name you are looking for (or type \"cancel\" to go back):",
                )
                .await;
                Ok(())
            }
            "search_by_code" => {
                sessions::set_flow(&self.db, phone, &Flow::SearchingByCode).await?;
                self.say(
                    phone,
                    "🔢 Search by Product Code\n\nPlease enter the product code (or type \"cancel\" to go back):",
                )
                .await;
                Ok(())
            }
            "view_cart" | "cart" => self.show_cart(phone).await,
            "track_order" | "track" => self.show_tracking(phone).await,
            "rate_order" | "rate" => self.show_rating_list(phone).await,
            "quick_reorder" => self.show_history(phone).await,
            "checkout" => self.initiate_checkout(phone).await,
            "continue_shopping" | "back_to_menu" => self.show_main_menu(phone).await,
            _ => {
                self.say(phone, "Invalid option. Please select from the menu.")
                    .await;
                self.show_main_menu(phone).await
            }
        }
    }

    // --- Browsing ---

    async fn show_categories(&self, phone: &str) -> Result<(), SokoniError> {
        sessions::set_flow(&self.db, phone, &Flow::BrowsingCategories).await?;

        let categories = catalog::list_categories(&self.db).await?;
        if categories.is_empty() {
            self.say(
                phone,
                "No categories available at the moment. Type \"menu\" to return to main menu.",
            )
            .await;
            return Ok(());
        }

        let mut rows: Vec<_> = categories
            .iter()
            .take(MAX_CONTENT_ROWS)
            .map(|cat| {
                sokoni_core::types::ListRow::new(
                    format!("cat_{}", cat.id),
                    render::truncate(&cat.description, 24),
                    Some(cat.code.clone()),
                )
            })
            .collect();
        rows.push(render::back_row("back_to_menu", "Return to main menu"));

        self.say_list(
            phone,
            "Please select a category to browse products:",
            "Select Category",
            vec![ListSection { title: None, rows }],
            Some("📂 Categories"),
        )
        .await;
        Ok(())
    }

    async fn on_category_selection(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        if token == "back_to_menu" {
            return self.show_main_menu(phone).await;
        }

        let Some(category_id) = token.strip_prefix("cat_").and_then(|s| s.parse::<i64>().ok())
        else {
            self.say(phone, "Invalid category selection.").await;
            return self.show_categories(phone).await;
        };

        self.show_items_in_category(phone, category_id).await
    }

    async fn show_items_in_category(
        &self,
        phone: &str,
        category_id: i64,
    ) -> Result<(), SokoniError> {
        sessions::set_flow(
            &self.db,
            phone,
            &Flow::ViewingItems {
                category_id: Some(category_id),
                search_query: None,
            },
        )
        .await?;

        let items = catalog::items_in_category(&self.db, category_id).await?;
        if items.is_empty() {
            self.say(
                phone,
                "No items found in this category. Type \"menu\" to return to main menu.",
            )
            .await;
            return Ok(());
        }

        let mut rows: Vec<_> = items
            .iter()
            .take(MAX_CONTENT_ROWS)
            .map(render::item_row)
            .collect();
        rows.push(render::back_row("back_to_categories", "Return to categories"));

        self.say_list(
            phone,
            "Select an item to add to your cart:",
            "Select Item",
            vec![ListSection { title: None, rows }],
            Some("📦 Products"),
        )
        .await;
        Ok(())
    }

    async fn on_item_selection(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        match token {
            "back_to_categories" => return self.show_categories(phone).await,
            "back_to_menu" => return self.show_main_menu(phone).await,
            _ => {}
        }

        let Some(item_id) = token.strip_prefix("item_").and_then(|s| s.parse::<i64>().ok())
        else {
            self.say(phone, "Invalid item selection.").await;
            return Ok(());
        };

        self.request_quantity(phone, item_id, QuantityPrompt::Browse).await
    }

    /// Show product details and move to quantity entry.
    async fn request_quantity(
        &self,
        phone: &str,
        item_id: i64,
        prompt: QuantityPrompt,
    ) -> Result<(), SokoniError> {
        let Some(item) = catalog::get_item(&self.db, item_id).await? else {
            self.say(phone, "Item not found.").await;
            return self.show_main_menu(phone).await;
        };

        sessions::set_flow(&self.db, phone, &Flow::AddingToCart { item_id }).await?;

        let details = render::product_details(&item, prompt);
        match item.image_url.as_deref() {
            Some(url) => self.say_image(phone, url, &details).await,
            None => self.say(phone, &details).await,
        }
        Ok(())
    }

    // --- Search ---

    async fn on_search(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        if token.eq_ignore_ascii_case("cancel") {
            return self.show_main_menu(phone).await;
        }

        let results = catalog::search_by_name(&self.db, token).await?;
        if results.is_empty() {
            self.say(
                phone,
                &format!(
                    "No products found matching \"{token}\". Please try a different search term or type \"menu\" to return to main menu."
                ),
            )
            .await;
            return Ok(());
        }

        sessions::set_flow(
            &self.db,
            phone,
            &Flow::ViewingItems {
                category_id: None,
                search_query: Some(token.to_string()),
            },
        )
        .await?;

        let mut rows: Vec<_> = results
            .iter()
            .take(MAX_CONTENT_ROWS)
            .map(render::item_row)
            .collect();
        rows.push(render::back_row("back_to_menu", "Return to main menu"));

        self.say_list(
            phone,
            &format!("Found {} product(s) matching \"{token}\":", results.len()),
            "Select Item",
            vec![ListSection { title: None, rows }],
            Some("🔍 Search Results"),
        )
        .await;
        Ok(())
    }

    async fn on_code_search(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        if token.eq_ignore_ascii_case("cancel") {
            return self.show_main_menu(phone).await;
        }

        let Some(item) = catalog::find_by_code(&self.db, token).await? else {
            self.say(
                phone,
                &format!(
                    "❌ No product found with code \"{token}\".\n\nPlease check the code and try again, or type \"menu\" to return to main menu."
                ),
            )
            .await;
            return Ok(());
        };

        self.request_quantity(phone, item.id, QuantityPrompt::CodeSearch).await
    }

    // --- Cart building ---

    async fn on_quantity(
        &self,
        phone: &str,
        item_id: i64,
        token: &str,
    ) -> Result<(), SokoniError> {
        if token.eq_ignore_ascii_case("cancel") {
            return self.show_main_menu(phone).await;
        }

        let quantity = match token.parse::<i64>() {
            Ok(q) if q > 0 => q,
            _ => {
                self.say(phone, "Please enter a valid quantity (positive number):")
                    .await;
                return Ok(());
            }
        };

        let Some(item) = catalog::get_item(&self.db, item_id).await? else {
            self.say(phone, "Item not found.").await;
            return self.show_main_menu(phone).await;
        };

        let Some(unit_price) = item.active_price else {
            self.say(
                phone,
                &format!("{} is currently unavailable for ordering.", item.name),
            )
            .await;
            return self.show_main_menu(phone).await;
        };

        let (available, warehouse_id) = match item.primary_stock() {
            Some(stock) => (stock.quantity, stock.warehouse_id),
            None => (0, 0),
        };
        if available < quantity {
            self.say(
                phone,
                &format!("Sorry, only {available} units available. Please enter a lower quantity:"),
            )
            .await;
            return Ok(());
        }

        let line = CartLine::new(item.id, item.name.clone(), quantity, unit_price, warehouse_id);
        sessions::add_cart_line(&self.db, phone, line).await?;
        sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;

        info!(phone = %phone, item = %item.name, quantity, "cart line added");

        self.say_buttons(
            phone,
            &format!(
                "✅ Added {quantity} x {} to your cart!\n\nWhat would you like to do next?",
                item.name
            ),
            vec![
                ButtonOption::new("continue_shopping", "🛍️ Continue Shopping"),
                ButtonOption::new("view_cart", "🛒 View Cart"),
                ButtonOption::new("checkout", "✔️ Checkout"),
            ],
        )
        .await;
        Ok(())
    }

    async fn show_cart(&self, phone: &str) -> Result<(), SokoniError> {
        let session = sessions::get_or_create(&self.db, phone).await?;

        if session.cart.is_empty() {
            sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;
            self.say_buttons(
                phone,
                "🛒 Your cart is empty.\n\nStart shopping to add items!",
                vec![
                    ButtonOption::new("browse_categories", "📂 Browse Products"),
                    ButtonOption::new("search_products", "🔍 Search"),
                ],
            )
            .await;
            return Ok(());
        }

        sessions::set_flow(&self.db, phone, &Flow::CartReview).await?;
        self.say_buttons(
            phone,
            &render::cart_summary(&session.cart),
            vec![
                ButtonOption::new("checkout", "✔️ Checkout"),
                ButtonOption::new("clear_cart", "🗑️ Clear Cart"),
                ButtonOption::new("back_to_menu", "⬅️ Back"),
            ],
        )
        .await;
        Ok(())
    }

    async fn on_cart_review(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        match token {
            "checkout" => self.initiate_checkout(phone).await,
            "clear_cart" => {
                sessions::clear_cart(&self.db, phone).await?;
                self.say(phone, "🗑️ Cart cleared successfully!").await;
                self.show_main_menu(phone).await
            }
            "back_to_menu" | "continue_shopping" => self.show_main_menu(phone).await,
            _ => self.show_cart(phone).await,
        }
    }

    // --- Checkout ---

    async fn initiate_checkout(&self, phone: &str) -> Result<(), SokoniError> {
        sessions::set_flow(&self.db, phone, &Flow::EnteringAddress).await?;
        self.say(
            phone,
            "📍 Please enter your delivery address:\n\n(Or type \"skip\" to use phone number as reference)",
        )
        .await;
        Ok(())
    }

    async fn on_address(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        let delivery_address = if token.eq_ignore_ascii_case("skip") {
            String::new()
        } else {
            token.to_string()
        };

        let session = sessions::get_or_create(&self.db, phone).await?;
        if session.cart.is_empty() {
            self.say(phone, "Your cart is empty.").await;
            return self.show_main_menu(phone).await;
        }

        sessions::set_flow(
            &self.db,
            phone,
            &Flow::ConfirmingOrder {
                delivery_address: delivery_address.clone(),
            },
        )
        .await?;

        self.say_buttons(
            phone,
            &render::order_summary(&session.cart, &delivery_address),
            vec![
                ButtonOption::new("confirm_order", "✅ Confirm"),
                ButtonOption::new("cancel_order", "❌ Cancel"),
            ],
        )
        .await;
        Ok(())
    }

    async fn on_confirmation(
        &self,
        phone: &str,
        delivery_address: &str,
        token: &str,
    ) -> Result<(), SokoniError> {
        match token {
            "cancel_order" => {
                // The cart deliberately survives an abandoned confirmation.
                self.say(phone, "Order cancelled.").await;
                self.show_main_menu(phone).await
            }
            "confirm_order" => {
                let session = sessions::get_or_create(&self.db, phone).await?;
                if session.cart.is_empty() {
                    self.say(phone, "Your cart is empty.").await;
                    return self.show_main_menu(phone).await;
                }

                let warehouse_id = session.cart[0].warehouse_id;
                let request = NewOrder {
                    customer_phone: phone.to_string(),
                    warehouse_id,
                    lines: session
                        .cart
                        .iter()
                        .map(|line| NewOrderLine {
                            item_id: line.item_id,
                            quantity: line.quantity,
                        })
                        .collect(),
                    delivery_address: Some(delivery_address.to_string())
                        .filter(|a| !a.is_empty()),
                    notes: None,
                };

                match self.orders.create_order(request).await {
                    Ok(order) => {
                        sessions::clear_cart(&self.db, phone).await?;
                        sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;
                        self.say(
                            phone,
                            &format!(
                                "✅ Order Confirmed!\n\nOrder #{}\nTotal: TZS {:.2}\nStatus: {}\n\nWe'll notify you when your order is ready for delivery!",
                                order.order_number, order.total_amount, order.status
                            ),
                        )
                        .await;
                        Ok(())
                    }
                    Err(e) => {
                        // Checkout failed (stock may have moved underneath);
                        // the cart is preserved for another attempt.
                        warn!(error = %e, phone = %phone, "order creation failed");
                        self.say(
                            phone,
                            "❌ Failed to create order. Some items may be out of stock. Please try again or contact support.",
                        )
                        .await;
                        self.show_main_menu(phone).await
                    }
                }
            }
            _ => {
                self.say(phone, "Please tap ✅ Confirm or ❌ Cancel.").await;
                Ok(())
            }
        }
    }

    // --- Tracking ---

    async fn show_tracking(&self, phone: &str) -> Result<(), SokoniError> {
        let orders = self.orders.find_by_phone(phone).await?;
        if orders.is_empty() {
            sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;
            self.say(
                phone,
                "📦 No orders found.\n\nType \"menu\" to return to main menu.",
            )
            .await;
            return Ok(());
        }

        sessions::set_flow(&self.db, phone, &Flow::TrackingOrder).await?;

        let mut rows: Vec<_> = orders
            .iter()
            .take(TRACKING_LIMIT)
            .map(|order| {
                sokoni_core::types::ListRow::new(
                    format!("order_{}", order.id),
                    render::truncate(&format!("#{}", order.order_number), 24),
                    Some(render::truncate(
                        &format!(
                            "{} | TZS {:.0} | {}",
                            order.status,
                            order.total_amount,
                            render::short_date(&order.created_at)
                        ),
                        72,
                    )),
                )
            })
            .collect();
        rows.push(render::back_row("back_to_menu", "Return to main menu"));

        self.say_list(
            phone,
            "Select an order to view details:",
            "View Order",
            vec![ListSection { title: None, rows }],
            Some("📦 Your Orders"),
        )
        .await;
        Ok(())
    }

    async fn on_tracking(&self, phone: &str, token: &str) -> Result<(), SokoniError> {
        if token == "back_to_menu" {
            return self.show_main_menu(phone).await;
        }

        let Some(order_id) = token.strip_prefix("order_").and_then(|s| s.parse::<i64>().ok())
        else {
            return self.show_tracking(phone).await;
        };

        // Orders are only visible to the phone that placed them.
        let order = match self.orders.find_one(order_id).await {
            Ok(order) if order.customer_phone == phone => order,
            Ok(_) | Err(SokoniError::NotFound { .. }) => {
                self.say(phone, "Order not found.").await;
                return self.show_tracking(phone).await;
            }
            Err(e) => return Err(e),
        };

        sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;
        self.say_buttons(
            phone,
            &render::order_details(&order),
            vec![
                ButtonOption::new("track_order", "📦 My Orders"),
                ButtonOption::new("back_to_menu", "⬅️ Main Menu"),
            ],
        )
        .await;
        Ok(())
    }

    // --- Rating ---

    async fn show_rating_list(&self, phone: &str) -> Result<(), SokoniError> {
        let unrated = self.orders.delivered_unrated(phone).await?;
        if unrated.is_empty() {
            self.say(
                phone,
                "🎉 Great news! You have no pending orders to rate.\n\nAll your delivered orders have been rated. Thank you for your feedback!",
            )
            .await;
            return self.show_main_menu(phone).await;
        }

        sessions::set_flow(
            &self.db,
            phone,
            &Flow::RatingOrder {
                unrated: unrated.iter().map(|o| o.id).collect(),
                selected: None,
            },
        )
        .await?;

        self.say(phone, &render::rating_order_list(&unrated)).await;
        Ok(())
    }

    async fn on_rating(
        &self,
        phone: &str,
        unrated: &[i64],
        selected: Option<i64>,
        token: &str,
    ) -> Result<(), SokoniError> {
        if token.eq_ignore_ascii_case("cancel") {
            return self.show_main_menu(phone).await;
        }

        // Second pass: a star count for the already-selected order.
        if let Some(order_id) = selected {
            let rating = match token.parse::<u8>() {
                Ok(r) if (1..=5).contains(&r) => r,
                _ => {
                    self.say(phone, "❌ Please enter a valid rating between 1 and 5 stars.")
                        .await;
                    return Ok(());
                }
            };

            sessions::set_flow(&self.db, phone, &Flow::ProvidingFeedback { order_id, rating })
                .await?;

            let stars = "⭐".repeat(rating as usize);
            self.say(
                phone,
                &format!(
                    "{stars} You rated this order {rating}/5 stars!\n\n💬 Would you like to add feedback? (optional)\n\nType your feedback or \"skip\" to finish:"
                ),
            )
            .await;
            return Ok(());
        }

        // First pass: picking which order to rate.
        let index = match token.parse::<usize>() {
            Ok(n) if (1..=unrated.len()).contains(&n) => n - 1,
            _ => {
                self.say(
                    phone,
                    &format!("❌ Please enter a valid number between 1 and {}.", unrated.len()),
                )
                .await;
                return Ok(());
            }
        };

        let order_id = unrated[index];
        let order = match self.orders.find_one(order_id).await {
            Ok(order) if order.customer_phone == phone => order,
            _ => {
                self.say(phone, "Order not found.").await;
                return self.show_rating_list(phone).await;
            }
        };

        sessions::set_flow(
            &self.db,
            phone,
            &Flow::RatingOrder {
                unrated: unrated.to_vec(),
                selected: Some(order_id),
            },
        )
        .await?;

        self.say(phone, &render::rating_prompt(&order)).await;
        Ok(())
    }

    async fn on_feedback(
        &self,
        phone: &str,
        order_id: i64,
        rating: u8,
        token: &str,
    ) -> Result<(), SokoniError> {
        let feedback = if token.eq_ignore_ascii_case("skip") {
            None
        } else {
            Some(token.to_string())
        };
        let had_feedback = feedback.is_some();

        match self.orders.rate_order(order_id, rating, feedback).await {
            Ok(_) => {
                let stars = "⭐".repeat(rating as usize);
                let mut message = format!("{stars} Thank you for your {rating}-star rating!\n\n");
                if had_feedback {
                    message.push_str("💬 Your feedback has been recorded.\n\n");
                }
                message.push_str(
                    "🙏 We appreciate your feedback and will use it to improve our service!",
                );
                self.say(phone, &message).await;

                let remaining = self.orders.delivered_unrated(phone).await?;
                if !remaining.is_empty() {
                    self.say(
                        phone,
                        &format!(
                            "📝 You have {} more order(s) to rate.\n\nType \"rate\" to continue rating or \"menu\" for main menu.",
                            remaining.len()
                        ),
                    )
                    .await;
                }

                sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, order_id, "saving rating failed");
                self.say(
                    phone,
                    "❌ Sorry, there was an error saving your rating. Please try again later.",
                )
                .await;
                self.show_main_menu(phone).await
            }
        }
    }

    // --- Reorder ---

    async fn show_history(&self, phone: &str) -> Result<(), SokoniError> {
        let orders = self.orders.history(phone, HISTORY_LIMIT).await?;
        if orders.is_empty() {
            self.say(
                phone,
                "📭 You have no previous orders yet.\n\nStart shopping to build your order history!",
            )
            .await;
            return self.show_main_menu(phone).await;
        }

        sessions::set_flow(
            &self.db,
            phone,
            &Flow::ViewingOrderHistory {
                history: orders.iter().map(|o| o.id).collect(),
            },
        )
        .await?;

        self.say(phone, &render::history_list(&orders)).await;
        Ok(())
    }

    async fn on_history_selection(
        &self,
        phone: &str,
        history: &[i64],
        token: &str,
    ) -> Result<(), SokoniError> {
        if token.eq_ignore_ascii_case("cancel") {
            return self.show_main_menu(phone).await;
        }

        let index = match token.parse::<usize>() {
            Ok(n) if (1..=history.len()).contains(&n) => n - 1,
            _ => {
                self.say(
                    phone,
                    &format!("❌ Please enter a valid number between 1 and {}.", history.len()),
                )
                .await;
                return Ok(());
            }
        };

        let order_id = history[index];
        let order = match self.orders.find_one(order_id).await {
            Ok(order) if order.customer_phone == phone => order,
            _ => {
                self.say(phone, "Order not found.").await;
                return self.show_history(phone).await;
            }
        };

        sessions::set_flow(
            &self.db,
            phone,
            &Flow::SelectingReorder {
                source_order_id: order_id,
            },
        )
        .await?;

        self.say(phone, &render::reorder_confirmation(&order)).await;
        Ok(())
    }

    async fn on_reorder_confirmation(
        &self,
        phone: &str,
        source_order_id: i64,
        token: &str,
    ) -> Result<(), SokoniError> {
        if token.eq_ignore_ascii_case("cancel") {
            return self.show_main_menu(phone).await;
        }
        if !token.eq_ignore_ascii_case("confirm") {
            self.say(
                phone,
                "Please type \"confirm\" to proceed with the reorder, or \"cancel\" to go back.",
            )
            .await;
            return Ok(());
        }

        let source = match self.orders.find_one(source_order_id).await {
            Ok(order) if order.customer_phone == phone => order,
            _ => {
                self.say(phone, "❌ Session expired. Please start reorder again.")
                    .await;
                return self.show_main_menu(phone).await;
            }
        };

        // Merge the historical lines into the live cart at CURRENT prices.
        // Items that vanished or lost their price are skipped, not fatal.
        let session = sessions::get_or_create(&self.db, phone).await?;
        let mut cart = session.cart;
        let mut merged = 0usize;
        for line in &source.lines {
            let item = match catalog::get_item(&self.db, line.item_id).await? {
                Some(item) => item,
                None => {
                    warn!(item_id = line.item_id, "reorder item no longer exists, skipping");
                    continue;
                }
            };
            let Some(unit_price) = item.active_price else {
                warn!(item = %item.name, "reorder item has no active price, skipping");
                continue;
            };
            sokoni_core::types::merge_cart_line(
                &mut cart,
                CartLine::new(
                    item.id,
                    item.name.clone(),
                    line.quantity,
                    unit_price,
                    source.warehouse_id,
                ),
            );
            merged += 1;
        }

        sessions::save_cart(&self.db, phone, &cart).await?;
        sessions::set_flow(&self.db, phone, &Flow::MainMenu).await?;

        info!(phone = %phone, source = %source.order_number, merged, "reorder merged into cart");

        self.say(
            phone,
            &format!(
                "✅ *Reorder Successful!*\n\n{merged} items have been added to your cart.\n\nType \"cart\" to review your cart or \"menu\" for main menu."
            ),
        )
        .await;
        Ok(())
    }

    // --- Quick order deep link ---

    /// `ORDER:<id-or-code>` shortcut: jump straight to quantity entry.
    async fn quick_order(&self, phone: &str, identifier: &str) -> Result<(), SokoniError> {
        info!(phone = %phone, identifier = %identifier, "quick order requested");

        let item = match identifier.parse::<i64>() {
            Ok(id) => catalog::get_item(&self.db, id).await?,
            Err(_) => catalog::find_by_code(&self.db, identifier).await?,
        };

        let Some(item) = item else {
            self.say(
                phone,
                &format!(
                    "Sorry, product \"{identifier}\" not found.\n\nType *menu* to browse our catalog."
                ),
            )
            .await;
            return self.show_main_menu(phone).await;
        };

        self.request_quantity(phone, item.id, QuantityPrompt::QuickOrder).await
    }

    /// Build a wa.me click-to-chat link pre-filled with `ORDER:<item id>`.
    pub async fn product_link(&self, item_id: i64) -> Result<ProductLink, SokoniError> {
        let item: Item = catalog::get_item(&self.db, item_id)
            .await?
            .ok_or_else(|| SokoniError::not_found("item", item_id))?;

        let business = self.business_phone.as_deref().ok_or_else(|| {
            SokoniError::InvalidState("whatsapp.business_phone is not configured".into())
        })?;

        let prefill = format!("ORDER:{}", item.id);
        let link = format!("https://wa.me/{business}?text=ORDER%3A{}", item.id);

        Ok(ProductLink {
            item_id: item.id,
            name: item.name.clone(),
            code: item.code.clone(),
            price: item.active_price,
            stock: item.primary_stock().map(|s| s.quantity).unwrap_or(0),
            link,
            prefill,
        })
    }
}
