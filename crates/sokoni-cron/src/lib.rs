// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Abandoned-cart scanner.
//!
//! On a cron schedule, finds sessions with a non-empty cart that have been
//! idle past the configured threshold, are not mid-checkout, and have not
//! been reminded within the same window, then sends each one reminder and
//! stamps `last_reminder_at`.
//!
//! Overlapping runs are tolerated: every candidate is re-read immediately
//! before its send, and the stamp only happens after a successful send, so
//! a second sweep (or a cart that moved into checkout between query and
//! send) produces no extra reminder. Scheduling is fully decoupled from
//! request handling; the sweep shares nothing with live turns except the
//! database.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use croner::Cron;
use sokoni_config::RemindersConfig;
use sokoni_core::types::{CartLine, SessionState};
use sokoni_core::{OutboundGateway, SokoniError};
use sokoni_storage::queries::sessions;
use sokoni_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Periodic sweep that reminds customers about idle carts.
pub struct AbandonedCartScanner {
    db: Arc<Database>,
    gateway: Arc<dyn OutboundGateway>,
    idle: Duration,
    schedule: Cron,
}

impl std::fmt::Debug for AbandonedCartScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbandonedCartScanner")
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}

impl AbandonedCartScanner {
    /// Builds a scanner from config. Fails when the cron expression does
    /// not parse.
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn OutboundGateway>,
        config: &RemindersConfig,
    ) -> Result<Self, SokoniError> {
        let schedule = config
            .cron
            .parse::<Cron>()
            .map_err(|e| SokoniError::Config(format!("reminders.cron is invalid: {e}")))?;

        Ok(Self {
            db,
            gateway,
            idle: Duration::hours(i64::from(config.idle_hours)),
            schedule,
        })
    }

    /// Runs sweeps on the cron schedule until the token is cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(idle_hours = self.idle.num_hours(), "abandoned-cart scanner started");
        loop {
            let now = Utc::now();
            let next = match self.schedule.find_next_occurrence(&now, false) {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "cron schedule yielded no next occurrence, stopping scanner");
                    return;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next = %next, "scanner sleeping until next sweep");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("abandoned-cart scanner stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.scan_once().await {
                Ok(sent) => info!(sent, "abandoned-cart sweep complete"),
                Err(e) => error!(error = %e, "abandoned-cart sweep failed"),
            }
        }
    }

    /// One sweep. Returns how many reminders went out. Per-session failures
    /// are logged and do not stop the sweep.
    pub async fn scan_once(&self) -> Result<usize, SokoniError> {
        let cutoff = Utc::now() - self.idle;
        let candidates = sessions::find_abandoned(&self.db, &cutoff.to_rfc3339()).await?;
        debug!(count = candidates.len(), "abandoned-cart candidates found");

        let mut sent = 0;
        for candidate in candidates {
            match self.remind(&candidate.phone_number, cutoff).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        phone = %candidate.phone_number,
                        "abandoned-cart reminder failed"
                    );
                }
            }
        }
        Ok(sent)
    }

    /// Re-read the session and send one reminder if it still qualifies.
    /// The stamp is written only after the send succeeds.
    async fn remind(&self, phone: &str, cutoff: DateTime<Utc>) -> Result<bool, SokoniError> {
        let Some(session) = sessions::get(&self.db, phone).await? else {
            return Ok(false);
        };

        // The query already filtered, but the session may have moved between
        // the query and this send.
        if session.cart.is_empty() {
            return Ok(false);
        }
        if matches!(
            session.flow.state(),
            SessionState::EnteringAddress | SessionState::ConfirmingOrder
        ) {
            debug!(phone = %phone, "cart moved into checkout, skipping reminder");
            return Ok(false);
        }
        if is_after(&session.updated_at, cutoff) {
            return Ok(false);
        }
        if let Some(reminded_at) = &session.last_reminder_at
            && is_after(reminded_at, cutoff)
        {
            return Ok(false);
        }

        let message = reminder_message(&session.cart);
        self.gateway.send_text(phone, &message).await?;
        sessions::mark_reminded(&self.db, phone, &Utc::now().to_rfc3339()).await?;

        info!(phone = %phone, items = session.cart.len(), "abandoned-cart reminder sent");
        Ok(true)
    }
}

fn is_after(rfc3339: &str, cutoff: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|t| t >= cutoff)
        .unwrap_or(false)
}

/// The reminder body: numbered items, total, and how to resume.
pub fn reminder_message(cart: &[CartLine]) -> String {
    let total: f64 = cart.iter().map(|l| l.total_price).sum();
    let mut message = String::from("🛒 *You have items in your cart!*\n\n");
    message.push_str(&format!("You left {} item(s) in your cart:\n\n", cart.len()));
    for (index, line) in cart.iter().enumerate() {
        message.push_str(&format!("{}. {}\n", index + 1, line.item_name));
        message.push_str(&format!(
            "   Qty: {} × TZS {:.2}\n",
            line.quantity, line.unit_price
        ));
    }
    message.push_str(&format!("\n💰 *Total: TZS {total:.2}*\n\n"));
    message.push_str("Complete your order now!\n");
    message.push_str("Type *cart* to review and checkout.\n\n");
    message.push_str("Need help? Type *menu* to start over.");
    message
}
