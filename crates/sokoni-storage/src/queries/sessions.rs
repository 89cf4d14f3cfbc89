// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session persistence, keyed by phone number.
//!
//! The flow and cart live in JSON columns; the `state` discriminant is
//! duplicated into its own column so the abandoned-cart sweep can filter
//! without deserializing. Every mutation here is one `conn.call` closure,
//! which the single writer thread executes atomically with respect to other
//! writers.

use rusqlite::{params, OptionalExtension, Row};
use sokoni_core::types::{merge_cart_line, CartLine, Flow, Session};
use sokoni_core::SokoniError;

use crate::database::{domain_err, map_tr_err, Database};

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

const SESSION_COLUMNS: &str =
    "phone_number, state, flow, cart, last_message_id, last_reminder_at, created_at, updated_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let flow_json: String = row.get(2)?;
    let cart_json: String = row.get(3)?;

    let flow: Flow = serde_json::from_str(&flow_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let cart: Vec<CartLine> = serde_json::from_str(&cart_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Session {
        phone_number: row.get(0)?,
        flow,
        cart,
        last_message_id: row.get(4)?,
        last_reminder_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Inserts a fresh MAIN_MENU session for `phone` if none exists.
/// Runs inside the caller's closure so every mutation is self-sufficient.
fn ensure_session(
    conn: &rusqlite::Connection,
    phone: &str,
    now: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO sessions (phone_number, created_at, updated_at)
         VALUES (?1, ?2, ?2)",
        params![phone, now],
    )?;
    Ok(())
}

/// Fetch a session by phone number, if one exists.
pub async fn get(db: &Database, phone: &str) -> Result<Option<Session>, SokoniError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE phone_number = ?1"),
                    params![phone],
                    session_from_row,
                )
                .optional()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch the session for `phone`, creating it lazily in MAIN_MENU with an
/// empty cart on first contact.
pub async fn get_or_create(db: &Database, phone: &str) -> Result<Session, SokoniError> {
    let phone = phone.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            ensure_session(conn, &phone, &now)?;
            let session = conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE phone_number = ?1"),
                params![phone],
                session_from_row,
            )?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a new flow value (state column + flow JSON) and bump `updated_at`.
pub async fn set_flow(db: &Database, phone: &str, flow: &Flow) -> Result<(), SokoniError> {
    let phone = phone.to_string();
    let state = flow.state().to_string();
    let flow_json = serde_json::to_string(flow)
        .map_err(|e| SokoniError::Internal(format!("flow serialization failed: {e}")))?;
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            ensure_session(conn, &phone, &now)?;
            conn.execute(
                "UPDATE sessions SET state = ?1, flow = ?2, updated_at = ?3
                 WHERE phone_number = ?4",
                params![state, flow_json, now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Merge one line into the cart (summing quantity and recomputing the line
/// total when the item is already present). Returns the resulting cart.
pub async fn add_cart_line(
    db: &Database,
    phone: &str,
    line: CartLine,
) -> Result<Vec<CartLine>, SokoniError> {
    let phone = phone.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            ensure_session(conn, &phone, &now)?;
            let cart_json: String = conn.query_row(
                "SELECT cart FROM sessions WHERE phone_number = ?1",
                params![phone],
                |row| row.get(0),
            )?;
            let mut cart: Vec<CartLine> = serde_json::from_str(&cart_json)
                .map_err(|e| domain_err(SokoniError::Internal(format!("corrupt cart: {e}"))))?;

            merge_cart_line(&mut cart, line);

            let cart_json = serde_json::to_string(&cart)
                .map_err(|e| domain_err(SokoniError::Internal(e.to_string())))?;
            conn.execute(
                "UPDATE sessions SET cart = ?1, updated_at = ?2 WHERE phone_number = ?3",
                params![cart_json, now, phone],
            )?;
            Ok(cart)
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the whole cart.
pub async fn save_cart(
    db: &Database,
    phone: &str,
    cart: &[CartLine],
) -> Result<(), SokoniError> {
    let phone = phone.to_string();
    let cart_json = serde_json::to_string(cart)
        .map_err(|e| SokoniError::Internal(format!("cart serialization failed: {e}")))?;
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            ensure_session(conn, &phone, &now)?;
            conn.execute(
                "UPDATE sessions SET cart = ?1, updated_at = ?2 WHERE phone_number = ?3",
                params![cart_json, now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Empty the cart.
pub async fn clear_cart(db: &Database, phone: &str) -> Result<(), SokoniError> {
    save_cart(db, phone, &[]).await
}

/// Record the transport id of the last processed inbound message.
/// Counts as customer activity, so the idle clock is bumped too.
pub async fn set_last_message_id(
    db: &Database,
    phone: &str,
    message_id: &str,
) -> Result<(), SokoniError> {
    let phone = phone.to_string();
    let message_id = message_id.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            ensure_session(conn, &phone, &now)?;
            conn.execute(
                "UPDATE sessions SET last_message_id = ?1, updated_at = ?2
                 WHERE phone_number = ?3",
                params![message_id, now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reset to MAIN_MENU with an empty cart ("start over").
pub async fn reset(db: &Database, phone: &str) -> Result<(), SokoniError> {
    let phone = phone.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            ensure_session(conn, &phone, &now)?;
            conn.execute(
                "UPDATE sessions
                 SET state = 'main_menu', flow = '{\"state\":\"main_menu\"}', cart = '[]',
                     updated_at = ?1
                 WHERE phone_number = ?2",
                params![now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions eligible for an abandoned-cart reminder: idle since before
/// `cutoff`, not mid-checkout, non-empty cart, and not reminded since
/// `cutoff`.
pub async fn find_abandoned(
    db: &Database,
    cutoff: &str,
) -> Result<Vec<Session>, SokoniError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE updated_at < ?1
                   AND state NOT IN ('entering_address', 'confirming_order')
                   AND json_array_length(cart) > 0
                   AND (last_reminder_at IS NULL OR last_reminder_at < ?1)"
            ))?;
            let rows = stmt.query_map(params![cutoff], session_from_row)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp the reminder timestamp. Deliberately does not touch `updated_at`;
/// the idle clock belongs to customer activity, not to our reminders.
pub async fn mark_reminded(db: &Database, phone: &str, at: &str) -> Result<(), SokoniError> {
    let phone = phone.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET last_reminder_at = ?1 WHERE phone_number = ?2",
                params![at, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Backdate a session's idle clock. Test support for the abandoned-cart sweep.
pub async fn set_updated_at(db: &Database, phone: &str, at: &str) -> Result<(), SokoniError> {
    let phone = phone.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE phone_number = ?2",
                params![at, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sokoni_core::types::SessionState;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn get_or_create_starts_in_main_menu() {
        let db = setup_db().await;
        let session = get_or_create(&db, "255700000001").await.unwrap();
        assert_eq!(session.flow, Flow::MainMenu);
        assert!(session.cart.is_empty());
        assert!(session.last_message_id.is_none());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let db = setup_db().await;
        let first = get_or_create(&db, "255700000001").await.unwrap();
        set_flow(&db, "255700000001", &Flow::Searching).await.unwrap();
        let second = get_or_create(&db, "255700000001").await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.flow, Flow::Searching);
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let db = setup_db().await;
        assert!(get(&db, "255799999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_flow_updates_state_column_and_blob() {
        let db = setup_db().await;
        let flow = Flow::AddingToCart { item_id: 12 };
        set_flow(&db, "p1", &flow).await.unwrap();

        let session = get(&db, "p1").await.unwrap().unwrap();
        assert_eq!(session.flow, flow);
        assert_eq!(session.flow.state(), SessionState::AddingToCart);
    }

    #[tokio::test]
    async fn add_cart_line_merges_by_item() {
        let db = setup_db().await;
        add_cart_line(&db, "p1", CartLine::new(1, "Bulb", 2, 1500.0, 1))
            .await
            .unwrap();
        let cart = add_cart_line(&db, "p1", CartLine::new(1, "Bulb", 3, 1500.0, 1))
            .await
            .unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 5);
        assert_eq!(cart[0].total_price, 7500.0);

        let session = get(&db, "p1").await.unwrap().unwrap();
        assert_eq!(session.cart, cart);
    }

    #[tokio::test]
    async fn clear_cart_empties_only_the_cart() {
        let db = setup_db().await;
        set_flow(&db, "p1", &Flow::CartReview).await.unwrap();
        add_cart_line(&db, "p1", CartLine::new(1, "Bulb", 2, 1500.0, 1))
            .await
            .unwrap();
        clear_cart(&db, "p1").await.unwrap();

        let session = get(&db, "p1").await.unwrap().unwrap();
        assert!(session.cart.is_empty());
        assert_eq!(session.flow, Flow::CartReview);
    }

    #[tokio::test]
    async fn reset_returns_to_main_menu_and_empties_cart() {
        let db = setup_db().await;
        set_flow(&db, "p1", &Flow::Searching).await.unwrap();
        add_cart_line(&db, "p1", CartLine::new(1, "Bulb", 2, 1500.0, 1))
            .await
            .unwrap();

        reset(&db, "p1").await.unwrap();

        let session = get(&db, "p1").await.unwrap().unwrap();
        assert_eq!(session.flow, Flow::MainMenu);
        assert!(session.cart.is_empty());
    }

    #[tokio::test]
    async fn find_abandoned_applies_all_filters() {
        let db = setup_db().await;
        let stale = "2026-01-01T00:00:00+00:00";
        let cutoff = "2026-01-02T00:00:00+00:00";

        // Idle cart, never reminded -- eligible.
        add_cart_line(&db, "idle", CartLine::new(1, "Bulb", 1, 1500.0, 1))
            .await
            .unwrap();
        set_updated_at(&db, "idle", stale).await.unwrap();

        // Idle but empty cart -- not eligible.
        get_or_create(&db, "empty").await.unwrap();
        set_updated_at(&db, "empty", stale).await.unwrap();

        // Idle cart but mid-checkout -- not eligible.
        add_cart_line(&db, "checkout", CartLine::new(1, "Bulb", 1, 1500.0, 1))
            .await
            .unwrap();
        set_flow(&db, "checkout", &Flow::EnteringAddress).await.unwrap();
        set_updated_at(&db, "checkout", stale).await.unwrap();

        // Idle cart, recently reminded -- not eligible.
        add_cart_line(&db, "reminded", CartLine::new(1, "Bulb", 1, 1500.0, 1))
            .await
            .unwrap();
        set_updated_at(&db, "reminded", stale).await.unwrap();
        mark_reminded(&db, "reminded", "2026-01-02T12:00:00+00:00")
            .await
            .unwrap();

        let found = find_abandoned(&db, cutoff).await.unwrap();
        let phones: Vec<_> = found.iter().map(|s| s.phone_number.as_str()).collect();
        assert_eq!(phones, vec!["idle"]);
    }

    #[tokio::test]
    async fn reminded_session_becomes_eligible_after_cooldown() {
        let db = setup_db().await;
        add_cart_line(&db, "p1", CartLine::new(1, "Bulb", 1, 1500.0, 1))
            .await
            .unwrap();
        set_updated_at(&db, "p1", "2026-01-01T00:00:00+00:00")
            .await
            .unwrap();
        mark_reminded(&db, "p1", "2026-01-01T06:00:00+00:00")
            .await
            .unwrap();

        // Reminder newer than this cutoff: suppressed.
        let found = find_abandoned(&db, "2026-01-01T05:00:00+00:00").await.unwrap();
        assert!(found.is_empty());

        // Cutoff past the reminder: eligible again.
        let found = find_abandoned(&db, "2026-01-02T07:00:00+00:00").await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn last_message_id_round_trips() {
        let db = setup_db().await;
        set_last_message_id(&db, "p1", "wamid.A1").await.unwrap();
        let session = get(&db, "p1").await.unwrap().unwrap();
        assert_eq!(session.last_message_id.as_deref(), Some("wamid.A1"));
    }
}
