// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the webhook and the admin order API.
//!
//! The webhook intake always acknowledges quickly with 200: message
//! handling runs in detached tasks, and even malformed or unverifiable
//! payloads are acknowledged (and logged) so the transport never retries
//! because of downstream business failures.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use sokoni_core::types::OrderStatus;
use sokoni_core::SokoniError;
use sokoni_whatsapp::webhook;
use tracing::{debug, warn};

use crate::server::AppState;

/// Query parameters of the Meta webhook verification handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Body for `PUT /orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps domain errors onto HTTP statuses for the admin API.
fn error_response(err: SokoniError) -> Response {
    let status = match &err {
        SokoniError::NotFound { .. } => StatusCode::NOT_FOUND,
        SokoniError::InsufficientStock { .. } | SokoniError::InvalidState(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// The verification handshake decision, separated from axum for testing.
pub(crate) fn check_verification(
    params: &VerifyParams,
    expected_token: Option<&str>,
) -> Result<String, StatusCode> {
    let (Some(mode), Some(token)) = (params.mode.as_deref(), params.verify_token.as_deref())
    else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let Some(expected) = expected_token else {
        return Err(StatusCode::FORBIDDEN);
    };

    if mode == "subscribe" && token == expected {
        Ok(params.challenge.clone().unwrap_or_default())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// GET /webhook -- Meta calls this once to verify the webhook URL.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match check_verification(&params, state.verify_token.as_deref()) {
        Ok(challenge) => {
            debug!("webhook verified");
            challenge.into_response()
        }
        Err(status) => {
            warn!(status = %status, "webhook verification failed");
            status.into_response()
        }
    }
}

/// POST /webhook -- inbound message batches.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    let ack = Json(serde_json::json!({ "status": "ok" }));

    // Signature check only applies when an app secret is configured.
    if let Some(secret) = state.app_secret.as_deref() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !webhook::verify_signature(secret, &body, signature) {
            warn!("webhook payload failed signature verification, dropping");
            return ack;
        }
    }

    let payload: webhook::WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "unparseable webhook payload, dropping");
            return ack;
        }
    };

    if !webhook::is_whatsapp_payload(&payload) {
        warn!(object = %payload.object, "unexpected webhook object type, dropping");
        return ack;
    }

    for status in webhook::extract_statuses(&payload) {
        debug!(
            message_id = %status.id,
            status = %status.status,
            recipient = status.recipient_id.as_deref().unwrap_or(""),
            "delivery status update"
        );
    }

    // Handle each message off the request path; the transport only needs
    // the acknowledgement.
    for message in webhook::extract_messages(&payload) {
        let engine = state.engine.clone();
        tokio::spawn(async move {
            engine.handle_inbound(message).await;
        });
    }

    ack
}

/// GET /orders
pub async fn list_orders(State(state): State<AppState>) -> Response {
    match state.orders.find_all().await {
        Ok(orders) => Json(orders).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /orders/{id}
pub async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.orders.find_one(id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /orders/phone/{phone}
pub async fn get_orders_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Response {
    match state.orders.find_by_phone(&phone).await {
        Ok(orders) => Json(orders).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Response {
    match state.orders.update_status(id, body.status).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /orders/{id}/cancel
pub async fn cancel_order(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.orders.cancel_order(id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /orders/stats
pub async fn order_stats(State(state): State<AppState>) -> Response {
    match state.orders.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /product-link/{item_id} -- wa.me deep link for embedding outside chat.
pub async fn product_link(State(state): State<AppState>, Path(item_id): Path<i64>) -> Response {
    match state.engine.product_link(item_id).await {
        Ok(link) => Json(link).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerifyParams {
        VerifyParams {
            mode: mode.map(str::to_string),
            verify_token: token.map(str::to_string),
            challenge: challenge.map(str::to_string),
        }
    }

    #[test]
    fn verification_echoes_challenge_on_match() {
        let result = check_verification(
            &params(Some("subscribe"), Some("hook-secret"), Some("12345")),
            Some("hook-secret"),
        );
        assert_eq!(result.unwrap(), "12345");
    }

    #[test]
    fn verification_rejects_wrong_token() {
        let result = check_verification(
            &params(Some("subscribe"), Some("wrong"), Some("12345")),
            Some("hook-secret"),
        );
        assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn verification_rejects_missing_params() {
        let result = check_verification(&params(None, None, None), Some("hook-secret"));
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn verification_rejects_when_unconfigured() {
        let result = check_verification(
            &params(Some("subscribe"), Some("anything"), Some("1")),
            None,
        );
        assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn update_status_request_deserializes_snake_case() {
        let body: UpdateStatusRequest =
            serde_json::from_str(r#"{"status":"ready"}"#).unwrap();
        assert_eq!(body.status, OrderStatus::Ready);
        assert!(serde_json::from_str::<UpdateStatusRequest>(r#"{"status":"READY"}"#).is_err());
    }

    #[test]
    fn error_mapping_by_variant() {
        let not_found = error_response(SokoniError::not_found("order", 1));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = error_response(SokoniError::InvalidState("already delivered".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let stock = error_response(SokoniError::InsufficientStock {
            item: "Bulb".into(),
            available: 0,
            requested: 2,
        });
        assert_eq!(stock.status(), StatusCode::BAD_REQUEST);

        let internal = error_response(SokoniError::Internal("boom".into()));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
