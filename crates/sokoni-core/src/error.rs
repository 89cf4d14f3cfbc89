// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Sokoni commerce engine.

use thiserror::Error;

/// The primary error type used across all Sokoni crates.
#[derive(Debug, Error)]
pub enum SokoniError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Outbound transport errors (message delivery, read receipts).
    #[error("send failure: {message}")]
    Send {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested quantity exceeds what the warehouse holds.
    #[error("insufficient stock for {item}: available {available}, requested {requested}")]
    InsufficientStock {
        item: String,
        available: i64,
        requested: i64,
    },

    /// An operation is not valid for the current state of an entity
    /// (no active price, terminal order status, malformed rating, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SokoniError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SokoniError::Storage {
            source: Box::new(source),
        }
    }

    /// Builds a `NotFound` for an integer-keyed entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SokoniError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stock_counts() {
        let err = SokoniError::InsufficientStock {
            item: "Solar Panel 150W".into(),
            available: 2,
            requested: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("Solar Panel 150W"));
        assert!(msg.contains("available 2"));
        assert!(msg.contains("requested 5"));
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = SokoniError::not_found("order", 42);
        assert_eq!(err.to_string(), "order not found: 42");
    }

    #[test]
    fn storage_wraps_source() {
        let err = SokoniError::storage(std::io::Error::other("disk gone"));
        assert!(err.to_string().contains("disk gone"));
    }
}
