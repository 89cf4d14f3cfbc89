// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Sokoni workspace.
//!
//! Provides [`MockGateway`], an `OutboundGateway` that captures sends for
//! assertion, and catalog fixtures for integration tests.

pub mod fixtures;
pub mod mock_gateway;

pub use fixtures::{seed_catalog, CatalogFixture};
pub use mock_gateway::{MockGateway, SentMessage};
