// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the shared [`crate::Database`].

pub mod catalog;
pub mod customers;
pub mod orders;
pub mod sessions;
