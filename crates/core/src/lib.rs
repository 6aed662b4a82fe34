//! Atelier Core - Shared domain types.
//!
//! This crate provides the types shared by the Atelier data layer and its
//! consumers:
//! - `atelier-data` - Store access, code allocation and the live mirror
//! - presentation layers that render clients, orders and staff
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no store access, no async
//! runtime. Records here are the decoded form of documents held by the
//! remote store; field names follow the store's camelCase wire format.
//!
//! # Modules
//!
//! - [`types`] - Typed ids, owner identity, client codes, prices, statuses
//!   and the records for each entity kind

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
