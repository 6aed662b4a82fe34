//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for the studio's domain concepts
//! and the records stored for each entity kind.

pub mod client;
pub mod code;
pub mod employee;
pub mod id;
pub mod order;
pub mod price;
pub mod service;
pub mod status;
pub mod template;

pub use client::{Client, ClientLink, ClientPatch, NewClient};
pub use code::{ClientCode, CodeError, PinCode};
pub use employee::{Employee, EmployeePatch, NewEmployee};
pub use id::*;
pub use order::{NewOrder, Order, OrderPatch};
pub use price::{CurrencyCode, Price};
pub use service::{NewService, Service, ServicePatch};
pub use status::OrderStatus;
pub use template::{NewTemplate, Template, TemplatePatch};
