//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own transaction scopes, validation and state transitions, and reach
//! storage only through the [`crate::db::Database`] seam.

pub mod callback_service;
pub mod notification_service;
pub mod order_service;
pub mod payment_handlers;
pub mod payment_service;
pub mod store_service;
pub mod subdomain;
pub mod wallet_service;
