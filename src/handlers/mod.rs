//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, the session principal)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code, or a redirect for the payment callback)

/// Health check endpoint
pub mod health;
/// Order processing endpoints
pub mod orders;
/// Payment initiation, callback and refund endpoints
pub mod payments;
/// Storefront endpoints
pub mod stores;
/// Wallet endpoints
pub mod wallet;
