//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies built from them.

/// Monetary amounts in minor units
pub mod money;
/// Orders and their lifecycle
pub mod order;
/// Payment records, purposes and callback redirects
pub mod payment;
/// Reseller storefronts
pub mod store;
/// Users and the authenticated principal
pub mod user;
/// Wallet ledger
pub mod wallet;
