//! # Card Wallet Hex
//!
//! Application service layer and HTTP adapter for the card wallet ledger.
//!
//! ## Architecture
//!
//! - `service/` - Workflows (fees, wallets, deposits, card provisioning and funding,
//!   admin adjustments, webhook reconciliation)
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `R: LedgerRepository` and `P: CardProviderClient`, so the
//! persistence adapter and the card issuer are injected at compile time.

pub mod inbound;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use service::{CardWalletService, ServicePolicy};
