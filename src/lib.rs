//! Storefront order, payment and refund engine.
//!
//! Orders are created from carts with row-locked stock deduction, paid and refunded through
//! an external [`provider::PaymentProvider`] in three phases, and reconciled by webhooks.
//! Every movement of money lands exactly once in the append-only ledger.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod http;
pub mod provider;
pub mod services;

pub use config::AppConfig;
pub use error::{CommerceError, Result};
