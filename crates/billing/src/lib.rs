// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError carries context strings from Stripe
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ResumeLens Billing Module
//!
//! Handles Stripe integration for subscriptions and the credit ledger.
//!
//! ## Features
//!
//! - **Plan Catalog**: Tier transitions and the credit grant for each one
//! - **Credit Ledger**: Atomic credit grants and debits against the account row
//! - **Reconciliation**: Maps Stripe subscription/invoice events onto account state
//! - **Checkout**: Hosted checkout for new subscribers, in-place price change for existing ones
//! - **Customer Portal**: Self-serve subscription management
//! - **Usage Gate**: Metered debits for resume extraction
//! - **Webhooks**: Signature verification and per-event dedup

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod events;
pub mod ledger;
pub mod portal;
pub mod reconcile;
pub mod usage;
pub mod webhooks;

// Catalog
pub use catalog::{PlanCatalog, TransitionDecision, DEFAULT_CREDITS_PER_EXTRACTION};

// Checkout
pub use checkout::{CheckoutOutcome, CheckoutService};

// Client
pub use client::{PriceIds, StripeClient, StripeConfig};

// Customer
pub use customer::CustomerService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{ActorType, BillingEvent, BillingEventLogger, BillingEventType};

// Ledger
pub use ledger::{LedgerChange, LedgerStore};

// Portal
pub use portal::PortalService;

// Reconciliation
pub use reconcile::ReconciliationEngine;

// Usage
pub use usage::UsageGate;

// Webhooks
pub use webhooks::WebhookHandler;
