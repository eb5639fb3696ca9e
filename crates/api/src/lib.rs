// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ResumeLens API Library
//!
//! HTTP surface for the ResumeLens backend: auth, credit balance, billing
//! (checkout, portal, Stripe webhooks), and metered resume extraction.

pub mod auth;
pub mod config;
pub mod error;
pub mod extraction;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
