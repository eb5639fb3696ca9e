//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("No account linked to billing customer: {0}")]
    AccountNotLinked(String),

    #[error("Invalid subscription tier: {0}")]
    InvalidTier(String),

    #[error("Ledger change would drive credits negative")]
    InvalidDelta,

    #[error("Insufficient credits: {balance} available, {required} required")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("Subscription is not active")]
    SubscriptionInactive,

    #[error("No active subscription for this account")]
    NoActiveSubscription,

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
