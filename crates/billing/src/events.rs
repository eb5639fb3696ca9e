//! Billing Events Module
//!
//! Provides append-only billing event logging for audit trails and debugging.
//! Events capture all billing operations and can be used to:
//! - Answer "why is this user on this tier / at this balance?" questions
//! - Reconstruct billing history
//! - Compliance and audit requirements
//!
//! Logging failures are reported as warnings by callers and never abort the
//! ledger mutation they describe.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    // Plan/credit changes
    TierChanged,
    CreditsDebited,

    // Invoicing
    InvoicePaid,

    // Customer lifecycle
    CustomerCreated,
    CheckoutStarted,
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventType::TierChanged => "TIER_CHANGED",
            BillingEventType::CreditsDebited => "CREDITS_DEBITED",
            BillingEventType::InvoicePaid => "INVOICE_PAID",
            BillingEventType::CustomerCreated => "CUSTOMER_CREATED",
            BillingEventType::CheckoutStarted => "CHECKOUT_STARTED",
        };
        write!(f, "{}", s)
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// End user through the app
    User,
    /// System automation
    System,
    /// Stripe webhook
    Stripe,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::System => write!(f, "system"),
            ActorType::Stripe => write!(f, "stripe"),
        }
    }
}

/// A billing event record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub stripe_event_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub actor_type: String,
    pub created_at: OffsetDateTime,
}

/// Builder for creating billing events
pub struct BillingEventBuilder {
    user_id: Uuid,
    event_type: BillingEventType,
    event_data: serde_json::Value,
    stripe_event_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_customer_id: Option<String>,
    actor_type: ActorType,
}

impl BillingEventBuilder {
    /// Create a new event builder
    pub fn new(user_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            user_id,
            event_type,
            event_data: serde_json::json!({}),
            stripe_event_id: None,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            actor_type: ActorType::System,
        }
    }

    /// Set the event data
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    /// Set the Stripe event ID
    pub fn stripe_event(mut self, event_id: impl Into<String>) -> Self {
        self.stripe_event_id = Some(event_id.into());
        self
    }

    /// Set the Stripe subscription ID
    pub fn stripe_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the Stripe customer ID
    pub fn stripe_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.stripe_customer_id = Some(customer_id.into());
        self
    }

    /// Set the actor type
    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }
}

/// Service for logging and querying billing events
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log a billing event
    pub async fn log_event(&self, builder: BillingEventBuilder) -> BillingResult<Uuid> {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO billing_events (
                user_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id,
                actor_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(builder.user_id)
        .bind(builder.event_type.to_string())
        .bind(&builder.event_data)
        .bind(&builder.stripe_event_id)
        .bind(&builder.stripe_subscription_id)
        .bind(&builder.stripe_customer_id)
        .bind(builder.actor_type.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id.0)
    }

    /// Get recent events for a user
    pub async fn get_events_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<BillingEvent>> {
        let events: Vec<BillingEvent> = sqlx::query_as(
            r#"
            SELECT
                id,
                user_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id,
                actor_type,
                created_at
            FROM billing_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

/// Convenience functions for common event logging scenarios
impl BillingEventLogger {
    /// Log a tier change applied by the reconciliation engine
    pub async fn log_tier_change(
        &self,
        user_id: Uuid,
        from_tier: &str,
        to_tier: &str,
        credit_delta: i64,
        stripe_event_id: Option<&str>,
        stripe_subscription_id: Option<&str>,
    ) -> BillingResult<Uuid> {
        let mut builder = BillingEventBuilder::new(user_id, BillingEventType::TierChanged)
            .data(serde_json::json!({
                "from_tier": from_tier,
                "to_tier": to_tier,
                "credit_delta": credit_delta,
            }))
            .actor_type(ActorType::Stripe);

        if let Some(event_id) = stripe_event_id {
            builder = builder.stripe_event(event_id);
        }
        if let Some(sub_id) = stripe_subscription_id {
            builder = builder.stripe_subscription(sub_id);
        }

        self.log_event(builder).await
    }

    /// Log an invoice paid event
    pub async fn log_invoice_paid(
        &self,
        user_id: Uuid,
        stripe_event_id: &str,
        stripe_subscription_id: Option<&str>,
        credit_delta: i64,
    ) -> BillingResult<Uuid> {
        let mut builder = BillingEventBuilder::new(user_id, BillingEventType::InvoicePaid)
            .data(serde_json::json!({
                "credit_delta": credit_delta,
            }))
            .stripe_event(stripe_event_id)
            .actor_type(ActorType::Stripe);

        if let Some(sub_id) = stripe_subscription_id {
            builder = builder.stripe_subscription(sub_id);
        }

        self.log_event(builder).await
    }

    /// Log a usage debit
    pub async fn log_credits_debited(
        &self,
        user_id: Uuid,
        amount: i64,
        remaining: i64,
    ) -> BillingResult<Uuid> {
        let builder = BillingEventBuilder::new(user_id, BillingEventType::CreditsDebited)
            .data(serde_json::json!({
                "amount": amount,
                "remaining": remaining,
            }))
            .actor_type(ActorType::User);

        self.log_event(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_event_type_display() {
        assert_eq!(BillingEventType::TierChanged.to_string(), "TIER_CHANGED");
        assert_eq!(BillingEventType::InvoicePaid.to_string(), "INVOICE_PAID");
        assert_eq!(
            BillingEventType::CreditsDebited.to_string(),
            "CREDITS_DEBITED"
        );
    }

    #[test]
    fn test_actor_type_display() {
        assert_eq!(ActorType::User.to_string(), "user");
        assert_eq!(ActorType::System.to_string(), "system");
        assert_eq!(ActorType::Stripe.to_string(), "stripe");
    }

    #[test]
    fn test_event_builder() {
        let user_id = Uuid::new_v4();
        let builder = BillingEventBuilder::new(user_id, BillingEventType::TierChanged)
            .data(serde_json::json!({"test": true}))
            .stripe_subscription("sub_123")
            .actor_type(ActorType::Stripe);

        assert_eq!(builder.user_id, user_id);
        assert_eq!(builder.event_type, BillingEventType::TierChanged);
        assert_eq!(builder.stripe_subscription_id, Some("sub_123".to_string()));
        assert_eq!(builder.actor_type, ActorType::Stripe);
    }
}
