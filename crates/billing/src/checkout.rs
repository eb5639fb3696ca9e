//! Stripe Checkout sessions and in-place plan changes
//!
//! The orchestrator only starts payment flows; it never mutates credits or
//! tiers. The ledger consequences of a purchase land later, when Stripe's
//! webhook reaches the reconciliation engine.

use resumelens_shared::PlanTier;
// The crate root re-exports a same-named enum from subscription_item; the
// UpdateSubscription field wants this one.
use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CustomerId, ListSubscriptions, Subscription, UpdateSubscription, UpdateSubscriptionItems,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// The outcome of starting a plan purchase
#[derive(Debug, serde::Serialize)]
pub struct CheckoutOutcome {
    /// URL the user should be sent to, when a new checkout session was created
    pub url: Option<String>,
    /// True when an existing subscription was updated in place instead
    pub updated_in_place: bool,
}

/// Checkout service for starting subscriptions and plan changes
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    customers: CustomerService,
    event_logger: BillingEventLogger,
}

impl CheckoutService {
    pub fn new(
        stripe: StripeClient,
        customers: CustomerService,
        event_logger: BillingEventLogger,
    ) -> Self {
        Self {
            stripe,
            customers,
            event_logger,
        }
    }

    /// Start a purchase of `target_tier` for the user
    ///
    /// If the customer already has an active subscription, it is moved to the
    /// target price in place with prorations, so a plan change never stacks a
    /// second subscription. Otherwise a subscription-mode Checkout Session is
    /// created and its URL returned.
    pub async fn start_checkout_or_change(
        &self,
        user_id: Uuid,
        target_tier: PlanTier,
    ) -> BillingResult<CheckoutOutcome> {
        let price_id = self
            .stripe
            .config()
            .price_id_for_tier(target_tier)
            .ok_or_else(|| BillingError::InvalidTier(target_tier.to_string()))?
            .to_string();

        let customer_id = self.customers.get_or_create_customer(user_id).await?;

        if let Some(subscription) = self.find_active_subscription(&customer_id).await? {
            self.change_subscription_price(user_id, &subscription, &price_id, target_tier)
                .await?;
            return Ok(CheckoutOutcome {
                url: None,
                updated_in_place: true,
            });
        }

        let session = self
            .create_subscription_checkout(user_id, &customer_id, &price_id, target_tier)
            .await?;

        Ok(CheckoutOutcome {
            url: session.url,
            updated_in_place: false,
        })
    }

    /// Create a subscription-mode checkout session for a new subscription
    async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        customer_id: &str,
        price_id: &str,
        tier: PlanTier,
    ) -> BillingResult<CheckoutSession> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/dashboard/settings?session_id={{CHECKOUT_SESSION_ID}}",
            base_url
        );
        let cancel_url = format!("{}/dashboard/settings", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("tier".to_string(), tier.to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            ..Default::default()
        };

        let session = self
            .stripe
            .call(CheckoutSession::create(self.stripe.inner(), params))
            .await?;

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, BillingEventType::CheckoutStarted)
                    .data(serde_json::json!({
                        "tier": tier.to_string(),
                        "session_id": session.id.to_string(),
                    }))
                    .actor_type(ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log checkout started event");
        }

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            tier = %tier,
            "Created checkout session"
        );

        Ok(session)
    }

    /// Move an active subscription to a new price in place, with prorations
    async fn change_subscription_price(
        &self,
        user_id: Uuid,
        subscription: &Subscription,
        price_id: &str,
        tier: PlanTier,
    ) -> BillingResult<()> {
        let item_id = subscription
            .items
            .data
            .first()
            .map(|item| item.id.to_string())
            .ok_or_else(|| BillingError::Internal("No subscription items found".to_string()))?;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("tier".to_string(), tier.to_string());

        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item_id),
                price: Some(price_id.to_string()),
                ..Default::default()
            }]),
            metadata: Some(metadata),
            // Charge the prorated difference so upgrades are paid now
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        let updated = self
            .stripe
            .call(Subscription::update(
                self.stripe.inner(),
                &subscription.id,
                params,
            ))
            .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %updated.id,
            tier = %tier,
            "Updated subscription in place"
        );

        Ok(())
    }

    async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<Subscription>> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let params = ListSubscriptions {
            customer: Some(customer_id),
            ..Default::default()
        };

        let subscriptions = self
            .stripe
            .call(Subscription::list(self.stripe.inner(), &params))
            .await?;

        Ok(subscriptions
            .data
            .into_iter()
            .find(|s| s.status == stripe::SubscriptionStatus::Active))
    }
}
