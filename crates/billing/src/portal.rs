//! Stripe Billing Portal

use stripe::{
    BillingPortalSession, CreateBillingPortalSession, CustomerId, ListSubscriptions, Subscription,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};

/// Portal service for Stripe billing portal sessions
#[derive(Clone)]
pub struct PortalService {
    stripe: StripeClient,
    customers: CustomerService,
}

impl PortalService {
    pub fn new(stripe: StripeClient, customers: CustomerService) -> Self {
        Self { stripe, customers }
    }

    /// Create a billing portal session for the user
    ///
    /// Portal access requires an active subscription: a user with no linked
    /// customer or no active subscription gets `NoActiveSubscription` rather
    /// than an empty portal.
    pub async fn create_portal_session(
        &self,
        user_id: Uuid,
    ) -> BillingResult<BillingPortalSession> {
        let customer_id = self.customers.get_customer_id(user_id).await?;

        if !self.has_active_subscription(&customer_id).await? {
            return Err(BillingError::NoActiveSubscription);
        }

        let return_url = format!(
            "{}/dashboard/settings",
            self.stripe.config().app_base_url
        );

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&return_url);

        let session = self
            .stripe
            .call(BillingPortalSession::create(self.stripe.inner(), params))
            .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %session.customer,
            "Created billing portal session"
        );

        Ok(session)
    }

    async fn has_active_subscription(&self, customer_id: &CustomerId) -> BillingResult<bool> {
        let params = ListSubscriptions {
            customer: Some(customer_id.clone()),
            ..Default::default()
        };

        let subscriptions = self
            .stripe
            .call(Subscription::list(self.stripe.inner(), &params))
            .await?;

        Ok(subscriptions
            .data
            .iter()
            .any(|s| s.status == stripe::SubscriptionStatus::Active))
    }
}
