//! Stripe customer management

use stripe::{CreateCustomer, Customer, CustomerId};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::ledger::LedgerStore;

/// Customer service for managing Stripe customers
#[derive(Clone)]
pub struct CustomerService {
    stripe: StripeClient,
    ledger: LedgerStore,
    event_logger: BillingEventLogger,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, ledger: LedgerStore, event_logger: BillingEventLogger) -> Self {
        Self {
            stripe,
            ledger,
            event_logger,
        }
    }

    /// Create or get the Stripe customer for an account
    ///
    /// The customer is created lazily on first use. Two requests racing
    /// through here may both create a customer at Stripe, but only the first
    /// `link_customer` claim wins; the loser re-reads the stored id, so the
    /// account never observes more than one linked customer.
    pub async fn get_or_create_customer(&self, user_id: Uuid) -> BillingResult<String> {
        let account = self.ledger.get_account(user_id).await?;

        if let Some(customer_id) = account.stripe_customer_id {
            return Ok(customer_id);
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("platform".to_string(), "resumelens".to_string());

        let params = CreateCustomer {
            email: Some(&account.email),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = self
            .stripe
            .call(Customer::create(self.stripe.inner(), params))
            .await?;

        if self
            .ledger
            .link_customer(user_id, customer.id.as_str())
            .await?
        {
            tracing::info!(
                user_id = %user_id,
                customer_id = %customer.id,
                "Created and linked Stripe customer"
            );

            if let Err(e) = self
                .event_logger
                .log_event(
                    BillingEventBuilder::new(user_id, BillingEventType::CustomerCreated)
                        .stripe_customer(customer.id.as_str()),
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to log customer created event");
            }

            return Ok(customer.id.to_string());
        }

        // Lost the race: another request linked a customer first. Use theirs.
        tracing::info!(
            user_id = %user_id,
            orphaned_customer_id = %customer.id,
            "Lost customer-link race, using previously linked customer"
        );

        let account = self.ledger.get_account(user_id).await?;
        account
            .stripe_customer_id
            .ok_or_else(|| BillingError::Internal("customer link vanished after race".to_string()))
    }

    /// Get the Stripe customer ID for an account, failing if none is linked
    pub async fn get_customer_id(&self, user_id: Uuid) -> BillingResult<CustomerId> {
        let account = self.ledger.get_account(user_id).await?;

        match account.stripe_customer_id {
            Some(id) => id
                .parse::<CustomerId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e))),
            None => Err(BillingError::NoActiveSubscription),
        }
    }
}
