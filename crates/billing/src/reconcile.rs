//! Subscription-to-credits reconciliation
//!
//! Maps verified Stripe events onto an account's plan tier and credit
//! balance. Events describe observed subscription state, not deltas, so the
//! same event can be delivered twice (or out of order) without double
//! granting: the catalog's transition table yields a zero delta for repeats.
//!
//! Errors returned here propagate to the webhook route, which answers
//! non-2xx so Stripe redelivers. There are no internal retry loops around
//! mutations; only the read-only subscription-listing fallback retries.

use resumelens_shared::PlanTier;
use stripe::{CustomerId, Expandable, Invoice, ListSubscriptions, Subscription};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::catalog::PlanCatalog;
use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::BillingEventLogger;
use crate::ledger::{LedgerChange, LedgerStore};

const LOOKUP_RETRY_DELAY_MS: u64 = 500;
const LOOKUP_RETRY_ATTEMPTS: usize = 3;

/// Reconciliation engine: the only writer of plan tier and credit grants
#[derive(Clone)]
pub struct ReconciliationEngine {
    stripe: StripeClient,
    ledger: LedgerStore,
    catalog: PlanCatalog,
    event_logger: BillingEventLogger,
}

impl ReconciliationEngine {
    pub fn new(
        stripe: StripeClient,
        ledger: LedgerStore,
        catalog: PlanCatalog,
        event_logger: BillingEventLogger,
    ) -> Self {
        Self {
            stripe,
            ledger,
            catalog,
            event_logger,
        }
    }

    /// Reconcile a subscription created/updated event against the ledger
    pub async fn reconcile_subscription(
        &self,
        stripe_event_id: &str,
        subscription: &Subscription,
    ) -> BillingResult<()> {
        let customer_id = customer_ref(&subscription.customer);

        // An unpriced subscription can never map to a tier; failing here would
        // make Stripe redeliver an event that can never apply, so ack it.
        let Some(price_id) = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string())
        else {
            tracing::warn!(
                customer_id = %customer_id,
                subscription_id = %subscription.id,
                "Subscription event has no priced items, skipping"
            );
            return Ok(());
        };

        let incoming = match self.stripe.config().tier_for_price_id(&price_id) {
            Some(tier) => tier,
            None => {
                // An unrecognized price must not touch the ledger. Logged so
                // a catalog/config drift shows up in the logs, then acked so
                // Stripe stops redelivering something we will never act on.
                tracing::warn!(
                    customer_id = %customer_id,
                    price_id = %price_id,
                    subscription_id = %subscription.id,
                    "Unknown price on subscription event, skipping"
                );
                return Ok(());
            }
        };

        self.apply_transition(
            stripe_event_id,
            &customer_id,
            Some(subscription.id.as_str()),
            incoming,
        )
        .await
    }

    /// Reconcile a subscription deleted event: the account returns to Free.
    /// Remaining credits are preserved; they were granted for a paid period.
    pub async fn reconcile_cancellation(
        &self,
        stripe_event_id: &str,
        subscription: &Subscription,
    ) -> BillingResult<()> {
        let customer_id = customer_ref(&subscription.customer);
        self.apply_transition(
            stripe_event_id,
            &customer_id,
            Some(subscription.id.as_str()),
            PlanTier::Free,
        )
        .await
    }

    /// Reconcile an invoice.paid event
    ///
    /// The invoice's subscription reference is the tier source. Some invoices
    /// arrive without one (early checkout invoices in particular), so we fall
    /// back to listing the customer's active subscriptions and taking the
    /// most recent. No subscription at all is a benign no-op: a zero-amount
    /// or one-off invoice carries no plan consequence.
    pub async fn reconcile_invoice_paid(
        &self,
        stripe_event_id: &str,
        invoice: &Invoice,
    ) -> BillingResult<()> {
        let customer_id = match &invoice.customer {
            Some(customer) => customer_ref(customer),
            None => {
                tracing::warn!(
                    invoice_id = %invoice.id,
                    "Invoice has no customer, skipping"
                );
                return Ok(());
            }
        };

        let subscription = match &invoice.subscription {
            Some(Expandable::Object(subscription)) => Some((**subscription).clone()),
            Some(Expandable::Id(id)) => {
                let subscription = self
                    .stripe
                    .call(Subscription::retrieve(self.stripe.inner(), id, &[]))
                    .await?;
                Some(subscription)
            }
            None => self.find_active_subscription(&customer_id).await?,
        };

        let subscription = match subscription {
            Some(subscription) => subscription,
            None => {
                tracing::info!(
                    customer_id = %customer_id,
                    invoice_id = %invoice.id,
                    "Invoice paid with no associated subscription, nothing to reconcile"
                );
                return Ok(());
            }
        };

        self.reconcile_subscription(stripe_event_id, &subscription)
            .await?;

        if let Some(account) = self.ledger.find_by_customer(&customer_id).await? {
            if let Err(e) = self
                .event_logger
                .log_invoice_paid(
                    account.id,
                    stripe_event_id,
                    Some(subscription.id.as_str()),
                    0,
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to log invoice paid event");
            }
        }

        Ok(())
    }

    /// Look up the tier, compute the transition, and land it in one ledger call
    async fn apply_transition(
        &self,
        stripe_event_id: &str,
        customer_id: &str,
        stripe_subscription_id: Option<&str>,
        incoming: PlanTier,
    ) -> BillingResult<()> {
        let account = self
            .ledger
            .find_by_customer(customer_id)
            .await?
            .ok_or_else(|| {
                // Data-integrity problem: Stripe knows a customer we don't.
                // Fail the event so Stripe retries; if the link appears later
                // (checkout race), a redelivery will land cleanly.
                tracing::warn!(
                    customer_id = %customer_id,
                    "Billing event for customer with no linked account"
                );
                BillingError::AccountNotLinked(customer_id.to_string())
            })?;

        let decision = self.catalog.transition(account.plan_tier, incoming);

        if decision.target == account.plan_tier && decision.credit_delta == 0 {
            tracing::debug!(
                user_id = %account.id,
                plan_tier = %account.plan_tier,
                "Transition is a no-op, ledger untouched"
            );
            return Ok(());
        }

        let updated = self
            .ledger
            .apply_change(
                account.id,
                LedgerChange {
                    plan_tier: Some(decision.target),
                    credit_delta: decision.credit_delta,
                },
            )
            .await?;

        if let Err(e) = self
            .event_logger
            .log_tier_change(
                account.id,
                &account.plan_tier.to_string(),
                &decision.target.to_string(),
                decision.credit_delta,
                Some(stripe_event_id),
                stripe_subscription_id,
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log tier change event");
        }

        tracing::info!(
            user_id = %account.id,
            from_tier = %account.plan_tier,
            to_tier = %decision.target,
            credit_delta = decision.credit_delta,
            credits = updated.credits,
            "Reconciled subscription state"
        );

        Ok(())
    }

    /// List the customer's subscriptions and return the most recent active one
    ///
    /// Read-only and idempotent, so a small fixed-backoff retry is safe here.
    async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<Subscription>> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let retry_strategy =
            FixedInterval::from_millis(LOOKUP_RETRY_DELAY_MS).take(LOOKUP_RETRY_ATTEMPTS);

        let subscriptions = Retry::start(retry_strategy, || async {
            let params = ListSubscriptions {
                customer: Some(customer_id.clone()),
                ..Default::default()
            };
            self.stripe
                .call(Subscription::list(self.stripe.inner(), &params))
                .await
        })
        .await?;

        let mut active: Vec<Subscription> = subscriptions
            .data
            .into_iter()
            .filter(|s| s.status == stripe::SubscriptionStatus::Active)
            .collect();
        active.sort_by_key(|s| std::cmp::Reverse(s.created));

        Ok(active.into_iter().next())
    }
}

fn customer_ref(customer: &Expandable<stripe::Customer>) -> String {
    match customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(c) => c.id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PriceIds, StripeConfig};
    use stripe::{List, Price, SubscriptionItem};

    // No network, no database: connect_lazy never opens a connection and the
    // paths under test return before any query or Stripe call.
    fn test_engine() -> ReconciliationEngine {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/never_connected")
            .unwrap();
        let stripe = StripeClient::new(StripeConfig {
            secret_key: "sk_test_offline".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: PriceIds {
                basic: "price_basic_123".to_string(),
                pro: "price_pro_456".to_string(),
            },
            app_base_url: "http://localhost:3000".to_string(),
        });
        ReconciliationEngine::new(
            stripe,
            LedgerStore::new(pool.clone()),
            PlanCatalog::default(),
            BillingEventLogger::new(pool),
        )
    }

    fn subscription_with_price(price_id: Option<&str>) -> Subscription {
        let items = match price_id {
            Some(price_id) => {
                let price = Price {
                    id: price_id.parse().unwrap(),
                    ..Default::default()
                };
                List {
                    data: vec![SubscriptionItem {
                        price: Some(price),
                        ..Default::default()
                    }],
                    ..Default::default()
                }
            }
            None => List::default(),
        };
        Subscription {
            id: "sub_test_1".parse().unwrap(),
            customer: Expandable::Id("cus_test_1".parse().unwrap()),
            items,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unpriced_subscription_event_is_acked_noop() {
        let engine = test_engine();
        let subscription = subscription_with_price(None);

        // Must not fail: a non-2xx would make Stripe redeliver an event that
        // can never map to a tier
        let result = engine
            .reconcile_subscription("evt_test_1", &subscription)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_price_event_is_acked_noop() {
        let engine = test_engine();
        let subscription = subscription_with_price(Some("price_legacy_999"));

        let result = engine
            .reconcile_subscription("evt_test_2", &subscription)
            .await;
        assert!(result.is_ok());
    }
}
