//! Usage gate
//!
//! Debits credits for metered actions (resume extractions) and optionally
//! confirms the account's subscription is still active at Stripe before
//! allowing paid-tier work.

use resumelens_shared::PlanTier;
use stripe::{CustomerId, ListSubscriptions, Subscription};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::BillingEventLogger;
use crate::ledger::LedgerStore;

/// Usage gate: the only writer of credit debits
#[derive(Clone)]
pub struct UsageGate {
    stripe: StripeClient,
    ledger: LedgerStore,
    event_logger: BillingEventLogger,
}

impl UsageGate {
    pub fn new(stripe: StripeClient, ledger: LedgerStore, event_logger: BillingEventLogger) -> Self {
        Self {
            stripe,
            ledger,
            event_logger,
        }
    }

    /// Debit credits for one metered action, returning the remaining balance
    ///
    /// The debit is atomic: a shortfall fails with `InsufficientCredits`
    /// (carrying the current balance and the amount required), never a
    /// partial or clamped deduction.
    pub async fn debit(&self, user_id: Uuid, amount: i64) -> BillingResult<i64> {
        let remaining = self.ledger.debit(user_id, amount).await?;

        if let Err(e) = self
            .event_logger
            .log_credits_debited(user_id, amount, remaining)
            .await
        {
            tracing::warn!(error = %e, "Failed to log credits debited event");
        }

        tracing::info!(
            user_id = %user_id,
            amount = amount,
            remaining = remaining,
            "Debited credits for usage"
        );

        Ok(remaining)
    }

    /// Confirm the account's paid tier is backed by an active subscription
    ///
    /// Fails open: if Stripe itself cannot be reached, the check passes, so a
    /// provider outage never blocks a paying user whose ledger says they have
    /// credits. Free-tier accounts and accounts with no linked customer pass
    /// trivially.
    pub async fn require_active_subscription(&self, user_id: Uuid) -> BillingResult<()> {
        let account = self.ledger.get_account(user_id).await?;

        if account.plan_tier == PlanTier::Free {
            return Ok(());
        }

        let customer_id = match account.stripe_customer_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let customer_id = match customer_id.parse::<CustomerId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Stored customer ID unparseable, skipping subscription check"
                );
                return Ok(());
            }
        };

        let params = ListSubscriptions {
            customer: Some(customer_id),
            ..Default::default()
        };

        match self
            .stripe
            .call(Subscription::list(self.stripe.inner(), &params))
            .await
        {
            Ok(subscriptions) => {
                let active = subscriptions
                    .data
                    .iter()
                    .any(|s| s.status == stripe::SubscriptionStatus::Active);
                if active {
                    Ok(())
                } else {
                    tracing::warn!(
                        user_id = %user_id,
                        plan_tier = %account.plan_tier,
                        "Paid tier without an active subscription at Stripe"
                    );
                    Err(BillingError::SubscriptionInactive)
                }
            }
            Err(e) => {
                // Fail open on provider errors
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Subscription check failed at Stripe, allowing usage"
                );
                Ok(())
            }
        }
    }
}
