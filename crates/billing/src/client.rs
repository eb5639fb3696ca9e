//! Stripe client configuration

use std::future::Future;
use std::time::Duration;

use resumelens_shared::PlanTier;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Upper bound on any single Stripe API call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each paid plan tier
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Stripe price IDs for the paid plan tiers
/// Tier hierarchy: Free (no price) → Basic → Pro
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub basic: String,
    pub pro: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: PriceIds {
                basic: std::env::var("STRIPE_PRICE_BASIC")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_BASIC not set".to_string()))?,
                pro: std::env::var("STRIPE_PRICE_PRO")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_PRO not set".to_string()))?,
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Get the price ID for a paid tier; Free has no price
    pub fn price_id_for_tier(&self, tier: PlanTier) -> Option<&str> {
        match tier {
            PlanTier::Basic => Some(&self.price_ids.basic),
            PlanTier::Pro => Some(&self.price_ids.pro),
            PlanTier::Free => None,
        }
    }

    /// Get the tier for a price ID
    ///
    /// Unknown prices are `None`, never coerced to Free: an unrecognized price
    /// on an incoming event must be treated as a no-op, not a downgrade.
    pub fn tier_for_price_id(&self, price_id: &str) -> Option<PlanTier> {
        if price_id == self.price_ids.basic {
            Some(PlanTier::Basic)
        } else if price_id == self.price_ids.pro {
            Some(PlanTier::Pro)
        } else {
            None
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Run one Stripe API call with a bounded timeout
    ///
    /// The underlying hyper client has no overall request deadline, so a hung
    /// connection would otherwise pin the calling handler. A timed-out call
    /// fails and leaves recovery to the caller (webhook redelivery, user
    /// retry).
    pub async fn call<T, F>(&self, fut: F) -> BillingResult<T>
    where
        F: Future<Output = Result<T, stripe::StripeError>>,
    {
        call_with_timeout(REQUEST_TIMEOUT, fut).await
    }
}

async fn call_with_timeout<T, F>(limit: Duration, fut: F) -> BillingResult<T>
where
    F: Future<Output = Result<T, stripe::StripeError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BillingError::StripeApi(format!(
            "request timed out after {}s",
            limit.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: PriceIds {
                basic: "price_basic_123".to_string(),
                pro: "price_pro_456".to_string(),
            },
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_price_id_for_tier() {
        let config = test_config();
        assert_eq!(
            config.price_id_for_tier(PlanTier::Basic),
            Some("price_basic_123")
        );
        assert_eq!(config.price_id_for_tier(PlanTier::Pro), Some("price_pro_456"));
        assert_eq!(config.price_id_for_tier(PlanTier::Free), None);
    }

    #[test]
    fn test_tier_for_price_id() {
        let config = test_config();
        assert_eq!(
            config.tier_for_price_id("price_basic_123"),
            Some(PlanTier::Basic)
        );
        assert_eq!(config.tier_for_price_id("price_pro_456"), Some(PlanTier::Pro));
        // Unknown prices stay unknown
        assert_eq!(config.tier_for_price_id("price_legacy_999"), None);
    }

    #[tokio::test]
    async fn test_call_with_timeout_passes_result_through() {
        let result =
            call_with_timeout(Duration::from_secs(1), async { Ok::<_, stripe::StripeError>(7) })
                .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_call_with_timeout_fails_hung_request() {
        let result = call_with_timeout(
            Duration::from_millis(10),
            std::future::pending::<Result<(), stripe::StripeError>>(),
        )
        .await;
        match result {
            Err(BillingError::StripeApi(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout error, got {other:?}"),
        }
    }
}
