//! Shared application state

use std::sync::Arc;

use resumelens_billing::{
    BillingEventLogger, CheckoutService, CustomerService, LedgerStore, PlanCatalog, PortalService,
    ReconciliationEngine, StripeClient, UsageGate, WebhookHandler,
};
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;
use crate::extraction::ExtractionClient;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt_manager: JwtManager,
    pub stripe: StripeClient,
    pub catalog: PlanCatalog,
    pub ledger: LedgerStore,
    pub events: BillingEventLogger,
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub webhooks: WebhookHandler,
    pub usage: UsageGate,
    pub extractor: ExtractionClient,
}

impl AppState {
    /// Wire up all services. Stripe configuration is read from the
    /// environment alongside the application config.
    pub fn new(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        let stripe = StripeClient::from_env()?;
        let webhook_secret = stripe.config().webhook_secret.clone();

        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let catalog = PlanCatalog::from_env();
        let ledger = LedgerStore::new(pool.clone());
        let events = BillingEventLogger::new(pool.clone());
        let customers = CustomerService::new(stripe.clone(), ledger.clone(), events.clone());
        let checkout = CheckoutService::new(stripe.clone(), customers.clone(), events.clone());
        let portal = PortalService::new(stripe.clone(), customers.clone());
        let engine =
            ReconciliationEngine::new(stripe.clone(), ledger.clone(), catalog, events.clone());
        let webhooks = WebhookHandler::new(engine, pool.clone(), webhook_secret);
        let usage = UsageGate::new(stripe.clone(), ledger.clone(), events.clone());
        let extractor = ExtractionClient::new(
            &config.extraction_api_url,
            &config.extraction_api_key,
            config.extraction_timeout_secs,
        )?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt_manager,
            stripe,
            catalog,
            ledger,
            events,
            checkout,
            portal,
            webhooks,
            usage,
            extractor,
        })
    }

    /// State slice for the auth middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
