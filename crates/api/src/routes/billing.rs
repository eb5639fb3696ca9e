//! Billing routes for Stripe integration

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use resumelens_shared::PlanTier;
use serde::{Deserialize, Serialize};
use stripe::{ListSubscriptions, Subscription, SubscriptionStatus};
use time::OffsetDateTime;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub tier: String,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted checkout URL; absent when an existing subscription was changed
    /// in place instead
    pub url: Option<String>,
    pub updated_in_place: bool,
}

/// Response from creating a portal session
#[derive(Debug, Serialize)]
pub struct PortalSessionResponse {
    pub url: String,
}

/// Subscription info response
#[derive(Debug, Serialize)]
pub struct SubscriptionInfo {
    pub plan_tier: PlanTier,
    pub credits: i64,
    pub status: String,
    pub cancel_at_period_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<String>,
}

/// Create a checkout session, or change the price of an existing
/// subscription in place. Credits are never granted here; the webhook is the
/// only path that mutates the ledger.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let tier: PlanTier = req
        .tier
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown tier: {}", req.tier)))?;

    if !tier.is_paid() {
        return Err(ApiError::BadRequest(
            "Cannot check out for the free tier".to_string(),
        ));
    }

    let outcome = state
        .checkout
        .start_checkout_or_change(auth_user.id, tier)
        .await?;

    Ok(Json(CheckoutResponse {
        url: outcome.url,
        updated_in_place: outcome.updated_in_place,
    }))
}

/// Create a billing portal session
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<PortalSessionResponse>, ApiError> {
    let session = state.portal.create_portal_session(auth_user.id).await?;

    Ok(Json(PortalSessionResponse { url: session.url }))
}

/// Get current subscription info
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<SubscriptionInfo>, ApiError> {
    let account = state.ledger.get_account(auth_user.id).await?;

    let mut info = SubscriptionInfo {
        plan_tier: account.plan_tier,
        credits: account.credits,
        status: "none".to_string(),
        cancel_at_period_end: false,
        current_period_end: None,
    };

    // Enrich from Stripe when a customer is linked; the ledger stays the
    // source of truth for tier and credits
    if let Some(customer_id) = account.stripe_customer_id {
        if let Ok(customer_id) = customer_id.parse() {
            let params = ListSubscriptions {
                customer: Some(customer_id),
                ..Default::default()
            };
            match state
                .stripe
                .call(Subscription::list(state.stripe.inner(), &params))
                .await
            {
                Ok(subscriptions) => {
                    if let Some(subscription) = subscriptions
                        .data
                        .iter()
                        .find(|s| s.status == SubscriptionStatus::Active)
                        .or_else(|| subscriptions.data.first())
                    {
                        info.status = subscription.status.to_string();
                        info.cancel_at_period_end = subscription.cancel_at_period_end;
                        info.current_period_end =
                            OffsetDateTime::from_unix_timestamp(subscription.current_period_end)
                                .ok()
                                .and_then(|t| {
                                    t.format(&time::format_description::well_known::Rfc3339)
                                        .ok()
                                });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %auth_user.id,
                        error = %e,
                        "Failed to fetch subscription status from Stripe"
                    );
                }
            }
        }
    }

    Ok(Json(info))
}

/// Handle Stripe webhook events
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    // Verification happens before anything can touch the ledger
    let event = state.webhooks.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
        ApiError::WebhookSignatureInvalid
    })?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    // Non-2xx on failure so Stripe redelivers
    state.webhooks.handle_event(event).await.map_err(|e| {
        tracing::error!("Webhook handling error: {}", e);
        ApiError::from(e)
    })?;

    Ok(StatusCode::OK)
}
