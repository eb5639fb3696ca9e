//! Credit balance route

use axum::{
    extract::{Extension, State},
    Json,
};
use resumelens_shared::PlanTier;
use serde::Serialize;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i64,
    pub plan_tier: PlanTier,
    /// Cost of one extraction, so clients can show "N extractions left"
    pub credits_per_extraction: i64,
}

/// Current credit balance for the authenticated user
pub async fn get_credits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let account = state.ledger.get_account(auth_user.id).await?;

    Ok(Json(CreditsResponse {
        credits: account.credits,
        plan_tier: account.plan_tier,
        credits_per_extraction: state.catalog.credits_per_extraction,
    }))
}
