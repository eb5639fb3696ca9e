//! Authentication routes

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use resumelens_shared::PlanTier;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    auth::{hash_password, validate_password_strength, verify_password, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub plan_tier: PlanTier,
    pub credits: i64,
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    plan_tier: PlanTier,
    credits: i64,
}

// =============================================================================
// Handlers
// =============================================================================

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && email.len() <= 254
}

/// Register a new account. New accounts start on the Free tier with zero
/// credits and no Stripe customer.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if !is_valid_email(&req.email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }

    validate_password_strength(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let email = req.email.to_lowercase();

    let exists: Option<(bool,)> =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;

    if exists.map(|r| r.0).unwrap_or(false) {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash = hash_password(&req.password).map_err(|_| ApiError::Internal)?;

    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, plan_tier, credits)
        VALUES ($1, $2, $3, 'free', 0)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .execute(&state.pool)
    .await?;

    tracing::info!(user_id = %user_id, "New account registered");

    let response = issue_tokens(
        &state,
        UserResponse {
            id: user_id,
            email,
            plan_tier: PlanTier::Free,
            credits: 0,
        },
    )?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.to_lowercase();

    let user: Option<UserRow> = sqlx::query_as(
        "SELECT id, email, password_hash, plan_tier, credits FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let user = user.ok_or(ApiError::InvalidCredentials)?;

    let valid =
        verify_password(&req.password, &user.password_hash).map_err(|_| ApiError::Internal)?;
    if !valid {
        tracing::warn!(email = %email, "Failed login attempt");
        return Err(ApiError::InvalidCredentials);
    }

    let response = issue_tokens(
        &state,
        UserResponse {
            id: user.id,
            email: user.email,
            plan_tier: user.plan_tier,
            credits: user.credits,
        },
    )?;

    Ok(Json(response))
}

/// Exchange a refresh token for a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let claims = state
        .jwt_manager
        .validate_refresh_token(&req.refresh_token)
        .map_err(|_| ApiError::InvalidToken)?;

    let user: Option<UserRow> = sqlx::query_as(
        "SELECT id, email, password_hash, plan_tier, credits FROM users WHERE id = $1",
    )
    .bind(claims.sub)
    .fetch_optional(&state.pool)
    .await?;

    let user = user.ok_or(ApiError::InvalidToken)?;

    let response = issue_tokens(
        &state,
        UserResponse {
            id: user.id,
            email: user.email,
            plan_tier: user.plan_tier,
            credits: user.credits,
        },
    )?;

    Ok(Json(response))
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UserResponse>> {
    let user: Option<UserRow> = sqlx::query_as(
        "SELECT id, email, password_hash, plan_tier, credits FROM users WHERE id = $1",
    )
    .bind(auth_user.id)
    .fetch_optional(&state.pool)
    .await?;

    let user = user.ok_or(ApiError::NotFound)?;

    Ok(Json(UserResponse {
        id: user.id,
        email: user.email,
        plan_tier: user.plan_tier,
        credits: user.credits,
    }))
}

fn issue_tokens(state: &AppState, user: UserResponse) -> ApiResult<AuthResponse> {
    let access_token = state
        .jwt_manager
        .generate_access_token(user.id, &user.email)
        .map_err(|_| ApiError::Internal)?;
    let refresh_token = state
        .jwt_manager
        .generate_refresh_token(user.id, &user.email)
        .map_err(|_| ApiError::Internal)?;

    Ok(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_manager.access_token_expiry_seconds(),
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.example.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
    }
}
