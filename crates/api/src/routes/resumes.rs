//! Resume routes
//!
//! Creating a resume is the metered operation: credits are debited through
//! the usage gate before the extraction call, so an account can never run a
//! negative balance no matter how many uploads race.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::Engine;
use resumelens_billing::LedgerChange;
use resumelens_shared::{PaginatedResponse, Resume};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateResumeRequest {
    pub file_name: String,
    /// Base64-encoded document content
    pub content_base64: String,
}

#[derive(Debug, Serialize)]
pub struct CreateResumeResponse {
    pub resume: Resume,
    pub credits_remaining: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// Upload a resume for extraction. Debits credits first; an insufficient
/// balance returns 402 before the extraction service is ever called.
pub async fn create_resume(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateResumeRequest>,
) -> Result<(StatusCode, Json<CreateResumeResponse>), ApiError> {
    if req.file_name.trim().is_empty() || req.file_name.len() > 255 {
        return Err(ApiError::Validation(
            "File name must be between 1 and 255 characters".to_string(),
        ));
    }

    // Reject garbage before spending credits on it
    let decoded_len = base64::engine::general_purpose::STANDARD
        .decode(&req.content_base64)
        .map_err(|_| ApiError::Validation("Invalid base64 content".to_string()))?
        .len();
    if decoded_len == 0 {
        return Err(ApiError::Validation("Empty document".to_string()));
    }
    if decoded_len > state.config.max_upload_bytes {
        return Err(ApiError::Validation("Document too large".to_string()));
    }

    // A paid tier must still be backed by an active subscription
    state.usage.require_active_subscription(auth_user.id).await?;

    let cost = state.catalog.credits_per_extraction;
    let remaining = state.usage.debit(auth_user.id, cost).await?;

    let extracted = match state
        .extractor
        .extract(&req.file_name, &req.content_base64)
        .await
    {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(
                user_id = %auth_user.id,
                error = %e,
                "Extraction failed, refunding debited credits"
            );
            // Refund the debit so a provider outage does not consume credits
            if let Err(refund_err) = state
                .ledger
                .apply_change(
                    auth_user.id,
                    LedgerChange {
                        plan_tier: None,
                        credit_delta: cost,
                    },
                )
                .await
            {
                tracing::error!(
                    user_id = %auth_user.id,
                    error = %refund_err,
                    "Failed to refund credits after extraction failure"
                );
            }
            return Err(ApiError::ServiceUnavailable);
        }
    };

    let resume: Resume = sqlx::query_as(
        r#"
        INSERT INTO resumes (id, user_id, file_name, extracted)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, file_name, extracted, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(req.file_name.trim())
    .bind(&extracted)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        user_id = %auth_user.id,
        resume_id = %resume.id,
        credits_remaining = remaining,
        "Resume extracted"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateResumeResponse {
            resume,
            credits_remaining: remaining,
        }),
    ))
}

/// List the authenticated user's resumes, newest first
pub async fn list_resumes(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedResponse<Resume>>, ApiError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resumes WHERE user_id = $1")
        .bind(auth_user.id)
        .fetch_one(&state.pool)
        .await?;

    let resumes: Vec<Resume> = sqlx::query_as(
        r#"
        SELECT id, user_id, file_name, extracted, created_at
        FROM resumes
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(auth_user.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(PaginatedResponse::new(resumes, total.0, page, limit)))
}

/// Fetch a single resume
pub async fn get_resume(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<Resume>, ApiError> {
    let resume: Option<Resume> = sqlx::query_as(
        r#"
        SELECT id, user_id, file_name, extracted, created_at
        FROM resumes
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(resume_id)
    .bind(auth_user.id)
    .fetch_optional(&state.pool)
    .await?;

    resume.map(Json).ok_or(ApiError::NotFound)
}

/// Delete a resume. Credits already spent on it are not returned.
pub async fn delete_resume(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(resume_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND user_id = $2")
        .bind(resume_id)
        .bind(auth_user.id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
