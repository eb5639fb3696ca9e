//! API routes

pub mod auth;
pub mod billing;
pub mod credits;
pub mod health;
pub mod resumes;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        // Stripe webhook (public, uses signature verification)
        .route("/billing/webhook", post(billing::webhook));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/user/credits", get(credits::get_credits))
        // Billing routes
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/portal", post(billing::create_portal_session))
        .route("/billing/subscription", get(billing::get_subscription))
        // Resume routes (create is metered)
        .route(
            "/resumes",
            post(resumes::create_resume).get(resumes::list_resumes),
        )
        .route(
            "/resumes/:resume_id",
            get(resumes::get_resume).delete(resumes::delete_resume),
        )
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    // Uploads arrive base64-encoded inside a JSON body, so the wire size is
    // larger than the decoded document limit
    let body_limit = state.config.max_upload_bytes * 2;

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
