//! Common types used across ResumeLens

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan tier
///
/// `Free` is both the starting tier and the terminal tier after cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanTier {
    /// Whether this tier is backed by a paid subscription
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Basic => write!(f, "basic"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// User account model
///
/// `plan_tier` and `credits` are owned by the billing reconciliation engine;
/// `credits` is additionally debited by the usage gate. Nothing else writes
/// these columns. `stripe_customer_id` is created lazily on first checkout
/// and never reassigned afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub plan_tier: PlanTier,
    pub credits: i64,
    pub stripe_customer_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Stored resume extraction
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Resume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    /// Structured extraction result from the vision model
    pub extracted: serde_json::Value,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// API Response Types
// =============================================================================

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            data,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_default() {
        assert_eq!(PlanTier::default(), PlanTier::Free);
    }

    #[test]
    fn test_plan_tier_is_paid() {
        assert!(!PlanTier::Free.is_paid());
        assert!(PlanTier::Basic.is_paid());
        assert!(PlanTier::Pro.is_paid());
    }

    #[test]
    fn test_plan_tier_display() {
        assert_eq!(format!("{}", PlanTier::Free), "free");
        assert_eq!(format!("{}", PlanTier::Basic), "basic");
        assert_eq!(format!("{}", PlanTier::Pro), "pro");
    }

    #[test]
    fn test_plan_tier_from_str() {
        assert_eq!("free".parse::<PlanTier>().unwrap(), PlanTier::Free);
        assert_eq!("BASIC".parse::<PlanTier>().unwrap(), PlanTier::Basic);
        assert_eq!("Pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert!("enterprise".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_paginated_response() {
        let data = vec![1, 2, 3, 4, 5];
        let response = PaginatedResponse::new(data, 100, 1, 10);

        assert_eq!(response.total, 100);
        assert_eq!(response.page, 1);
        assert_eq!(response.per_page, 10);
        assert_eq!(response.total_pages, 10);
    }

    #[test]
    fn test_paginated_response_partial_page() {
        let data = vec![1, 2, 3];
        let response = PaginatedResponse::new(data, 23, 3, 10);

        // 23 items / 10 per page = 3 pages (2 full + 1 partial)
        assert_eq!(response.total_pages, 3);
    }
}
