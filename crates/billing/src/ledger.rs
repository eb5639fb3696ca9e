//! Credits ledger backed by the users table
//!
//! Every mutation here is a single guarded UPDATE so concurrent writers
//! serialize on the account row. Overdrafts are rejected by the WHERE clause
//! (never clamped to zero), and the `credits >= 0` CHECK constraint backstops
//! any path that slips past the guard.

use resumelens_shared::{Account, PlanTier};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// A reconciliation outcome to apply to one account: an optional tier move
/// plus a signed credit delta, landed in one statement
#[derive(Debug, Clone, Copy)]
pub struct LedgerChange {
    pub plan_tier: Option<PlanTier>,
    pub credit_delta: i64,
}

/// Account lookup and ledger mutation
#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_account(&self, user_id: Uuid) -> BillingResult<Account> {
        let account: Option<Account> = sqlx::query_as(
            "SELECT id, email, password_hash, plan_tier, credits, stripe_customer_id,
                    created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        account.ok_or_else(|| BillingError::NotFound(user_id.to_string()))
    }

    /// Resolve the account linked to a Stripe customer
    pub async fn find_by_customer(&self, customer_id: &str) -> BillingResult<Option<Account>> {
        let account: Option<Account> = sqlx::query_as(
            "SELECT id, email, password_hash, plan_tier, credits, stripe_customer_id,
                    created_at, updated_at
             FROM users WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Apply a reconciliation decision: tier update and credit delta in one
    /// guarded statement
    ///
    /// The `credits + delta >= 0` guard lives in the WHERE clause so an
    /// overdrawing change simply matches no row. When that happens we
    /// re-check whether the account exists to tell `InvalidDelta` apart from
    /// `NotFound`.
    pub async fn apply_change(
        &self,
        user_id: Uuid,
        change: LedgerChange,
    ) -> BillingResult<Account> {
        let updated: Option<Account> = sqlx::query_as(
            "UPDATE users
             SET plan_tier = COALESCE($2, plan_tier),
                 credits = credits + $3,
                 updated_at = NOW()
             WHERE id = $1 AND credits + $3 >= 0
             RETURNING id, email, password_hash, plan_tier, credits, stripe_customer_id,
                       created_at, updated_at",
        )
        .bind(user_id)
        .bind(change.plan_tier)
        .bind(change.credit_delta)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(account) => {
                tracing::info!(
                    user_id = %user_id,
                    plan_tier = %account.plan_tier,
                    credit_delta = change.credit_delta,
                    credits = account.credits,
                    "Applied ledger change"
                );
                Ok(account)
            }
            None => {
                // Distinguish a missing account from a rejected delta
                self.get_account(user_id).await?;
                Err(BillingError::InvalidDelta)
            }
        }
    }

    /// Debit credits for usage, atomically
    ///
    /// Returns the remaining balance. Two concurrent debits against an exact
    /// balance cannot both succeed: the guard re-evaluates under the row lock.
    pub async fn debit(&self, user_id: Uuid, amount: i64) -> BillingResult<i64> {
        if amount <= 0 {
            return Err(BillingError::InvalidInput(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }

        let remaining: Option<(i64,)> = sqlx::query_as(
            "UPDATE users
             SET credits = credits - $2, updated_at = NOW()
             WHERE id = $1 AND credits >= $2
             RETURNING credits",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        match remaining {
            Some((credits,)) => Ok(credits),
            None => {
                let account = self.get_account(user_id).await?;
                Err(BillingError::InsufficientCredits {
                    balance: account.credits,
                    required: amount,
                })
            }
        }
    }

    /// Claim the Stripe customer link for an account
    ///
    /// First writer wins: the conditional on `stripe_customer_id IS NULL`
    /// means a concurrent checkout that already linked a customer leaves this
    /// call a no-op. Returns whether this call claimed the link.
    pub async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            "UPDATE users
             SET stripe_customer_id = $2, updated_at = NOW()
             WHERE id = $1 AND stripe_customer_id IS NULL",
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumelens_shared::db::create_pool;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        create_pool(&url, 5).await.expect("Failed to create pool")
    }

    async fn insert_user(pool: &PgPool, credits: i64) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, plan_tier, credits)
             VALUES ($1, $2, 'x', 'free', $3)",
        )
        .bind(id)
        .bind(format!("ledger-{}@test.invalid", id))
        .bind(credits)
        .execute(pool)
        .await
        .expect("insert test user");
        id
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_debit_rejects_overdraft() {
        let pool = test_pool().await;
        let ledger = LedgerStore::new(pool.clone());
        let user_id = insert_user(&pool, 50).await;

        let err = ledger.debit(user_id, 100).await.unwrap_err();
        match err {
            BillingError::InsufficientCredits { balance, required } => {
                assert_eq!(balance, 50);
                assert_eq!(required, 100);
            }
            other => panic!("expected InsufficientCredits, got {other:?}"),
        }

        // Balance untouched by the failed debit
        let account = ledger.get_account(user_id).await.unwrap();
        assert_eq!(account.credits, 50);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_concurrent_debits_one_wins() {
        let pool = test_pool().await;
        let ledger = LedgerStore::new(pool.clone());
        let user_id = insert_user(&pool, 100).await;

        let a = ledger.debit(user_id, 100);
        let b = ledger.debit(user_id, 100);
        let (ra, rb) = tokio::join!(a, b);

        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one of two exact-balance debits may win");

        let account = ledger.get_account(user_id).await.unwrap();
        assert_eq!(account.credits, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_link_customer_first_writer_wins() {
        let pool = test_pool().await;
        let ledger = LedgerStore::new(pool.clone());
        let user_id = insert_user(&pool, 0).await;

        assert!(ledger.link_customer(user_id, "cus_first").await.unwrap());
        assert!(!ledger.link_customer(user_id, "cus_second").await.unwrap());

        let account = ledger.get_account(user_id).await.unwrap();
        assert_eq!(account.stripe_customer_id.as_deref(), Some("cus_first"));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_apply_change_rejects_negative_result() {
        let pool = test_pool().await;
        let ledger = LedgerStore::new(pool.clone());
        let user_id = insert_user(&pool, 10).await;

        let err = ledger
            .apply_change(
                user_id,
                LedgerChange {
                    plan_tier: Some(PlanTier::Basic),
                    credit_delta: -20,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidDelta));

        // Neither tier nor credits moved
        let account = ledger.get_account(user_id).await.unwrap();
        assert_eq!(account.plan_tier, PlanTier::Free);
        assert_eq!(account.credits, 10);
    }
}
