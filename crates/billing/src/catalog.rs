//! Plan catalog and credit authority
//!
//! Pure tier/credit arithmetic with no I/O. All credit consequences of a plan
//! change come from [`PlanCatalog::transition`]; webhook handlers and user
//! flows never compute credit deltas themselves. Because events carry target
//! state rather than deltas, re-applying any transition yields a zero delta,
//! which is what makes duplicated and out-of-order delivery safe.

use resumelens_shared::PlanTier;

/// Default monthly credit grants, overridable via environment
pub const DEFAULT_BASIC_GRANT: i64 = 10_000;
pub const DEFAULT_PRO_GRANT: i64 = 20_000;
pub const DEFAULT_CREDITS_PER_EXTRACTION: i64 = 100;

/// Credit schedule for the paid tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCatalog {
    pub basic_grant: i64,
    pub pro_grant: i64,
    pub credits_per_extraction: i64,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            basic_grant: DEFAULT_BASIC_GRANT,
            pro_grant: DEFAULT_PRO_GRANT,
            credits_per_extraction: DEFAULT_CREDITS_PER_EXTRACTION,
        }
    }
}

/// The outcome of reconciling an observed subscription state against the
/// account's current tier. Ephemeral: computed per event, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionDecision {
    pub target: PlanTier,
    pub credit_delta: i64,
}

impl PlanCatalog {
    /// Read grant overrides from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            basic_grant: env_i64("CREDIT_GRANT_BASIC", defaults.basic_grant),
            pro_grant: env_i64("CREDIT_GRANT_PRO", defaults.pro_grant),
            credits_per_extraction: env_i64(
                "CREDITS_PER_EXTRACTION",
                defaults.credits_per_extraction,
            ),
        }
    }

    /// Full credit grant for a tier; Free grants nothing
    pub fn credit_grant(&self, tier: PlanTier) -> i64 {
        match tier {
            PlanTier::Free => 0,
            PlanTier::Basic => self.basic_grant,
            PlanTier::Pro => self.pro_grant,
        }
    }

    /// The transition table, keyed on (current, incoming)
    ///
    /// Credits are granted only on upward movement. An upgrade from Basic
    /// grants the difference between the Pro and Basic grants, so a user who
    /// went Free → Basic → Pro ends up with exactly the Pro grant in total.
    /// Downgrades and cancellation leave the balance alone: credits already
    /// granted were paid for.
    pub fn transition(&self, current: PlanTier, incoming: PlanTier) -> TransitionDecision {
        use PlanTier::{Basic, Free, Pro};

        let credit_delta = match (current, incoming) {
            (Free, Basic) | (Free, Pro) => self.credit_grant(incoming),
            (Basic, Pro) => self.credit_grant(Pro) - self.credit_grant(Basic),
            // Repeats, downgrades, and cancellation
            (Free, Free) | (Basic, Basic) | (Pro, Pro) => 0,
            (Basic, Free) | (Pro, Free) | (Pro, Basic) => 0,
        };

        TransitionDecision {
            target: incoming,
            credit_delta,
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumelens_shared::PlanTier::{Basic, Free, Pro};

    #[test]
    fn test_upgrades_grant_full_or_difference() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.transition(Free, Basic).credit_delta, 10_000);
        assert_eq!(catalog.transition(Free, Pro).credit_delta, 20_000);
        assert_eq!(catalog.transition(Basic, Pro).credit_delta, 10_000);
    }

    #[test]
    fn test_stepwise_upgrade_totals_pro_grant() {
        // Free → Basic → Pro must grant exactly what Free → Pro grants
        let catalog = PlanCatalog::default();
        let stepwise = catalog.transition(Free, Basic).credit_delta
            + catalog.transition(Basic, Pro).credit_delta;
        assert_eq!(stepwise, catalog.transition(Free, Pro).credit_delta);
    }

    #[test]
    fn test_repeat_is_idempotent() {
        let catalog = PlanCatalog::default();
        for tier in [Free, Basic, Pro] {
            let decision = catalog.transition(tier, tier);
            assert_eq!(decision.target, tier);
            assert_eq!(decision.credit_delta, 0);
        }
    }

    #[test]
    fn test_downgrade_preserves_balance() {
        let catalog = PlanCatalog::default();
        let decision = catalog.transition(Pro, Basic);
        assert_eq!(decision.target, Basic);
        assert_eq!(decision.credit_delta, 0);
    }

    #[test]
    fn test_cancellation_preserves_balance() {
        let catalog = PlanCatalog::default();
        for tier in [Basic, Pro] {
            let decision = catalog.transition(tier, Free);
            assert_eq!(decision.target, Free);
            assert_eq!(decision.credit_delta, 0);
        }
    }

    #[test]
    fn test_credit_grant_per_tier() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.credit_grant(Free), 0);
        assert_eq!(catalog.credit_grant(Basic), 10_000);
        assert_eq!(catalog.credit_grant(Pro), 20_000);
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        // No override variables set in the test environment
        let catalog = PlanCatalog::from_env();
        assert_eq!(catalog.credits_per_extraction, DEFAULT_CREDITS_PER_EXTRACTION);
    }
}
