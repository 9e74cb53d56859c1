//! Cross-process daily rate limiting.
//!
//! Counters live in the store, shared with any other process sending on the
//! same account. Check and record are separate steps, so two processes can
//! race past the quota by one; that is an accepted soft limit.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::config::DailyQuotas;
use crate::error::Result;
use crate::store::Database;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// Today's count has reached the quota. A short-circuit signal for the
    /// scheduler, not an error.
    Exhausted,
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub struct RateLimiter {
    db: Arc<dyn Database>,
    quotas: DailyQuotas,
}

impl RateLimiter {
    pub fn new(db: Arc<dyn Database>, quotas: DailyQuotas) -> Self {
        Self { db, quotas }
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Check today's count for an action type against its quota. Unmetered
    /// action types are always allowed.
    pub async fn check(&self, action_type: &str) -> Result<QuotaDecision> {
        let Some(quota) = self.quotas.for_action(action_type) else {
            return Ok(QuotaDecision::Allowed);
        };

        let count = self.db.action_count(&Self::today(), action_type).await?;
        if count >= quota {
            debug!(action_type, count, quota, "Daily quota exhausted");
            return Ok(QuotaDecision::Exhausted);
        }
        Ok(QuotaDecision::Allowed)
    }

    /// Record one successful action against today's counter.
    pub async fn record(&self, action_type: &str) -> Result<()> {
        self.db
            .increment_action_count(&Self::today(), action_type)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::action_types;
    use crate::store::LibSqlBackend;

    async fn limiter(quotas: DailyQuotas) -> RateLimiter {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        RateLimiter::new(db, quotas)
    }

    #[tokio::test]
    async fn allows_until_quota_reached() {
        let limiter = limiter(DailyQuotas {
            messages: 2,
            ..Default::default()
        })
        .await;

        assert!(limiter
            .check(action_types::MESSAGE)
            .await
            .unwrap()
            .is_allowed());
        limiter.record(action_types::MESSAGE).await.unwrap();
        assert!(limiter
            .check(action_types::MESSAGE)
            .await
            .unwrap()
            .is_allowed());
        limiter.record(action_types::MESSAGE).await.unwrap();

        assert_eq!(
            limiter.check(action_types::MESSAGE).await.unwrap(),
            QuotaDecision::Exhausted
        );
    }

    #[tokio::test]
    async fn action_types_metered_independently() {
        let limiter = limiter(DailyQuotas {
            messages: 1,
            inmails: 1,
            ..Default::default()
        })
        .await;

        limiter.record(action_types::MESSAGE).await.unwrap();
        assert_eq!(
            limiter.check(action_types::MESSAGE).await.unwrap(),
            QuotaDecision::Exhausted
        );
        assert!(limiter
            .check(action_types::INMAIL)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn unmetered_actions_always_allowed() {
        let limiter = limiter(DailyQuotas::default()).await;
        assert!(limiter
            .check(action_types::PIPELINE_TRANSITION)
            .await
            .unwrap()
            .is_allowed());
    }
}
