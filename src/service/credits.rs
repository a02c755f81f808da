//! Per-user credit ledger: spend, gradual earning, and the volatile
//! unlimited-credits override.
//!
//! Balances live in the durable user store; the unlimited flag is held only
//! in process memory and resets on restart.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::constants::credit;
use crate::domain::{DecrementOutcome, StoreError, UserStore};

/// Observable balance of a user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Balance {
    Limited(i64),
    Unlimited,
}

impl Balance {
    /// Wire representation: `null` credits plus the `infiniteCredits` flag.
    pub fn as_wire(&self) -> (Option<i64>, bool) {
        match self {
            Balance::Limited(credits) => (Some(*credits), false),
            Balance::Unlimited => (None, true),
        }
    }
}

/// Result of a spend attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpendOutcome {
    /// Charge applied; carries the new balance
    Charged(i64),
    /// Unlimited user, no balance mutation
    Unlimited,
    /// Balance does not cover the cost (or the user was just created
    /// fail-closed); nothing changed
    InsufficientCredits,
}

/// Result of a gradual-earn check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarnResult {
    /// Credits awarded this check (zero when under one second elapsed)
    pub awarded: i64,
    pub balance: Balance,
}

pub struct CreditLedger {
    users: Arc<dyn UserStore>,
    /// Volatile override set; never persisted, never revoked in-process
    unlimited: Mutex<HashSet<String>>,
}

impl CreditLedger {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            unlimited: Mutex::new(HashSet::new()),
        }
    }

    /// Charge a user for a chunk of `point_count` points.
    ///
    /// A user record that does not exist yet is created at the starting
    /// balance and the current call still fails, forcing the caller to
    /// retry. This fail-closed default keeps an unseen user from drawing
    /// an uncharged first chunk.
    pub async fn spend(&self, user_id: &str, point_count: usize) -> Result<SpendOutcome, StoreError> {
        if self.has_unlimited(user_id).await {
            return Ok(SpendOutcome::Unlimited);
        }

        let cost = point_count as i64 * credit::COST_PER_POINT;
        match self.users.decrement_if_sufficient(user_id, cost).await? {
            DecrementOutcome::Applied(balance) => Ok(SpendOutcome::Charged(balance)),
            DecrementOutcome::Insufficient => Ok(SpendOutcome::InsufficientCredits),
            DecrementOutcome::NotFound => {
                self.users
                    .create(user_id, credit::STARTING_CREDITS)
                    .await?;
                Ok(SpendOutcome::InsufficientCredits)
            }
        }
    }

    /// Award gradual credits for `seconds_elapsed` seconds of presence.
    ///
    /// The award is `floor(seconds_elapsed * earn_rate)`; zero or negative
    /// elapsed time awards nothing and only reports the current balance.
    pub async fn earn(&self, user_id: &str, seconds_elapsed: f64) -> Result<EarnResult, StoreError> {
        let awarded = (seconds_elapsed * credit::EARN_RATE_PER_SECOND).floor() as i64;
        if awarded <= 0 {
            return Ok(EarnResult {
                awarded: 0,
                balance: self.balance(user_id).await?,
            });
        }

        let new_balance = self
            .users
            .increment(user_id, awarded, credit::STARTING_CREDITS)
            .await?;

        let balance = if self.has_unlimited(user_id).await {
            Balance::Unlimited
        } else {
            Balance::Limited(new_balance)
        };
        Ok(EarnResult { awarded, balance })
    }

    /// Current balance; the starting balance for a user not yet on record.
    pub async fn balance(&self, user_id: &str) -> Result<Balance, StoreError> {
        if self.has_unlimited(user_id).await {
            return Ok(Balance::Unlimited);
        }
        let credits = self
            .users
            .find(user_id)
            .await?
            .unwrap_or(credit::STARTING_CREDITS);
        Ok(Balance::Limited(credits))
    }

    /// Set the volatile unlimited override for a user.
    pub async fn grant_unlimited(&self, user_id: &str) {
        let mut unlimited = self.unlimited.lock().await;
        unlimited.insert(user_id.to_string());
    }

    pub async fn has_unlimited(&self, user_id: &str) -> bool {
        let unlimited = self.unlimited.lock().await;
        unlimited.contains(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::InMemoryUserStore;

    fn ledger() -> (CreditLedger, Arc<InMemoryUserStore>) {
        let users = Arc::new(InMemoryUserStore::new());
        (CreditLedger::new(users.clone()), users)
    }

    #[tokio::test]
    async fn test_spend_deducts_cost_per_point() {
        // given:
        let (ledger, users) = ledger();
        users.create("alice", 100).await.unwrap();

        // when:
        let outcome = ledger.spend("alice", 30).await.unwrap();

        // then:
        assert_eq!(outcome, SpendOutcome::Charged(70));
        assert_eq!(users.find("alice").await.unwrap(), Some(70));
    }

    #[tokio::test]
    async fn test_spend_never_drives_balance_negative() {
        // given: exactly 10 credits
        let (ledger, users) = ledger();
        users.create("alice", 10).await.unwrap();

        // when: a 15-point chunk
        let outcome = ledger.spend("alice", 15).await.unwrap();

        // then: rejected, balance unchanged
        assert_eq!(outcome, SpendOutcome::InsufficientCredits);
        assert_eq!(users.find("alice").await.unwrap(), Some(10));

        // and: an exact spend drains to zero but not below
        assert_eq!(
            ledger.spend("alice", 10).await.unwrap(),
            SpendOutcome::Charged(0)
        );
        assert_eq!(
            ledger.spend("alice", 1).await.unwrap(),
            SpendOutcome::InsufficientCredits
        );
        assert_eq!(users.find("alice").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_first_spend_for_unseen_user_fails_closed() {
        // given: no record for "newcomer"
        let (ledger, users) = ledger();

        // when: the first spend
        let outcome = ledger.spend("newcomer", 1).await.unwrap();

        // then: the record is created at the starting balance but the
        // call itself fails, forcing a retry
        assert_eq!(outcome, SpendOutcome::InsufficientCredits);
        assert_eq!(
            users.find("newcomer").await.unwrap(),
            Some(credit::STARTING_CREDITS)
        );

        // and: the retry succeeds against the populated record
        assert_eq!(
            ledger.spend("newcomer", 1).await.unwrap(),
            SpendOutcome::Charged(credit::STARTING_CREDITS - 1)
        );
    }

    #[tokio::test]
    async fn test_unlimited_user_spends_without_mutation() {
        // given:
        let (ledger, users) = ledger();
        users.create("alice", 5).await.unwrap();
        ledger.grant_unlimited("alice").await;

        // when: a chunk far beyond the stored balance
        let outcome = ledger.spend("alice", 1_000_000).await.unwrap();

        // then:
        assert_eq!(outcome, SpendOutcome::Unlimited);
        assert_eq!(users.find("alice").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_earn_awards_floor_of_rate_times_seconds() {
        // given:
        let (ledger, users) = ledger();
        users.create("alice", 100).await.unwrap();

        // when: 3 seconds at 1.67 credits/sec
        let result = ledger.earn("alice", 3.0).await.unwrap();

        // then: floor(3 * 1.67) = 5
        assert_eq!(result.awarded, 5);
        assert_eq!(result.balance, Balance::Limited(105));
    }

    #[tokio::test]
    async fn test_earn_under_one_second_awards_nothing() {
        // given:
        let (ledger, users) = ledger();
        users.create("alice", 42).await.unwrap();

        // when:
        let result = ledger.earn("alice", 0.4).await.unwrap();

        // then: zero award, unchanged balance reported
        assert_eq!(result.awarded, 0);
        assert_eq!(result.balance, Balance::Limited(42));
        assert_eq!(users.find("alice").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_earn_negative_elapsed_awards_nothing() {
        let (ledger, users) = ledger();
        users.create("alice", 42).await.unwrap();

        let result = ledger.earn("alice", -5.0).await.unwrap();

        assert_eq!(result.awarded, 0);
        assert_eq!(users.find("alice").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_earn_upserts_unseen_user() {
        // given: no record
        let (ledger, users) = ledger();

        // when: 2 seconds elapse
        let result = ledger.earn("newcomer", 2.0).await.unwrap();

        // then: record created at starting balance plus the award
        let expected = credit::STARTING_CREDITS + 3; // floor(2 * 1.67)
        assert_eq!(result.balance, Balance::Limited(expected));
        assert_eq!(users.find("newcomer").await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_balance_defaults_to_starting_credits() {
        let (ledger, _users) = ledger();
        assert_eq!(
            ledger.balance("unseen").await.unwrap(),
            Balance::Limited(credit::STARTING_CREDITS)
        );
    }

    #[tokio::test]
    async fn test_unlimited_balance_is_sentinel() {
        // given:
        let (ledger, _users) = ledger();
        ledger.grant_unlimited("alice").await;

        // when / then:
        assert_eq!(ledger.balance("alice").await.unwrap(), Balance::Unlimited);
        assert_eq!(Balance::Unlimited.as_wire(), (None, true));
    }
}
