//! Fund reclaimer.
//!
//! At teardown, returns a virtual user's surplus balance to the faucet.
//! Unlike the spam path, correctness of fund return is prioritized over
//! throughput: transient failures retry the whole operation (balance is
//! recomputed, the transfer resubmitted) under an explicit budget with
//! capped exponential backoff.

use std::sync::Arc;

use log::{debug, info};
use tokio::time::sleep;

use crate::breaker::DeadAccounts;
use crate::config::HarnessConfig;
use crate::error::{FailureClass, HarnessError, SubmitError, WaitError};
use crate::ledger::{LedgerClient, NonceAssignment, TxOutcome, TxPayload};
use crate::vuser::{FaucetAccount, UserState, VirtualUser};

/// Result of one reclaim call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Surplus moved back to the faucet and finalized.
    Reclaimed {
        /// Amount returned, in base units.
        amount: u64,
    },
    /// Balance at or below the fee reserve; nothing worth reclaiming.
    NothingToReclaim,
    /// Dead user; no network contact.
    SkippedDead,
}

enum AttemptError {
    Transient(String),
    Fatal(String),
}

/// Returns surplus funds to the faucet at scenario teardown.
pub struct FundReclaimer {
    client: Arc<dyn LedgerClient>,
    faucet: Arc<FaucetAccount>,
    breaker: Arc<DeadAccounts>,
    config: Arc<HarnessConfig>,
}

impl FundReclaimer {
    /// Wire the reclaimer to a client, faucet, breaker and config.
    pub fn new(
        client: Arc<dyn LedgerClient>,
        faucet: Arc<FaucetAccount>,
        breaker: Arc<DeadAccounts>,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            client,
            faucet,
            breaker,
            config,
        }
    }

    /// Reclaim `balance - reserve` from `user` back to the faucet.
    ///
    /// No-op for dead users and for accounts at or below the reserve, so a
    /// second call on an already-reclaimed account performs no transfer.
    /// Transient failures retry up to the configured budget; timeouts and
    /// fatal errors mark the user dead (reclaiming is on the correctness
    /// path, not the throughput path).
    pub async fn reclaim(&self, user: &mut VirtualUser) -> Result<ReclaimOutcome, HarnessError> {
        if user.is_dead() || self.breaker.is_dead(&user.address()) {
            return Ok(ReclaimOutcome::SkippedDead);
        }

        let mut attempt = 0u32;
        loop {
            match self.try_reclaim(user).await {
                Ok(outcome) => return Ok(outcome),
                Err(AttemptError::Transient(reason)) => {
                    attempt += 1;
                    if attempt > self.config.reclaim_max_retries {
                        return self.fail(
                            user,
                            format!(
                                "retry budget exhausted after {} attempts: {}",
                                attempt, reason
                            ),
                        );
                    }
                    let backoff = self.config.reclaim_backoff(attempt);
                    debug!(
                        "transient reclaim failure for {} (attempt {}): {}; retrying in {:?}",
                        user.address(),
                        attempt,
                        reason,
                        backoff
                    );
                    sleep(backoff).await;
                }
                Err(AttemptError::Fatal(reason)) => return self.fail(user, reason),
            }
        }
    }

    /// One full reclaim attempt: fresh balance, fresh nonce, one transfer,
    /// one finality wait.
    async fn try_reclaim(&self, user: &mut VirtualUser) -> Result<ReclaimOutcome, AttemptError> {
        let snapshot = self
            .client
            .account_state(&user.address())
            .await
            .map_err(classify_query)?;

        let surplus = snapshot.free_balance.saturating_sub(self.config.reclaim_reserve);
        if surplus == 0 {
            debug!(
                "nothing to reclaim for {} (balance {}, reserve {})",
                user.address(),
                snapshot.free_balance,
                self.config.reclaim_reserve
            );
            return Ok(ReclaimOutcome::NothingToReclaim);
        }

        // teardown is off the submission hot path, so the node's view of
        // the nonce is authoritative here
        let nonce = snapshot.next_nonce;
        let subscription = self
            .client
            .submit(
                user.keypair(),
                NonceAssignment::Explicit(nonce),
                TxPayload::Transfer {
                    to: self.faucet.address(),
                    amount: surplus,
                },
            )
            .await
            .map_err(classify_submit)?;
        user.sync_nonce(nonce + 1);

        match subscription
            .wait_for_outcome(self.config.finality_timeout())
            .await
        {
            Ok(TxOutcome::Finalized { .. }) => {
                info!("reclaimed {} from {}", surplus, user.address());
                Ok(ReclaimOutcome::Reclaimed { amount: surplus })
            }
            Ok(TxOutcome::Rejected { reason }) => {
                // raced by something else touching the account; recompute
                Err(AttemptError::Transient(format!("rejected: {reason}")))
            }
            Ok(TxOutcome::Dropped) => {
                Err(AttemptError::Transient("dropped from pool".to_string()))
            }
            Err(WaitError::Timeout(deadline)) => Err(AttemptError::Fatal(format!(
                "finality not observed within {deadline:?}"
            ))),
            Err(WaitError::SubscriptionClosed) => Err(AttemptError::Transient(
                "status subscription closed".to_string(),
            )),
        }
    }

    fn fail(
        &self,
        user: &mut VirtualUser,
        reason: String,
    ) -> Result<ReclaimOutcome, HarnessError> {
        let address = user.address();
        user.set_state(UserState::Dead);
        self.breaker.mark_dead(address, reason.clone());
        Err(HarnessError::ReclaimFailed { address, reason })
    }
}

fn classify_submit(err: SubmitError) -> AttemptError {
    match err.class() {
        // a rejected reclaim is retried whole: the fresh balance/nonce
        // query on the next attempt heals a desynced counter
        FailureClass::Transient | FailureClass::Rejected => {
            AttemptError::Transient(err.to_string())
        }
        FailureClass::Fatal => AttemptError::Fatal(err.to_string()),
    }
}

fn classify_query(err: SubmitError) -> AttemptError {
    match err.class() {
        FailureClass::Transient => AttemptError::Transient(err.to_string()),
        _ => AttemptError::Fatal(err.to_string()),
    }
}
