//! Transaction submitter.
//!
//! Dispatches transactions for ready virtual users with caller-supplied
//! nonces and classifies every failure explicitly. The submitter never
//! queries node state for nonces on the hot path and never retries with a
//! different nonce: a collision or gap is a rejected outcome, not an error
//! to recover from internally.

use std::sync::Arc;

use log::{debug, trace};

use crate::breaker::DeadAccounts;
use crate::config::HarnessConfig;
use crate::error::{FailureClass, HarnessError, SubmitError, WaitError};
use crate::ledger::{Address, LedgerClient, NonceAssignment, TxOutcome, TxPayload};
use crate::vuser::{UserState, VirtualUser};

/// Completion mode for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Return as soon as the pool accepts; spam traffic where finality
    /// confirmation would bottleneck the harness.
    FireAndContinue,
    /// Block until a terminal event or the configured deadline. Used when a
    /// subsequent step depends on the transaction's effect.
    AwaitFinality,
}

/// What one pipeline step produced, as seen by the load generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Pool accepted the submission; no finality confirmation requested.
    Submitted,
    /// Terminal finality observed. Deployments carry the contract address.
    Finalized {
        /// Address of the instantiated contract, for deployments.
        contract_address: Option<Address>,
    },
    /// The node refused this transaction (nonce gap/collision). The
    /// iteration is wasted; the user lives.
    Rejected {
        /// Node-reported reason.
        reason: String,
    },
    /// Transient failure swallowed; nothing reached the pool this
    /// iteration.
    TransientDropped,
    /// Short-circuit for a dead virtual user. No network contact.
    SkippedDead,
}

/// Submits transfers and contract transactions for virtual users.
pub struct TransactionSubmitter {
    client: Arc<dyn LedgerClient>,
    breaker: Arc<DeadAccounts>,
    config: Arc<HarnessConfig>,
}

impl TransactionSubmitter {
    /// Wire the submitter to a client, breaker and config.
    pub fn new(
        client: Arc<dyn LedgerClient>,
        breaker: Arc<DeadAccounts>,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            client,
            breaker,
            config,
        }
    }

    /// Submit one transaction for `user` at the caller-supplied `nonce`.
    ///
    /// The nonce must equal the user's counter for the submission to have
    /// any chance of acceptance; the node enforces it. The counter advances
    /// by exactly one when (and only when) the pool accepts.
    ///
    /// Transient failures are logged and swallowed; rejected submissions
    /// waste the iteration; fatal failures mark the user dead and
    /// propagate.
    pub async fn submit(
        &self,
        user: &mut VirtualUser,
        nonce: u64,
        payload: TxPayload,
        mode: SubmitMode,
    ) -> Result<StepOutcome, HarnessError> {
        if user.is_dead() || self.breaker.is_dead(&user.address()) {
            trace!("skipping submission for dead user {}", user.address());
            return Ok(StepOutcome::SkippedDead);
        }
        if !user.is_ready() {
            return Ok(StepOutcome::Rejected {
                reason: format!("user not provisioned (state {:?})", user.state()),
            });
        }

        trace!(
            "submitting for {} at nonce {} ({:?})",
            user.address(),
            nonce,
            mode
        );

        let subscription = match self
            .client
            .submit(user.keypair(), NonceAssignment::Explicit(nonce), payload)
            .await
        {
            Ok(sub) => sub,
            Err(err) => return self.classify(user, err),
        };

        // the pool accepted: this nonce slot is consumed
        user.advance_nonce();

        match mode {
            SubmitMode::FireAndContinue => Ok(StepOutcome::Submitted),
            SubmitMode::AwaitFinality => {
                match subscription
                    .wait_for_outcome(self.config.finality_timeout())
                    .await
                {
                    Ok(TxOutcome::Finalized { contract_address }) => {
                        Ok(StepOutcome::Finalized { contract_address })
                    }
                    Ok(TxOutcome::Rejected { reason }) => {
                        debug!(
                            "transaction for {} rejected in flight: {}",
                            user.address(),
                            reason
                        );
                        Ok(StepOutcome::Rejected { reason })
                    }
                    Ok(TxOutcome::Dropped) => {
                        debug!("transaction for {} dropped from pool", user.address());
                        Ok(StepOutcome::TransientDropped)
                    }
                    // on the spam path a finality timeout is transient: the
                    // network may still include the transaction later
                    Err(WaitError::Timeout(deadline)) => {
                        debug!(
                            "finality wait for {} timed out after {:?}",
                            user.address(),
                            deadline
                        );
                        Ok(StepOutcome::TransientDropped)
                    }
                    Err(WaitError::SubscriptionClosed) => {
                        debug!("status subscription for {} closed early", user.address());
                        Ok(StepOutcome::TransientDropped)
                    }
                }
            }
        }
    }

    fn classify(
        &self,
        user: &mut VirtualUser,
        err: SubmitError,
    ) -> Result<StepOutcome, HarnessError> {
        match err.class() {
            FailureClass::Transient => {
                debug!(
                    "transient submission failure for {}: {}",
                    user.address(),
                    err
                );
                Ok(StepOutcome::TransientDropped)
            }
            FailureClass::Rejected => {
                debug!("submission rejected for {}: {}", user.address(), err);
                Ok(StepOutcome::Rejected {
                    reason: err.to_string(),
                })
            }
            FailureClass::Fatal => {
                let address = user.address();
                user.set_state(UserState::Dead);
                self.breaker.mark_dead(address, err.to_string());
                Err(HarnessError::UserFailed {
                    address,
                    source: err,
                })
            }
        }
    }
}
