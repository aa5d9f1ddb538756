//! Account provisioner.
//!
//! Creates a virtual user's keypair, funds it from the faucet, registers it
//! on the network's account allow-list, and waits for both operations to
//! finalize before marking the user ready. Provisioning is on the
//! correctness path: any failure, including a transient one, writes the
//! user off rather than leaving it half-provisioned.

use std::sync::Arc;
use std::time::Duration;

use futures::future;
use log::{debug, info};
use rand::rngs::OsRng;

use crate::breaker::DeadAccounts;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, SubmitError, WaitError};
use crate::ledger::{
    Keypair, LedgerClient, NonceAssignment, TxOutcome, TxPayload, TxSubscription,
};
use crate::vuser::{FaucetAccount, UserState, VirtualUser};

/// Provisions virtual users to the `Ready` state.
pub struct AccountProvisioner {
    client: Arc<dyn LedgerClient>,
    faucet: Arc<FaucetAccount>,
    breaker: Arc<DeadAccounts>,
    config: Arc<HarnessConfig>,
}

impl AccountProvisioner {
    /// Wire the provisioner to a client, faucet, breaker and config.
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

    /// Provision one virtual user under the configured finality deadline.
    pub async fn provision(&self) -> Result<VirtualUser, HarnessError> {
        self.provision_with_deadline(self.config.finality_timeout())
            .await
    }

    /// Provision one virtual user.
    ///
    /// Submits the funding transfer and the privileged authorization call
    /// from the faucet (network-assigned nonces, since many provisioners
    /// run concurrently against the same sender), then waits for both to
    /// finalize within `deadline`.
    ///
    /// On any per-user failure the user transitions to `Dead`, the circuit
    /// breaker records it, and the caller gets
    /// [`HarnessError::ProvisioningFailed`] carrying the user; the run
    /// continues without it. A depleted faucet is run-level fatal instead.
    pub async fn provision_with_deadline(
        &self,
        deadline: Duration,
    ) -> Result<VirtualUser, HarnessError> {
        let keypair = Keypair::generate(&mut OsRng);
        let mut user = VirtualUser::new(keypair);
        debug!("provisioning virtual user {}", user.address());

        user.set_state(UserState::Funding);
        let funding = match self
            .submit_from_faucet(TxPayload::Transfer {
                to: user.address(),
                amount: self.config.funding_amount,
            })
            .await
        {
            Ok(sub) => sub,
            Err(err) => return self.submit_failed(user, "funding", err),
        };

        user.set_state(UserState::Authorizing);
        let authorization = match self
            .submit_from_faucet(TxPayload::Authorize {
                account: user.address(),
            })
            .await
        {
            Ok(sub) => sub,
            Err(err) => return self.submit_failed(user, "authorization", err),
        };

        // both must finalize before the user is usable
        let (funded, authorized) = future::join(
            funding.wait_for_outcome(deadline),
            authorization.wait_for_outcome(deadline),
        )
        .await;

        match (describe_failure(&funded), describe_failure(&authorized)) {
            (None, None) => {
                user.set_state(UserState::Ready);
                info!("virtual user {} ready", user.address());
                Ok(user)
            }
            (funding_failure, authorization_failure) => {
                let reason = match (funding_failure, authorization_failure) {
                    (Some(f), Some(a)) => format!("funding: {f}; authorization: {a}"),
                    (Some(f), None) => format!("funding: {f}"),
                    (None, Some(a)) => format!("authorization: {a}"),
                    (None, None) => unreachable!(),
                };
                self.dead(user, reason)
            }
        }
    }

    async fn submit_from_faucet(
        &self,
        payload: TxPayload,
    ) -> Result<TxSubscription, SubmitError> {
        self.client
            .submit(
                self.faucet.keypair(),
                NonceAssignment::NetworkNext,
                payload,
            )
            .await
    }

    fn submit_failed(
        &self,
        user: VirtualUser,
        operation: &str,
        err: SubmitError,
    ) -> Result<VirtualUser, HarnessError> {
        // the faucet running dry aborts the run, not just this user
        if let SubmitError::InsufficientBalance { need, have } = err {
            return Err(HarnessError::FaucetDepleted { need, have });
        }
        self.dead(user, format!("{operation} submission failed: {err}"))
    }

    fn dead(
        &self,
        mut user: VirtualUser,
        reason: String,
    ) -> Result<VirtualUser, HarnessError> {
        user.set_state(UserState::Dead);
        self.breaker.mark_dead(user.address(), reason.clone());
        Err(HarnessError::ProvisioningFailed {
            user: Box::new(user),
            reason,
        })
    }
}

fn describe_failure(result: &Result<TxOutcome, WaitError>) -> Option<String> {
    match result {
        Ok(TxOutcome::Finalized { .. }) => None,
        Ok(TxOutcome::Rejected { reason }) => Some(format!("rejected: {reason}")),
        Ok(TxOutcome::Dropped) => Some("dropped from pool".to_string()),
        Err(err) => Some(err.to_string()),
    }
}
