//! Scenario-facing front surface.
//!
//! [`LoadHarness`] composes the provisioner, submitter, contract lifecycle
//! manager and reclaimer over one ledger client, one faucet, one circuit
//! breaker and one config. The load-generation front end calls one entry
//! point per scenario step; every entry point is an async suspension point
//! and honors the timeout contract.

use std::sync::Arc;

use log::trace;

use crate::breaker::DeadAccounts;
use crate::config::HarnessConfig;
use crate::contract::{ContractArtifact, ContractLifecycle, DeployOutcome};
use crate::error::HarnessError;
use crate::ledger::{Address, LedgerClient, TxPayload};
use crate::provision::AccountProvisioner;
use crate::reclaim::{FundReclaimer, ReclaimOutcome};
use crate::submit::{StepOutcome, SubmitMode, TransactionSubmitter};
use crate::vuser::{FaucetAccount, VirtualUser};

/// Per-scenario-step entry points over one ledger client.
pub struct LoadHarness {
    breaker: Arc<DeadAccounts>,
    config: Arc<HarnessConfig>,
    provisioner: AccountProvisioner,
    submitter: Arc<TransactionSubmitter>,
    contracts: ContractLifecycle,
    reclaimer: FundReclaimer,
}

impl LoadHarness {
    /// Wire a harness over `client`, driven by `faucet`, deploying
    /// `artifact` for contract traffic.
    pub fn new(
        client: Arc<dyn LedgerClient>,
        faucet: FaucetAccount,
        artifact: ContractArtifact,
        config: HarnessConfig,
    ) -> Self {
        let faucet = Arc::new(faucet);
        let breaker = Arc::new(DeadAccounts::new());
        let config = Arc::new(config);

        let provisioner = AccountProvisioner::new(
            client.clone(),
            faucet.clone(),
            breaker.clone(),
            config.clone(),
        );
        let submitter = Arc::new(TransactionSubmitter::new(
            client.clone(),
            breaker.clone(),
            config.clone(),
        ));
        let contracts = ContractLifecycle::new(
            submitter.clone(),
            breaker.clone(),
            artifact,
            config.clone(),
        );
        let reclaimer = FundReclaimer::new(client, faucet, breaker.clone(), config.clone());

        Self {
            breaker,
            config,
            provisioner,
            submitter,
            contracts,
            reclaimer,
        }
    }

    /// Shared dead-account registry, for run-level reporting.
    pub fn breaker(&self) -> &Arc<DeadAccounts> {
        &self.breaker
    }

    /// Active configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Provision one virtual user (scenario setup step, once per user).
    pub async fn provision(&self) -> Result<VirtualUser, HarnessError> {
        self.provisioner.provision().await
    }

    /// Spam transfer: dispatched without waiting for inclusion.
    pub async fn transfer(
        &self,
        user: &mut VirtualUser,
        to: Address,
        amount: u64,
        nonce: u64,
    ) -> Result<StepOutcome, HarnessError> {
        self.submitter
            .submit(
                user,
                nonce,
                TxPayload::Transfer { to, amount },
                SubmitMode::FireAndContinue,
            )
            .await
    }

    /// Transfer that blocks until finality; for steps whose successor
    /// depends on the transaction's effect.
    pub async fn transfer_and_wait(
        &self,
        user: &mut VirtualUser,
        to: Address,
        amount: u64,
        nonce: u64,
    ) -> Result<StepOutcome, HarnessError> {
        self.submitter
            .submit(
                user,
                nonce,
                TxPayload::Transfer { to, amount },
                SubmitMode::AwaitFinality,
            )
            .await
    }

    /// Contract scenario step: first iteration deploys (waiting for
    /// finality to capture the address), every later iteration submits
    /// call traffic against the cached deployment.
    ///
    /// The cached address is authoritative; `iteration` comes from the
    /// load generator, which runs this same logical step repeatedly.
    pub async fn deploy_once_and_call(
        &self,
        user: &mut VirtualUser,
        iteration: u64,
        input: Vec<u8>,
    ) -> Result<StepOutcome, HarnessError> {
        trace!(
            "contract step for {} (iteration {})",
            user.address(),
            iteration
        );

        match self.contracts.ensure_deployed(user).await? {
            // the deployment itself was this iteration's traffic
            DeployOutcome::Deployed(address) => Ok(StepOutcome::Finalized {
                contract_address: Some(address),
            }),
            DeployOutcome::Cached(address) => self.contracts.invoke(user, address, input).await,
            DeployOutcome::Unavailable(step) => Ok(step),
        }
    }

    /// Teardown step: return surplus funds to the faucet.
    pub async fn reclaim(&self, user: &mut VirtualUser) -> Result<ReclaimOutcome, HarnessError> {
        self.reclaimer.reclaim(user).await
    }
}
