//! Contract lifecycle manager.
//!
//! Deploys a contract at most once per virtual user, caches the resulting
//! address, and routes all later traffic to the cached deployment. Every
//! contract transaction carries the run's fixed resource-limit envelope.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, trace};
use serde::{Deserialize, Serialize};

use crate::breaker::DeadAccounts;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::ledger::{Address, TxPayload};
use crate::submit::{StepOutcome, SubmitMode, TransactionSubmitter};
use crate::vuser::VirtualUser;

/// Compiled contract artifact produced by an external toolchain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractArtifact {
    /// Bytecode blob submitted in the deployment transaction.
    #[serde(with = "hex")]
    pub code: Vec<u8>,

    /// Optional label carried through from the build pipeline.
    #[serde(default)]
    pub label: Option<String>,
}

impl ContractArtifact {
    /// Wrap raw bytecode.
    pub fn new(code: Vec<u8>) -> Self {
        Self { code, label: None }
    }

    /// Load an artifact from a JSON file (hex-encoded `code` field).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read contract artifact {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Parse an artifact from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse contract artifact")
    }
}

/// Result of [`ContractLifecycle::ensure_deployed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Address from a deployment finalized by this call.
    Deployed(Address),
    /// Address cached from an earlier deployment; nothing was submitted.
    Cached(Address),
    /// Dead user or swallowed failure; no address available this
    /// iteration.
    Unavailable(StepOutcome),
}

impl DeployOutcome {
    /// The deployed address, if one is available.
    pub fn address(&self) -> Option<Address> {
        match self {
            DeployOutcome::Deployed(addr) | DeployOutcome::Cached(addr) => Some(*addr),
            DeployOutcome::Unavailable(_) => None,
        }
    }
}

/// Deploy-once-and-call manager for one contract artifact.
pub struct ContractLifecycle {
    submitter: Arc<TransactionSubmitter>,
    breaker: Arc<DeadAccounts>,
    artifact: ContractArtifact,
    config: Arc<HarnessConfig>,
}

impl ContractLifecycle {
    /// Wire the manager to a submitter, breaker, artifact and config.
    pub fn new(
        submitter: Arc<TransactionSubmitter>,
        breaker: Arc<DeadAccounts>,
        artifact: ContractArtifact,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            submitter,
            breaker,
            artifact,
            config,
        }
    }

    /// Deploy the artifact for `user` unless an address is already cached.
    ///
    /// The first successful call submits one deployment transaction, waits
    /// for finality and records the address on the user; every later call
    /// returns the cached address without touching the network. Deployment
    /// consumes exactly one nonce slot.
    pub async fn ensure_deployed(
        &self,
        user: &mut VirtualUser,
    ) -> Result<DeployOutcome, HarnessError> {
        if self.breaker.is_dead(&user.address()) {
            return Ok(DeployOutcome::Unavailable(StepOutcome::SkippedDead));
        }
        if let Some(address) = user.deployed_contract() {
            trace!(
                "virtual user {} reusing contract {}",
                user.address(),
                address
            );
            return Ok(DeployOutcome::Cached(address));
        }

        let nonce = user.nonce_counter();
        let payload = TxPayload::DeployContract {
            code: self.artifact.code.clone(),
            endowment: self.config.contract_endowment,
            limits: self.config.limits,
        };

        let outcome = self
            .submitter
            .submit(user, nonce, payload, SubmitMode::AwaitFinality)
            .await?;

        match outcome {
            StepOutcome::Finalized {
                contract_address: Some(address),
            } => {
                user.record_deployment(address);
                info!(
                    "virtual user {} deployed contract {}",
                    user.address(),
                    address
                );
                Ok(DeployOutcome::Deployed(address))
            }
            other => Ok(DeployOutcome::Unavailable(other)),
        }
    }

    /// Submit a call against an already-deployed contract.
    ///
    /// Spam path: dispatched fire-and-continue with the run's fixed
    /// resource envelope attached.
    pub async fn invoke(
        &self,
        user: &mut VirtualUser,
        contract: Address,
        input: Vec<u8>,
    ) -> Result<StepOutcome, HarnessError> {
        if self.breaker.is_dead(&user.address()) {
            return Ok(StepOutcome::SkippedDead);
        }

        let nonce = user.nonce_counter();
        let payload = TxPayload::ContractCall {
            contract,
            input,
            limits: self.config.limits,
        };
        self.submitter
            .submit(user, nonce, payload, SubmitMode::FireAndContinue)
            .await
    }
}
