//! Harness tunables.
//!
//! All knobs are fixed for the duration of a run. Values can be loaded from
//! a YAML file; any omitted field falls back to its default, so a config
//! file only needs to name what it overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ledger::{NetworkLimits, ResourceLimits};

/// Default amount moved from the faucet to every new virtual user. Large
/// enough to cover a contract deployment (endowment included) plus fees
/// for a long spam run.
pub const DEFAULT_FUNDING_AMOUNT: u64 = 1_000_000_000_000;

/// Default balance endowed to each deployed contract instance.
pub const DEFAULT_CONTRACT_ENDOWMENT: u64 = 10_000_000_000;

/// Default upper bound on any single finality wait, in milliseconds.
/// Finality can take several block times.
pub const DEFAULT_FINALITY_TIMEOUT_MS: u64 = 60_000;

/// Default fee reserve kept behind when reclaiming, covering the reclaim
/// transaction's own fee.
pub const DEFAULT_RECLAIM_RESERVE: u64 = 1_000;

/// Default retry budget for the reclaim path.
pub const DEFAULT_RECLAIM_MAX_RETRIES: u32 = 5;

/// Default weight ceiling attached to contract transactions.
pub const DEFAULT_WEIGHT_LIMIT: u64 = 10_000_000_000;

/// Run-wide configuration for the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Amount transferred to each freshly provisioned account.
    pub funding_amount: u64,

    /// Balance endowed to each deployed contract instance.
    pub contract_endowment: u64,

    /// Upper bound on any single finality wait, in milliseconds.
    pub finality_timeout_ms: u64,

    /// Fee estimate kept behind when reclaiming surplus funds.
    pub reclaim_reserve: u64,

    /// How many times the reclaimer retries a transient failure before
    /// giving the user up.
    pub reclaim_max_retries: u32,

    /// Base backoff between reclaim attempts, in milliseconds. Doubled per
    /// attempt up to `reclaim_backoff_cap_ms`.
    pub reclaim_backoff_ms: u64,

    /// Ceiling for the reclaim backoff, in milliseconds.
    pub reclaim_backoff_cap_ms: u64,

    /// Resource envelope attached to every contract transaction.
    pub limits: ResourceLimits,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            funding_amount: DEFAULT_FUNDING_AMOUNT,
            contract_endowment: DEFAULT_CONTRACT_ENDOWMENT,
            finality_timeout_ms: DEFAULT_FINALITY_TIMEOUT_MS,
            reclaim_reserve: DEFAULT_RECLAIM_RESERVE,
            reclaim_max_retries: DEFAULT_RECLAIM_MAX_RETRIES,
            reclaim_backoff_ms: 250,
            reclaim_backoff_cap_ms: 5_000,
            limits: ResourceLimits {
                weight_limit: DEFAULT_WEIGHT_LIMIT,
                storage_deposit_limit: None,
            },
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file. Missing fields take defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("failed to parse harness config")
    }

    /// Replace the resource envelope with one derived from node metadata.
    pub fn with_limits_from(mut self, network: &NetworkLimits) -> Self {
        self.limits = ResourceLimits::from_network(network);
        self
    }

    /// Deadline applied to every finality wait.
    pub fn finality_timeout(&self) -> Duration {
        Duration::from_millis(self.finality_timeout_ms)
    }

    /// Backoff before reclaim attempt `attempt` (1-based): exponential,
    /// capped.
    pub fn reclaim_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let millis = self
            .reclaim_backoff_ms
            .saturating_mul(factor)
            .min(self.reclaim_backoff_cap_ms);
        Duration::from_millis(millis)
    }
}
