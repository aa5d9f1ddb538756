//! # Ledger Bench
//!
//! Load/stress-test harness for a distributed-ledger network. Drives many
//! concurrent simulated clients ("virtual users") that provision ephemeral
//! accounts, fund and authorize them through a privileged faucet account,
//! submit signed transactions with correct per-account sequencing, wait for
//! durability confirmation where needed, and reclaim leftover funds at
//! teardown.
//!
//! ## Architecture Overview
//!
//! - [`ledger`]: thin client adapter over node connectivity (submit, query,
//!   status subscriptions)
//! - [`provision`]: keypair + faucet funding + allow-list authorization,
//!   finalized before a user is `Ready`
//! - [`submit`]: nonce-correct transfers and contract traffic,
//!   fire-and-continue or await-finality
//! - [`contract`]: deploy-at-most-once with a cached address, calls under a
//!   fixed resource envelope
//! - [`breaker`]: one-way dead-account circuit breaker consulted by every
//!   component
//! - [`reclaim`]: surplus return to the faucet with bounded retry
//! - [`harness`]: per-scenario-step entry points for the load generator
//! - [`sim`]: in-process ledger for the test suites
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ledger_bench::prelude::*;
//!
//! let harness = LoadHarness::new(client, faucet, artifact, HarnessConfig::default());
//! let mut user = harness.provision().await?;
//! let nonce = user.nonce_counter();
//! harness.transfer(&mut user, receiver, 1, nonce).await?;
//! harness.reclaim(&mut user).await?;
//! ```
//!
//! ## Design Principles
//!
//! 1. **Explicit state**: one owned struct per virtual user, passed `&mut`
//!    into each component call
//! 2. **Explicit failure classification**: transient, rejected and fatal
//!    are discriminated, never silently discarded
//! 3. **Nonce ownership**: each virtual user owns its counter; the shared
//!    faucet always uses network-assigned nonces
//! 4. **No hidden blocking**: every network round-trip is an await point
//!    and every finality wait carries a timeout

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asserts;
pub mod breaker;
pub mod config;
pub mod contract;
pub mod error;
pub mod harness;
pub mod ledger;
pub mod provision;
pub mod reclaim;
pub mod sim;
pub mod submit;
pub mod vuser;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::breaker::DeadAccounts;
    pub use crate::config::HarnessConfig;
    pub use crate::contract::{ContractArtifact, ContractLifecycle, DeployOutcome};
    pub use crate::error::{FailureClass, HarnessError, SubmitError, WaitError};
    pub use crate::harness::LoadHarness;
    pub use crate::ledger::{
        AccountSnapshot, Address, Keypair, LedgerClient, NetworkLimits, NonceAssignment,
        ResourceLimits, TxOutcome, TxPayload, TxStatus, TxSubscription,
    };
    pub use crate::provision::AccountProvisioner;
    pub use crate::reclaim::{FundReclaimer, ReclaimOutcome};
    pub use crate::submit::{StepOutcome, SubmitMode, TransactionSubmitter};
    pub use crate::vuser::{FaucetAccount, UserState, VirtualUser};
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
