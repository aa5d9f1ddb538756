//! Failure taxonomy for the harness.
//!
//! Every submission-time failure is classified as `Transient`, `Rejected` or
//! `Fatal`. The classification is explicit (a total function over
//! [`SubmitError`]) so tests can assert on it instead of relying on which
//! call sites happen to swallow which errors.

use std::time::Duration;

use thiserror::Error;

use crate::ledger::Address;
use crate::vuser::VirtualUser;

/// How a submission failure should be handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Momentary condition (pool pressure, connectivity). Swallowed and
    /// logged; the virtual user stays alive.
    Transient,
    /// The node refused this exact transaction (nonce gap/collision). The
    /// iteration is wasted but the virtual user stays alive.
    Rejected,
    /// Unrecoverable for this account. The virtual user is marked dead.
    Fatal,
}

/// Submission-time errors surfaced by a [`crate::ledger::LedgerClient`].
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// Transaction pool refused the submission under load.
    #[error("transaction pool is full")]
    PoolFull,

    /// Connection to the node dropped mid-call.
    #[error("connection to node lost: {0}")]
    Disconnected(String),

    /// Caller-supplied nonce does not match the account's next expected
    /// sequence number.
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },

    /// Signature verification failed on the node.
    #[error("invalid signature")]
    BadSignature,

    /// Sender is not on the network's account allow-list.
    #[error("account {0} is not on the allow-list")]
    NotAuthorized(Address),

    /// Sender cannot cover the transfer amount plus fee.
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u64, have: u64 },

    /// Unrecoverable protocol-level error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SubmitError {
    /// Classify this error for the submitter's failure handling.
    ///
    /// `BadSignature` is fatal rather than rejected: a virtual user that
    /// cannot produce valid signatures will never recover on a later nonce.
    pub fn class(&self) -> FailureClass {
        match self {
            SubmitError::PoolFull | SubmitError::Disconnected(_) => FailureClass::Transient,
            SubmitError::NonceMismatch { .. } => FailureClass::Rejected,
            SubmitError::BadSignature
            | SubmitError::NotAuthorized(_)
            | SubmitError::InsufficientBalance { .. }
            | SubmitError::Protocol(_) => FailureClass::Fatal,
        }
    }

    /// True if this failure kills the virtual user.
    pub fn is_fatal(&self) -> bool {
        self.class() == FailureClass::Fatal
    }
}

/// Errors from waiting on a transaction status subscription.
#[derive(Debug, Error)]
pub enum WaitError {
    /// No terminal event was observed within the deadline.
    #[error("finality not observed within {0:?}")]
    Timeout(Duration),

    /// The subscription ended before a terminal event was emitted.
    #[error("status subscription closed before a terminal event")]
    SubscriptionClosed,
}

/// Component-level errors that actually propagate to the load generator.
///
/// Per-user transient and rejected conditions never appear here; they are
/// reported through step outcomes. A dead virtual user is not an error
/// either: components short-circuit to a no-op success.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Provisioning did not reach `Ready`. Carries the (now dead) virtual
    /// user so the caller can inspect or discard it.
    #[error("provisioning failed for {}: {}", .user.address(), .reason)]
    ProvisioningFailed {
        user: Box<VirtualUser>,
        reason: String,
    },

    /// The reclaim path gave up (budget exhausted, timeout, or fatal error).
    #[error("fund reclaim failed for {address}: {reason}")]
    ReclaimFailed { address: Address, reason: String },

    /// A fatal submission failure killed the virtual user.
    #[error("fatal submission failure for {address}: {source}")]
    UserFailed {
        address: Address,
        #[source]
        source: SubmitError,
    },

    /// The shared faucet account cannot fund another virtual user. This is
    /// a run-level condition, not a per-user retry case.
    #[error("faucet account depleted: need {need}, have {have}")]
    FaucetDepleted { need: u64, have: u64 },
}

impl HarnessError {
    /// True if the whole run should abort rather than continue with the
    /// remaining virtual users.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, HarnessError::FaucetDepleted { .. })
    }
}
