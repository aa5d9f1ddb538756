//! Ledger client adapter.
//!
//! Thin interface over node connectivity: submit a transaction, query
//! account state, fetch network metadata. The node itself (and real
//! signature construction) lives behind the [`LedgerClient`] trait; the
//! harness only orchestrates.
//!
//! Status delivery is channel-based: every submission yields a
//! [`TxSubscription`] that emits [`TxStatus`] updates and resolves once, on
//! the first terminal event. Dropping the subscription cancels the watch.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{SubmitError, WaitError};

/// Account/contract identifier: 32 bytes, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex")] [u8; 32]);

impl Address {
    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero address.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Raw bytes of the address.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to identify an account in logs
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

/// Ephemeral signing identity owned by exactly one virtual user.
///
/// Signature construction is the node client's concern; the harness only
/// needs a stable address and the secret material to hand over at submit
/// time.
#[derive(Clone)]
pub struct Keypair {
    secret: [u8; 32],
    address: Address,
}

impl Keypair {
    /// Generate a fresh keypair from the given entropy source.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self::from_seed(secret)
    }

    /// Deterministic keypair from a fixed seed. Intended for tests and
    /// well-known accounts (the faucet).
    pub fn from_seed(secret: [u8; 32]) -> Self {
        let digest = Keccak256::digest(secret);
        let mut addr = [0u8; 32];
        addr.copy_from_slice(digest.as_slice());
        Self {
            secret,
            address: Address::new(addr),
        }
    }

    /// Address derived from this keypair.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Secret material, consumed by the node client at signing time.
    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never log the secret
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// How the nonce for a submission is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceAssignment {
    /// Caller-owned counter; the node rejects on mismatch.
    Explicit(u64),
    /// Let the node append at its next free nonce. Required for the shared
    /// faucet account, where concurrent callers would race a local counter.
    NetworkNext,
}

/// Resource ceiling attached to every contract transaction, fixed per run.
///
/// Fixed limits trade occasional under/over-provisioning for predictable
/// harness behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Computation ceiling (weight/gas equivalent).
    pub weight_limit: u64,
    /// Storage deposit ceiling; `None` means uncapped.
    pub storage_deposit_limit: Option<u64>,
}

impl ResourceLimits {
    /// Envelope derived from network metadata: a quarter of the block
    /// weight budget, storage deposit uncapped.
    pub fn from_network(limits: &NetworkLimits) -> Self {
        Self {
            weight_limit: limits.max_block_weight / 4,
            storage_deposit_limit: None,
        }
    }
}

/// One submitted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPayload {
    /// Direct balance transfer.
    Transfer {
        /// Receiving account.
        to: Address,
        /// Amount in base units.
        amount: u64,
    },
    /// Upload and instantiate a contract.
    DeployContract {
        /// Compiled bytecode blob.
        code: Vec<u8>,
        /// Balance endowed to the new contract instance.
        endowment: u64,
        /// Resource envelope for instantiation.
        limits: ResourceLimits,
    },
    /// Call into an already-deployed contract.
    ContractCall {
        /// Deployed contract address.
        contract: Address,
        /// Encoded method selector and arguments.
        input: Vec<u8>,
        /// Resource envelope for the call.
        limits: ResourceLimits,
    },
    /// Privileged allow-list registration. Only the faucet may submit it.
    Authorize {
        /// Account to register.
        account: Address,
    },
}

/// Status updates emitted for one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Accepted into the pool, not yet in a block.
    Pending,
    /// In a block, not yet irreversible.
    Included,
    /// Irreversible. Deployments carry the new contract address.
    Finalized {
        /// Address of the instantiated contract, for deployments.
        contract_address: Option<Address>,
    },
    /// Refused after acceptance (e.g. raced out of its nonce slot).
    Rejected {
        /// Node-reported reason.
        reason: String,
    },
    /// Evicted from the pool without inclusion.
    Dropped,
}

impl TxStatus {
    /// Whether this status ends the subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Finalized { .. } | TxStatus::Rejected { .. } | TxStatus::Dropped
        )
    }
}

/// Terminal result of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// Finalized; deployments carry the contract address.
    Finalized {
        /// Address of the instantiated contract, for deployments.
        contract_address: Option<Address>,
    },
    /// Rejected by the node.
    Rejected {
        /// Node-reported reason.
        reason: String,
    },
    /// Dropped from the pool without inclusion.
    Dropped,
}

/// Channel-backed stream of status updates for one submitted transaction.
#[derive(Debug)]
pub struct TxSubscription {
    rx: mpsc::UnboundedReceiver<TxStatus>,
}

impl TxSubscription {
    /// Build a sender/subscription pair. Client implementations push
    /// statuses through the sender.
    pub fn channel() -> (mpsc::UnboundedSender<TxStatus>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next status update, `None` once the stream ends.
    pub async fn next_status(&mut self) -> Option<TxStatus> {
        self.rx.recv().await
    }

    /// Consume the subscription until the first terminal event.
    ///
    /// On timeout the subscription is dropped, which cancels the watch; the
    /// node keeps or discards the transaction on its own schedule.
    pub async fn wait_for_outcome(mut self, deadline: Duration) -> Result<TxOutcome, WaitError> {
        let wait = async {
            while let Some(status) = self.rx.recv().await {
                match status {
                    TxStatus::Finalized { contract_address } => {
                        return Ok(TxOutcome::Finalized { contract_address })
                    }
                    TxStatus::Rejected { reason } => return Ok(TxOutcome::Rejected { reason }),
                    TxStatus::Dropped => return Ok(TxOutcome::Dropped),
                    TxStatus::Pending | TxStatus::Included => continue,
                }
            }
            Err(WaitError::SubscriptionClosed)
        };

        match timeout(deadline, wait).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WaitError::Timeout(deadline)),
        }
    }
}

/// Account state as seen by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Spendable balance in base units.
    pub free_balance: u64,
    /// Next expected sequence number for this account.
    pub next_nonce: u64,
}

/// Per-block resource ceilings from node metadata, used to construct the
/// fixed resource-limit envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkLimits {
    /// Total weight budget of one block.
    pub max_block_weight: u64,
    /// Maximum storage deposit a single transaction may take.
    pub max_storage_deposit: u64,
}

/// Node connectivity consumed by every harness component.
///
/// Implementations must tolerate concurrent callers; in particular,
/// [`NonceAssignment::NetworkNext`] submissions from the same sender must
/// not collide.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed transaction and subscribe to its status updates.
    async fn submit(
        &self,
        sender: &Keypair,
        nonce: NonceAssignment,
        payload: TxPayload,
    ) -> Result<TxSubscription, SubmitError>;

    /// Query free balance and next nonce for an account.
    async fn account_state(&self, address: &Address) -> Result<AccountSnapshot, SubmitError>;

    /// Fetch resource ceilings from node metadata.
    async fn network_limits(&self) -> Result<NetworkLimits, SubmitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_address_is_stable() {
        let a = Keypair::from_seed([7u8; 32]);
        let b = Keypair::from_seed([7u8; 32]);
        assert_eq!(a.address(), b.address());

        let c = Keypair::from_seed([8u8; 32]);
        assert_ne!(a.address(), c.address());
    }

    #[test]
    fn keypair_debug_hides_secret() {
        let pair = Keypair::from_seed([9u8; 32]);
        let rendered = format!("{:?}", pair);
        assert!(!rendered.contains(&hex::encode([9u8; 32])));
    }

    #[tokio::test]
    async fn subscription_resolves_on_first_terminal_event() {
        let (tx, sub) = TxSubscription::channel();
        tx.send(TxStatus::Pending).unwrap();
        tx.send(TxStatus::Included).unwrap();
        tx.send(TxStatus::Finalized {
            contract_address: None,
        })
        .unwrap();
        // anything after the terminal event must be ignored
        tx.send(TxStatus::Dropped).unwrap();

        let outcome = sub
            .wait_for_outcome(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TxOutcome::Finalized {
                contract_address: None
            }
        );
    }

    #[tokio::test]
    async fn subscription_times_out_without_terminal_event() {
        let (tx, sub) = TxSubscription::channel();
        tx.send(TxStatus::Pending).unwrap();

        let err = sub
            .wait_for_outcome(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Timeout(_)));
    }

    #[tokio::test]
    async fn closed_subscription_is_not_a_timeout() {
        let (tx, sub) = TxSubscription::channel();
        drop(tx);

        let err = sub
            .wait_for_outcome(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::SubscriptionClosed));
    }

    #[test]
    fn limits_from_network_metadata() {
        let limits = ResourceLimits::from_network(&NetworkLimits {
            max_block_weight: 4_000,
            max_storage_deposit: 100,
        });
        assert_eq!(limits.weight_limit, 1_000);
        assert_eq!(limits.storage_deposit_limit, None);
    }
}
