//! In-process ledger for harness tests.
//!
//! [`SimLedger`] mirrors just enough node behavior for the orchestration
//! logic to be exercised end to end: nonce and balance enforcement (flat
//! fee), the account allow-list, contract address assignment, and a
//! `Pending → Included → Finalized` status stream per submission. Scripted
//! faults drive the failure paths; counters back the short-circuit and
//! at-most-once assertions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha3::{Digest, Keccak256};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::SubmitError;
use crate::ledger::{
    AccountSnapshot, Address, Keypair, LedgerClient, NetworkLimits, NonceAssignment, TxPayload,
    TxStatus, TxSubscription,
};

/// Scripted behavior for one submission, consumed in FIFO order. An empty
/// queue means every submission passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// No fault for this submission.
    Pass,
    /// Fail with [`SubmitError::PoolFull`].
    PoolFull,
    /// Fail with a connection error.
    Disconnect,
    /// Fail with [`SubmitError::BadSignature`].
    BadSignature,
    /// Fail with a protocol-level (fatal) error.
    Protocol,
    /// Accept, emit `Pending`, then never reach a terminal status.
    StallFinality,
    /// Accept, then reject in flight instead of including.
    RejectInFlight,
}

#[derive(Debug, Default, Clone, Copy)]
struct AccountRecord {
    balance: u64,
    next_nonce: u64,
}

#[derive(Default)]
struct SimState {
    accounts: HashMap<Address, AccountRecord>,
    allowlist: HashSet<Address>,
    faults: VecDeque<SimFault>,
    submissions: u64,
    deployments: u64,
    // senders parked here keep stalled subscriptions open, so waiters
    // observe a timeout rather than a closed channel
    stalled: Vec<UnboundedSender<TxStatus>>,
}

/// In-memory ledger node used by the test suites.
pub struct SimLedger {
    state: Mutex<SimState>,
    root: Address,
    fee: u64,
    finality_delay: Duration,
}

impl SimLedger {
    /// Builder with defaults.
    pub fn builder() -> SimLedgerBuilder {
        SimLedgerBuilder::new()
    }

    /// Total `submit` calls that reached this node, including ones that
    /// failed validation. This is the measure of "network contact" for the
    /// short-circuit assertions.
    pub fn submissions(&self) -> u64 {
        self.state.lock().submissions
    }

    /// Accepted deployment transactions.
    pub fn deployments(&self) -> u64 {
        self.state.lock().deployments
    }

    /// Current balance of an account (zero if unknown).
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.state
            .lock()
            .accounts
            .get(address)
            .map(|r| r.balance)
            .unwrap_or(0)
    }

    /// Next expected nonce for an account (zero if unknown).
    pub fn next_nonce_of(&self, address: &Address) -> u64 {
        self.state
            .lock()
            .accounts
            .get(address)
            .map(|r| r.next_nonce)
            .unwrap_or(0)
    }

    /// Whether an account is on the allow-list.
    pub fn is_authorized(&self, address: &Address) -> bool {
        self.state.lock().allowlist.contains(address)
    }

    /// Number of accepted submissions currently parked without a terminal
    /// status (the result of [`SimFault::StallFinality`]).
    pub fn stalled_watches(&self) -> usize {
        self.state.lock().stalled.len()
    }

    /// Queue one scripted fault for an upcoming submission.
    pub fn inject_fault(&self, fault: SimFault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Queue scripted faults for upcoming submissions, in order.
    pub fn inject_faults(&self, faults: impl IntoIterator<Item = SimFault>) {
        self.state.lock().faults.extend(faults);
    }

    fn derive_contract_address(sender: &Address, nonce: u64) -> Address {
        let mut hasher = Keccak256::new();
        hasher.update(sender.as_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.update(b"instantiate");
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest.as_slice());
        Address::new(bytes)
    }
}

#[async_trait]
impl LedgerClient for SimLedger {
    async fn submit(
        &self,
        sender: &Keypair,
        nonce: NonceAssignment,
        payload: TxPayload,
    ) -> Result<TxSubscription, SubmitError> {
        let mut state = self.state.lock();
        state.submissions += 1;

        let fault = state.faults.pop_front().unwrap_or(SimFault::Pass);
        match fault {
            SimFault::PoolFull => return Err(SubmitError::PoolFull),
            SimFault::Disconnect => {
                return Err(SubmitError::Disconnected(
                    "connection reset by peer".to_string(),
                ))
            }
            SimFault::BadSignature => return Err(SubmitError::BadSignature),
            SimFault::Protocol => {
                return Err(SubmitError::Protocol("simulated node failure".to_string()))
            }
            SimFault::Pass | SimFault::StallFinality | SimFault::RejectInFlight => {}
        }

        let from = sender.address();

        if matches!(payload, TxPayload::Authorize { .. }) && from != self.root {
            return Err(SubmitError::Protocol(
                "authorize is a privileged call".to_string(),
            ));
        }
        if from != self.root && !state.allowlist.contains(&from) {
            return Err(SubmitError::NotAuthorized(from));
        }

        let fee = self.fee;
        let amount_out = match &payload {
            TxPayload::Transfer { amount, .. } => *amount,
            TxPayload::DeployContract { endowment, .. } => *endowment,
            TxPayload::ContractCall { .. } | TxPayload::Authorize { .. } => 0,
        };
        let need = amount_out.saturating_add(fee);

        let assigned_nonce = {
            let record = state.accounts.entry(from).or_default();
            let expected = record.next_nonce;
            let assigned = match nonce {
                NonceAssignment::Explicit(got) if got != expected => {
                    return Err(SubmitError::NonceMismatch { expected, got })
                }
                NonceAssignment::Explicit(got) => got,
                NonceAssignment::NetworkNext => expected,
            };
            if record.balance < need {
                return Err(SubmitError::InsufficientBalance {
                    need,
                    have: record.balance,
                });
            }

            if fault == SimFault::RejectInFlight {
                // accepted by the pool, refused before inclusion: no state
                // change on the chain
                let (tx, sub) = TxSubscription::channel();
                let _ = tx.send(TxStatus::Pending);
                let _ = tx.send(TxStatus::Rejected {
                    reason: "raced out of nonce slot".to_string(),
                });
                return Ok(sub);
            }

            record.balance -= need;
            record.next_nonce = assigned + 1;
            assigned
        };

        let mut contract_address = None;
        match payload {
            TxPayload::Transfer { to, amount } => {
                state.accounts.entry(to).or_default().balance += amount;
            }
            TxPayload::DeployContract { endowment, .. } => {
                let address = Self::derive_contract_address(&from, assigned_nonce);
                state.accounts.entry(address).or_default().balance += endowment;
                state.deployments += 1;
                contract_address = Some(address);
            }
            TxPayload::ContractCall { .. } => {}
            TxPayload::Authorize { account } => {
                state.allowlist.insert(account);
            }
        }

        let (tx, sub) = TxSubscription::channel();
        let _ = tx.send(TxStatus::Pending);

        if fault == SimFault::StallFinality {
            state.stalled.push(tx);
            return Ok(sub);
        }
        drop(state);

        if self.finality_delay.is_zero() {
            let _ = tx.send(TxStatus::Included);
            let _ = tx.send(TxStatus::Finalized { contract_address });
        } else {
            let delay = self.finality_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(TxStatus::Included);
                let _ = tx.send(TxStatus::Finalized { contract_address });
            });
        }

        Ok(sub)
    }

    async fn account_state(&self, address: &Address) -> Result<AccountSnapshot, SubmitError> {
        let state = self.state.lock();
        let record = state.accounts.get(address).copied().unwrap_or_default();
        Ok(AccountSnapshot {
            free_balance: record.balance,
            next_nonce: record.next_nonce,
        })
    }

    async fn network_limits(&self) -> Result<NetworkLimits, SubmitError> {
        Ok(NetworkLimits {
            max_block_weight: 2_000_000_000_000,
            max_storage_deposit: 1_000_000_000,
        })
    }
}

/// Fluent builder for [`SimLedger`].
pub struct SimLedgerBuilder {
    root: Address,
    root_balance: u64,
    funded: Vec<(Address, u64)>,
    authorized: Vec<Address>,
    fee: u64,
    finality_delay: Duration,
    faults: Vec<SimFault>,
}

impl SimLedgerBuilder {
    /// Builder with defaults: zero root address with a large balance, flat
    /// fee of 10, instant finality, no faults.
    pub fn new() -> Self {
        Self {
            root: Address::zero(),
            root_balance: 1 << 60,
            funded: Vec::new(),
            authorized: Vec::new(),
            fee: 10,
            finality_delay: Duration::ZERO,
            faults: Vec::new(),
        }
    }

    /// Set the privileged root (faucet) account and its starting balance.
    pub fn with_root(mut self, address: Address, balance: u64) -> Self {
        self.root = address;
        self.root_balance = balance;
        self
    }

    /// Pre-fund an account.
    pub fn with_funded_account(mut self, address: Address, balance: u64) -> Self {
        self.funded.push((address, balance));
        self
    }

    /// Pre-register an account on the allow-list.
    pub fn with_authorized(mut self, address: Address) -> Self {
        self.authorized.push(address);
        self
    }

    /// Flat fee charged on every accepted transaction.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Delay between pool acceptance and finality.
    pub fn with_finality_delay(mut self, delay: Duration) -> Self {
        self.finality_delay = delay;
        self
    }

    /// Queue a scripted fault (repeatable; consumed in order).
    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Build the ledger.
    pub fn build(self) -> SimLedger {
        let mut accounts = HashMap::new();
        accounts.insert(
            self.root,
            AccountRecord {
                balance: self.root_balance,
                next_nonce: 0,
            },
        );
        for (address, balance) in self.funded {
            accounts.entry(address).or_default().balance = balance;
        }

        SimLedger {
            state: Mutex::new(SimState {
                accounts,
                allowlist: self.authorized.into_iter().collect(),
                faults: self.faults.into(),
                submissions: 0,
                deployments: 0,
                stalled: Vec::new(),
            }),
            root: self.root,
            fee: self.fee,
            finality_delay: self.finality_delay,
        }
    }
}

impl Default for SimLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
