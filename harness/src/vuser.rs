//! Per-virtual-user state.
//!
//! One [`VirtualUser`] is owned by the task driving its pipeline and passed
//! `&mut` into each component call. Nothing here is shared; the only shared
//! mutable resource in the harness is the faucet account, whose nonce is
//! network-assigned.

use serde::{Deserialize, Serialize};

use crate::ledger::{Address, Keypair};

/// Lifecycle state of a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Keypair exists, nothing submitted yet.
    Uninitialized,
    /// Funding transfer from the faucet is in flight.
    Funding,
    /// Allow-list authorization is in flight.
    Authorizing,
    /// Funded and authorized; may submit traffic.
    Ready,
    /// Terminal. No further network contact for this user.
    Dead,
}

/// One simulated client identity driving a sequence of operations.
#[derive(Debug, Clone)]
pub struct VirtualUser {
    keypair: Keypair,
    state: UserState,
    // mirrors the account's on-chain next-expected-sequence-number as long
    // as every accepted submission goes through the harness
    nonce_counter: u64,
    deployed_contract: Option<Address>,
}

impl VirtualUser {
    /// Wrap a freshly generated keypair. State starts `Uninitialized` with
    /// nonce counter zero.
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            state: UserState::Uninitialized,
            nonce_counter: 0,
            deployed_contract: None,
        }
    }

    /// This user's account address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Signing identity, consumed by the ledger client.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UserState {
        self.state
    }

    /// True once provisioning completed and the user may submit traffic.
    pub fn is_ready(&self) -> bool {
        self.state == UserState::Ready
    }

    /// True once the user hit an unrecoverable failure.
    pub fn is_dead(&self) -> bool {
        self.state == UserState::Dead
    }

    /// Advance the lifecycle. `Dead` is terminal: once reached, no other
    /// transition is applied.
    pub(crate) fn set_state(&mut self, state: UserState) {
        if self.state == UserState::Dead {
            return;
        }
        self.state = state;
    }

    /// Next nonce this user should submit with.
    pub fn nonce_counter(&self) -> u64 {
        self.nonce_counter
    }

    /// Consume one nonce slot. Called exactly once per submission the
    /// node's pool accepted.
    pub(crate) fn advance_nonce(&mut self) {
        self.nonce_counter += 1;
    }

    /// Fast-forward the counter to the node's view. Only the reclaim path
    /// (off the submission hot path) uses this.
    pub(crate) fn sync_nonce(&mut self, next_nonce: u64) {
        if next_nonce > self.nonce_counter {
            self.nonce_counter = next_nonce;
        }
    }

    /// Cached contract deployment, if any.
    pub fn deployed_contract(&self) -> Option<Address> {
        self.deployed_contract
    }

    /// Record the first successful deployment. Set exactly once; later
    /// calls keep the original address.
    pub(crate) fn record_deployment(&mut self, address: Address) {
        if self.deployed_contract.is_none() {
            self.deployed_contract = Some(address);
        }
    }
}

/// Shared, pre-funded, privileged identity used to bootstrap and authorize
/// virtual users.
///
/// All faucet submissions use network-assigned nonces, so concurrent
/// provisioning never races a harness-held counter.
#[derive(Debug, Clone)]
pub struct FaucetAccount {
    keypair: Keypair,
}

impl FaucetAccount {
    /// Wrap the faucet's signing identity.
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Faucet account address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Faucet signing identity.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> VirtualUser {
        VirtualUser::new(Keypair::from_seed([1u8; 32]))
    }

    #[test]
    fn dead_state_is_terminal() {
        let mut u = user();
        u.set_state(UserState::Ready);
        assert!(u.is_ready());

        u.set_state(UserState::Dead);
        u.set_state(UserState::Ready);
        assert!(u.is_dead());
    }

    #[test]
    fn nonce_counter_moves_one_slot_at_a_time() {
        let mut u = user();
        assert_eq!(u.nonce_counter(), 0);
        u.advance_nonce();
        u.advance_nonce();
        assert_eq!(u.nonce_counter(), 2);
    }

    #[test]
    fn sync_nonce_never_rewinds() {
        let mut u = user();
        u.sync_nonce(5);
        assert_eq!(u.nonce_counter(), 5);
        u.sync_nonce(3);
        assert_eq!(u.nonce_counter(), 5);
    }

    #[test]
    fn deployment_address_is_recorded_once() {
        let mut u = user();
        let first = Address::new([0xAA; 32]);
        let second = Address::new([0xBB; 32]);

        u.record_deployment(first);
        u.record_deployment(second);
        assert_eq!(u.deployed_contract(), Some(first));
    }
}
