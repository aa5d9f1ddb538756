//! Assertion helpers over the ledger client, for harness test suites.
//!
//! These make scenario tests more readable and give better error messages
//! than raw comparisons against [`LedgerClient::account_state`] output.

use anyhow::{Context, Result};

use crate::ledger::{Address, LedgerClient};

/// Assert that an account holds exactly `expected` base units.
pub async fn assert_balance(
    client: &dyn LedgerClient,
    address: &Address,
    expected: u64,
) -> Result<()> {
    let snapshot = client
        .account_state(address)
        .await
        .with_context(|| format!("failed to query state for {}", address))?;

    if snapshot.free_balance != expected {
        anyhow::bail!(
            "balance mismatch for {}: expected {}, got {}",
            address,
            expected,
            snapshot.free_balance
        );
    }

    Ok(())
}

/// Assert that an account balance is within `tolerance` of `expected`.
///
/// Useful where fees or execution order make the exact value vary.
pub async fn assert_balance_within(
    client: &dyn LedgerClient,
    address: &Address,
    expected: u64,
    tolerance: u64,
) -> Result<()> {
    let snapshot = client
        .account_state(address)
        .await
        .with_context(|| format!("failed to query state for {}", address))?;

    let min = expected.saturating_sub(tolerance);
    let max = expected.saturating_add(tolerance);
    if snapshot.free_balance < min || snapshot.free_balance > max {
        anyhow::bail!(
            "balance for {} outside tolerance: expected {} ± {}, got {}",
            address,
            expected,
            tolerance,
            snapshot.free_balance
        );
    }

    Ok(())
}

/// Assert that an account's next expected nonce equals `expected`.
pub async fn assert_nonce(
    client: &dyn LedgerClient,
    address: &Address,
    expected: u64,
) -> Result<()> {
    let snapshot = client
        .account_state(address)
        .await
        .with_context(|| format!("failed to query state for {}", address))?;

    if snapshot.next_nonce != expected {
        anyhow::bail!(
            "nonce mismatch for {}: expected {}, got {}",
            address,
            expected,
            snapshot.next_nonce
        );
    }

    Ok(())
}
