//! Failure-path tests: circuit breaking, failure classification, faucet
//! depletion, reclaim retry behavior and timeout handling.

use std::sync::Arc;

use ledger_bench::prelude::*;
use ledger_bench::sim::{SimFault, SimLedger};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn faucet() -> FaucetAccount {
    FaucetAccount::new(Keypair::from_seed([0xAA; 32]))
}

fn artifact() -> ContractArtifact {
    ContractArtifact::new(vec![0x00, 0x61, 0x73, 0x6d])
}

fn sim_with_faucet() -> Arc<SimLedger> {
    Arc::new(
        SimLedger::builder()
            .with_root(faucet().address(), 1 << 54)
            .build(),
    )
}

fn fast_retry_config() -> HarnessConfig {
    HarnessConfig {
        funding_amount: 10_000,
        reclaim_reserve: 1_000,
        reclaim_backoff_ms: 1,
        reclaim_backoff_cap_ms: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn fatal_authorization_failure_kills_the_user() {
    init_logs();
    let sim = sim_with_faucet();
    // funding passes, the authorization submission hits a fatal node error
    sim.inject_faults([SimFault::Pass, SimFault::Protocol]);
    let harness = LoadHarness::new(
        sim.clone(),
        faucet(),
        artifact(),
        HarnessConfig::default(),
    );

    let err = harness.provision().await.unwrap_err();
    let HarnessError::ProvisioningFailed { user, reason } = err else {
        panic!("expected ProvisioningFailed");
    };
    let mut user = *user;
    assert!(user.is_dead());
    assert!(reason.contains("authorization"));
    assert!(harness.breaker().is_dead(&user.address()));

    // every later step is a no-op success with zero network contact
    let submissions = sim.submissions();
    let receiver = Keypair::from_seed([0xBB; 32]).address();

    let outcome = harness.transfer(&mut user, receiver, 1, 0).await.unwrap();
    assert_eq!(outcome, StepOutcome::SkippedDead);

    let outcome = harness
        .deploy_once_and_call(&mut user, 1, Vec::new())
        .await
        .unwrap();
    assert_eq!(outcome, StepOutcome::SkippedDead);

    let outcome = harness.reclaim(&mut user).await.unwrap();
    assert_eq!(outcome, ReclaimOutcome::SkippedDead);

    assert_eq!(sim.submissions(), submissions);
}

#[tokio::test]
async fn same_nonce_concurrent_submissions_accept_exactly_one() {
    let user = Keypair::from_seed([0x01; 32]);
    let sim = SimLedger::builder()
        .with_root(faucet().address(), 1 << 40)
        .with_funded_account(user.address(), 10_000)
        .with_authorized(user.address())
        .build();

    let receiver = Keypair::from_seed([0xBB; 32]).address();
    let payload = || TxPayload::Transfer {
        to: receiver,
        amount: 1,
    };

    let (first, second) = futures::join!(
        sim.submit(&user, NonceAssignment::Explicit(0), payload()),
        sim.submit(&user, NonceAssignment::Explicit(0), payload()),
    );

    // exactly one wins the nonce slot; the other is rejected
    assert!(first.is_ok() != second.is_ok());
    let rejected = match (first, second) {
        (Err(err), Ok(_)) | (Ok(_), Err(err)) => err,
        _ => unreachable!(),
    };
    assert!(matches!(rejected, SubmitError::NonceMismatch { .. }));
    assert_eq!(sim.next_nonce_of(&user.address()), 1);
}

#[tokio::test]
async fn depleted_faucet_is_a_run_level_failure() {
    let sim = Arc::new(
        SimLedger::builder()
            .with_root(faucet().address(), 50)
            .build(),
    );
    let config = HarnessConfig {
        funding_amount: 1_000_000,
        ..Default::default()
    };
    let harness = LoadHarness::new(sim, faucet(), artifact(), config);

    let err = harness.provision().await.unwrap_err();
    assert!(matches!(err, HarnessError::FaucetDepleted { .. }));
    assert!(err.is_run_fatal());
    // not a per-user failure: nothing was written off
    assert_eq!(harness.breaker().dead_count(), 0);
}

#[tokio::test]
async fn transient_spam_failure_is_swallowed() {
    let sim = sim_with_faucet();
    let harness = LoadHarness::new(
        sim.clone(),
        faucet(),
        artifact(),
        HarnessConfig::default(),
    );

    let mut user = harness.provision().await.unwrap();
    let receiver = Keypair::from_seed([0xBB; 32]).address();

    sim.inject_fault(SimFault::PoolFull);
    let outcome = harness.transfer(&mut user, receiver, 1, 0).await.unwrap();
    assert_eq!(outcome, StepOutcome::TransientDropped);

    // the nonce slot was not consumed; the user is alive and the next
    // iteration succeeds at the same nonce
    assert!(user.is_ready());
    assert_eq!(user.nonce_counter(), 0);

    let outcome = harness.transfer(&mut user, receiver, 1, 0).await.unwrap();
    assert_eq!(outcome, StepOutcome::Submitted);
}

#[tokio::test]
async fn nonce_gap_is_a_rejected_outcome_not_an_error() {
    let sim = sim_with_faucet();
    let harness = LoadHarness::new(
        sim.clone(),
        faucet(),
        artifact(),
        HarnessConfig::default(),
    );

    let mut user = harness.provision().await.unwrap();
    let receiver = Keypair::from_seed([0xBB; 32]).address();

    let outcome = harness.transfer(&mut user, receiver, 1, 5).await.unwrap();
    assert!(matches!(outcome, StepOutcome::Rejected { .. }));
    assert!(user.is_ready());
    assert_eq!(user.nonce_counter(), 0);
}

#[tokio::test]
async fn reclaim_retries_through_transient_pool_pressure() {
    init_logs();
    let sim = sim_with_faucet();
    let harness = LoadHarness::new(sim.clone(), faucet(), artifact(), fast_retry_config());

    let mut user = harness.provision().await.unwrap();

    sim.inject_fault(SimFault::PoolFull);
    let outcome = harness.reclaim(&mut user).await.unwrap();

    let surplus = 10_000 - 1_000;
    assert_eq!(outcome, ReclaimOutcome::Reclaimed { amount: surplus });
    assert!(user.is_ready());
}

#[tokio::test]
async fn reclaim_gives_up_after_its_retry_budget() {
    let sim = sim_with_faucet();
    let config = HarnessConfig {
        reclaim_max_retries: 1,
        ..fast_retry_config()
    };
    let harness = LoadHarness::new(sim.clone(), faucet(), artifact(), config);

    let mut user = harness.provision().await.unwrap();

    // one initial attempt plus one retry, both refused
    sim.inject_faults([SimFault::PoolFull, SimFault::PoolFull]);
    let err = harness.reclaim(&mut user).await.unwrap_err();
    assert!(matches!(err, HarnessError::ReclaimFailed { .. }));
    assert!(user.is_dead());
    assert!(harness.breaker().is_dead(&user.address()));
}

#[tokio::test]
async fn spam_finality_timeout_is_transient() {
    let sim = sim_with_faucet();
    let config = HarnessConfig {
        finality_timeout_ms: 50,
        ..Default::default()
    };
    let harness = LoadHarness::new(sim.clone(), faucet(), artifact(), config);

    let mut user = harness.provision().await.unwrap();
    let receiver = Keypair::from_seed([0xBB; 32]).address();

    sim.inject_fault(SimFault::StallFinality);
    let outcome = harness
        .transfer_and_wait(&mut user, receiver, 1, 0)
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::TransientDropped);
    assert!(user.is_ready());
    assert!(!harness.breaker().is_dead(&user.address()));
    assert_eq!(sim.stalled_watches(), 1);
}

#[tokio::test]
async fn provisioning_finality_timeout_is_fatal() {
    let sim = sim_with_faucet();
    // the funding transfer stalls; authorization finalizes normally
    sim.inject_fault(SimFault::StallFinality);
    let config = HarnessConfig {
        finality_timeout_ms: 50,
        ..Default::default()
    };
    let harness = LoadHarness::new(sim.clone(), faucet(), artifact(), config);

    let err = harness.provision().await.unwrap_err();
    let HarnessError::ProvisioningFailed { user, reason } = err else {
        panic!("expected ProvisioningFailed");
    };
    assert!(user.is_dead());
    assert!(reason.contains("funding"));
    assert_eq!(harness.breaker().dead_count(), 1);
}

#[tokio::test]
async fn in_flight_rejection_wastes_the_iteration_only() {
    let sim = sim_with_faucet();
    let harness = LoadHarness::new(
        sim.clone(),
        faucet(),
        artifact(),
        HarnessConfig::default(),
    );

    let mut user = harness.provision().await.unwrap();
    let receiver = Keypair::from_seed([0xBB; 32]).address();

    sim.inject_fault(SimFault::RejectInFlight);
    let outcome = harness
        .transfer_and_wait(&mut user, receiver, 1, 0)
        .await
        .unwrap();

    assert!(matches!(outcome, StepOutcome::Rejected { .. }));
    assert!(user.is_ready());
}
