//! Property-based tests for the pure parts of the harness: failure
//! classification and reclaim/backoff arithmetic.

use std::time::Duration;

use ledger_bench::prelude::*;
use proptest::prelude::*;

fn submit_error_strategy() -> impl Strategy<Value = SubmitError> {
    prop_oneof![
        Just(SubmitError::PoolFull),
        ".*".prop_map(SubmitError::Disconnected),
        (any::<u64>(), any::<u64>())
            .prop_map(|(expected, got)| SubmitError::NonceMismatch { expected, got }),
        Just(SubmitError::BadSignature),
        any::<[u8; 32]>().prop_map(|bytes| SubmitError::NotAuthorized(Address::new(bytes))),
        (any::<u64>(), any::<u64>())
            .prop_map(|(need, have)| SubmitError::InsufficientBalance { need, have }),
        ".*".prop_map(SubmitError::Protocol),
    ]
}

proptest! {
    #[test]
    fn every_submit_error_has_exactly_one_class(err in submit_error_strategy()) {
        let class = err.class();
        prop_assert_eq!(err.is_fatal(), class == FailureClass::Fatal);

        // transient and rejected failures never kill a user
        if matches!(class, FailureClass::Transient | FailureClass::Rejected) {
            prop_assert!(!err.is_fatal());
        }
    }

    #[test]
    fn surplus_never_exceeds_balance(balance in any::<u64>(), reserve in any::<u64>()) {
        let surplus = balance.saturating_sub(reserve);
        prop_assert!(surplus <= balance);
        if balance <= reserve {
            prop_assert_eq!(surplus, 0);
        }
    }

    #[test]
    fn reclaim_backoff_is_monotone_and_capped(
        base in 1u64..10_000,
        cap in 1u64..60_000,
        attempt in 1u32..64,
    ) {
        let config = HarnessConfig {
            reclaim_backoff_ms: base,
            reclaim_backoff_cap_ms: cap,
            ..Default::default()
        };

        let current = config.reclaim_backoff(attempt);
        let next = config.reclaim_backoff(attempt + 1);

        prop_assert!(current <= Duration::from_millis(cap));
        prop_assert!(current <= next);
    }
}
