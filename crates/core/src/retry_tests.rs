use super::*;
use proptest::prelude::*;

#[yare::parameterized(
    first   = { 1, 1 },
    second  = { 2, 2 },
    third   = { 3, 4 },
    sixth   = { 6, 32 },
    capped  = { 12, 300 },
    huge    = { 10_000, 300 },
)]
fn delay_doubles_until_cap(attempt: u32, secs: u64) {
    assert_eq!(Backoff::default().delay_for(attempt), Duration::from_secs(secs));
}

#[test]
fn gives_up_after_max_attempts() {
    let backoff = Backoff::default();
    assert_eq!(
        backoff.next(7, Duration::ZERO),
        RetryDecision::RetryAfter(Duration::from_secs(64))
    );
    assert_eq!(backoff.next(8, Duration::ZERO), RetryDecision::GiveUp);
}

#[test]
fn gives_up_when_deadline_would_pass() {
    let backoff = Backoff {
        deadline: Duration::from_secs(10),
        ..Backoff::default()
    };
    assert_eq!(
        backoff.next(3, Duration::from_secs(5)),
        RetryDecision::RetryAfter(Duration::from_secs(4))
    );
    assert_eq!(backoff.next(4, Duration::from_secs(9)), RetryDecision::GiveUp);
}

proptest! {
    #[test]
    fn delay_is_monotonic_and_bounded(attempt in 1u32..200) {
        let backoff = Backoff::default();
        let a = backoff.delay_for(attempt);
        let b = backoff.delay_for(attempt + 1);
        prop_assert!(a <= b);
        prop_assert!(b <= backoff.max);
    }
}
