//! Retry and timeout behaviour observed through the public API.

use std::sync::Arc;
use std::time::Duration;

use finrag_model::{LanguageModel, MockModel, ModelError, RetryPolicy, RetryingModel, TimeoutModel};
use tokio::time::Instant;

fn unavailable() -> ModelError {
    ModelError::BackendUnavailable { backend: "mock".into(), message: "connection refused".into() }
}

fn rate_limited(retry_after: Option<Duration>) -> ModelError {
    ModelError::RateLimited { backend: "mock".into(), message: "429".into(), retry_after }
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy { max_retries, initial_backoff_ms: 100, max_backoff_ms: 1_000 }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    let mock = Arc::new(MockModel::new("answer").then_fail(unavailable()).then_fail(unavailable()));
    let model = RetryingModel::new(mock.clone(), policy(3));

    let started = Instant::now();
    assert_eq!(model.generate("q").await.unwrap(), "answer");
    assert_eq!(mock.call_count(), 3);
    // 100ms + 200ms of backoff on the paused clock.
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_sets_the_delay() {
    let mock = Arc::new(MockModel::new("ok").then_fail(rate_limited(Some(Duration::from_millis(700)))));
    let model = RetryingModel::new(mock.clone(), policy(1));

    let started = Instant::now();
    assert_eq!(model.generate("q").await.unwrap(), "ok");
    assert_eq!(started.elapsed(), Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let mock = Arc::new(
        MockModel::new("never")
            .then_fail(rate_limited(None))
            .then_fail(rate_limited(None))
            .then_fail(rate_limited(None)),
    );
    let model = RetryingModel::new(mock.clone(), policy(2));

    let err = model.generate("q").await.unwrap_err();
    assert!(matches!(err, ModelError::RateLimited { .. }));
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_failures_are_not_retried() {
    let mock = Arc::new(MockModel::new("never").then_fail(ModelError::InvalidRequest {
        backend: "mock".into(),
        message: "prompt too long".into(),
    }));
    let model = RetryingModel::new(mock.clone(), policy(5));

    assert!(matches!(model.generate("q").await, Err(ModelError::InvalidRequest { .. })));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn default_policy_does_not_retry() {
    let mock = Arc::new(MockModel::new("never").then_fail(unavailable()));
    let model = RetryingModel::new(mock.clone(), RetryPolicy::none());

    assert!(model.generate("q").await.is_err());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out_as_unavailable() {
    let mock = MockModel::new("late").with_delay(Duration::from_secs(30));
    let model = TimeoutModel::new(mock, Duration::from_secs(5));

    let err = model.generate("q").await.unwrap_err();
    assert!(matches!(err, ModelError::BackendUnavailable { .. }));
    assert!(err.is_transient());
}

#[tokio::test(start_paused = true)]
async fn timeouts_compose_with_retries() {
    let quick = MockModel::new("fast").with_delay(Duration::from_millis(10));
    let model = RetryingModel::new(TimeoutModel::new(quick, Duration::from_secs(1)), policy(1));
    assert_eq!(model.generate("q").await.unwrap(), "fast");
}

mod prop_backoff {
    use finrag_model::RetryPolicy;
    use proptest::prelude::*;

    proptest! {
        /// Delays never shrink from one retry to the next and never exceed the cap.
        #[test]
        fn prop_backoff_is_monotone_and_capped(
            initial in 1u64..5_000,
            max in 1u64..60_000,
            retry in 0u32..80,
        ) {
            let policy = RetryPolicy { max_retries: 3, initial_backoff_ms: initial, max_backoff_ms: max };
            let this = policy.backoff(retry);
            let next = policy.backoff(retry + 1);
            prop_assert!(this <= next);
            prop_assert!(next.as_millis() <= u128::from(max));
        }
    }
}
