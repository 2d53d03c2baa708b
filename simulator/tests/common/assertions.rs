use std::future::Future;
use std::time::Duration;

/// Assert that a timing measurement is within acceptable bounds
pub fn assert_timing_within(actual_ms: u128, expected_ms: u128, tolerance_ms: u128, message: &str) {
    let diff = (actual_ms as i128 - expected_ms as i128).abs();
    assert!(
        diff <= tolerance_ms as i128,
        "{}: expected ~{}ms, got {}ms (diff: {}ms, tolerance: {}ms)",
        message,
        expected_ms,
        actual_ms,
        diff,
        tolerance_ms
    );
}

/// Polls `check` every 10ms until it returns true or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert that `expected` appears in `actual` as a subsequence
pub fn assert_in_order<T: PartialEq + std::fmt::Debug>(actual: &[T], expected: &[T]) {
    let mut remaining = actual.iter();
    for wanted in expected {
        assert!(
            remaining.any(|seen| seen == wanted),
            "{:?} missing or out of order in {:?}",
            wanted,
            actual
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_timing_within() {
        assert_timing_within(1_050, 1_000, 100, "test timing");
    }

    #[test]
    #[should_panic]
    fn test_assert_timing_outside_tolerance() {
        assert_timing_within(1_500, 1_000, 100, "test timing");
    }

    #[test]
    fn test_assert_in_order() {
        assert_in_order(&[1, 2, 3, 4], &[1, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn test_assert_in_order_rejects_reordering() {
        assert_in_order(&[1, 2, 3], &[3, 1]);
    }
}
