use log::debug;
use rand::Rng;
use std::time::Duration;

/// Deterministic part of the delay before attempt `attempt` (1-indexed).
/// The first attempt never waits; attempt k waits `base * k`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    base.saturating_mul(attempt)
}

/// Uniform random duration in `[0, max]`.
pub fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=max.as_millis() as u64))
}

/// Uniform random duration in `[min, max]`; `min` when the bounds are inverted.
pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64))
}

/// Sleeps before a retry so concurrent workers do not retry in lockstep.
pub async fn retry_pause(base: Duration, attempt: u32, max_jitter: Duration) {
    let delay = backoff_delay(base, attempt) + jitter(max_jitter);
    if delay.is_zero() {
        return;
    }
    debug!("Waiting {:.2}s before attempt {}...", delay.as_secs_f64(), attempt);
    tokio::time::sleep(delay).await;
}

/// Short randomized pause taken by every unit of work before its first request.
pub async fn dispatch_pause(min: Duration, max: Duration) {
    let delay = random_between(min, max);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_backoff() {
        assert_eq!(backoff_delay(Duration::from_secs(6), 1), Duration::ZERO);
        assert_eq!(backoff_delay(Duration::from_secs(6), 0), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_with_attempt_number() {
        let base = Duration::from_millis(500);
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = backoff_delay(base, attempt);
            assert!(delay >= previous, "attempt {} went backwards", attempt);
            previous = delay;
        }
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(1500));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let max = Duration::from_millis(250);
        for _ in 0..200 {
            assert!(jitter(max) <= max);
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn random_between_handles_inverted_bounds() {
        let min = Duration::from_millis(50);
        let max = Duration::from_millis(300);
        for _ in 0..200 {
            let d = random_between(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(random_between(max, min), max);
    }
}
