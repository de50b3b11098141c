use std::time::Duration;

/// Exponential backoff: sleep `base * 2^attempt` before the next attempt.
pub fn delay_for_attempt(base: Duration, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    base.checked_mul(factor.min(u32::MAX as u64) as u32)
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_each_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(delay_for_attempt(base, 0), Duration::from_millis(100));
        assert_eq!(delay_for_attempt(base, 1), Duration::from_millis(200));
        assert_eq!(delay_for_attempt(base, 3), Duration::from_millis(800));
    }
}
