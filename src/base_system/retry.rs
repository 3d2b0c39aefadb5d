//! 重试与线性退避。
//!
//! 第 n 次（从 1 开始）失败后、若仍有剩余次数，等待 `base * n`；不加抖动。

use std::time::Duration;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::linear(DEFAULT_BACKOFF_BASE)
    }
}

impl Backoff {
    pub const fn linear(base: Duration) -> Self {
        Self { base }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }

    fn sleep_after(&self, attempt: u32) {
        let wait = self.delay_after(attempt);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

/// 最多尝试 `attempts` 次，任一次返回 `true` 立即结束。
///
/// `before_retry(attempt)` 在第 2 次及之后的尝试前调用，用来输出重试日志。
pub fn retry_with_backoff<B, F>(attempts: u32, backoff: Backoff, mut before_retry: B, mut op: F) -> bool
where
    B: FnMut(u32),
    F: FnMut(u32) -> bool,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if attempt > 1 {
            before_retry(attempt);
        }
        if op(attempt) {
            return true;
        }
        if attempt < attempts {
            backoff.sleep_after(attempt);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_WAIT: Backoff = Backoff::linear(Duration::ZERO);

    #[test]
    fn delay_grows_linearly() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_after(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_after(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_after(3), Duration::from_secs(6));
    }

    #[test]
    fn stops_at_first_success() {
        let mut calls = 0;
        let mut retries = Vec::new();
        let ok = retry_with_backoff(
            3,
            NO_WAIT,
            |a| retries.push(a),
            |_| {
                calls += 1;
                calls == 3
            },
        );
        assert!(ok);
        assert_eq!(calls, 3);
        assert_eq!(retries, vec![2, 3], "retry hook fires before attempts 2 and 3");
    }

    #[test]
    fn exhausts_all_attempts_on_failure() {
        let mut seen = Vec::new();
        let ok = retry_with_backoff(
            4,
            NO_WAIT,
            |_| {},
            |a| {
                seen.push(a);
                false
            },
        );
        assert!(!ok);
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let ok = retry_with_backoff(0, NO_WAIT, |_| {}, |_| {
            calls += 1;
            true
        });
        assert!(ok);
        assert_eq!(calls, 1);
    }

    #[test]
    fn first_try_success_never_calls_retry_hook() {
        let mut hook_calls = 0;
        assert!(retry_with_backoff(3, NO_WAIT, |_| hook_calls += 1, |_| true));
        assert_eq!(hook_calls, 0);
    }
}
