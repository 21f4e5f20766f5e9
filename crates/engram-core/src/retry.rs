//! Retry/backoff utility
//!
//! A single parameterized helper reused by the LLM provider and the
//! embedding provider (section 9 design notes: "a single utility
//! parameterized by attempts, minDelay, maxDelay, jitter, shouldRetry,
//! retryAfterHint"). Storage failures are deliberately not retried here —
//! section 7 has `StorageError` roll back and surface immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Detects the rate-limit signal from section 5: a message containing
/// `429`, `rate_limit`, or `rate limit`.
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("rate_limit") || lower.contains("rate limit")
}

/// Parses a `retry-after <n> <unit>` hint out of a provider error message,
/// if present. Supports `s`/`sec`/`second(s)`, `ms`/`millisecond(s)`, and
/// bare numbers (treated as seconds).
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let idx = lower.find("retry-after")?;
    let tail = &lower[idx + "retry-after".len()..];
    let tail = tail.trim_start_matches([' ', ':']);
    let mut chars = tail.char_indices();
    let mut end = 0;
    for (i, c) in chars.by_ref() {
        if c.is_ascii_digit() {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    if end == 0 {
        return None;
    }
    let n: u64 = tail[..end].parse().ok()?;
    let unit = tail[end..].trim_start();
    if unit.starts_with("ms") || unit.starts_with("millisecond") {
        Some(Duration::from_millis(n))
    } else {
        Some(Duration::from_secs(n))
    }
}

/// Runs `op` up to `cfg.attempts` times. `should_retry` decides whether a
/// given error is retryable at all; `retry_after_hint` lets a provider
/// override the computed delay with a server-supplied hint. On final
/// failure, returns the last error.
pub async fn with_backoff<T, E, Op, Fut, ShouldRetry, RetryAfter>(
    cfg: &RetryConfig,
    mut op: Op,
    should_retry: ShouldRetry,
    retry_after_hint: RetryAfter,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldRetry: Fn(&E) -> bool,
    RetryAfter: Fn(&E) -> Option<Duration>,
{
    let mut delay = cfg.min_delay;
    let mut last_err = None;
    for attempt in 0..cfg.attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retryable = should_retry(&e);
                let hint = retry_after_hint(&e);
                last_err = Some(e);
                if !retryable || attempt + 1 >= cfg.attempts {
                    break;
                }
                let base = hint.unwrap_or(delay).min(cfg.max_delay);
                let jittered = apply_jitter(base, cfg.jitter);
                tokio::time::sleep(jittered).await;
                delay = (delay * 2).min(cfg.max_delay);
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

fn apply_jitter(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    let millis = (base.as_millis() as f64 * factor).max(0.0);
    Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn detects_rate_limit_markers() {
        assert!(looks_rate_limited("HTTP 429 Too Many Requests"));
        assert!(looks_rate_limited("error: rate_limit_exceeded"));
        assert!(looks_rate_limited("please slow down (rate limit)"));
        assert!(!looks_rate_limited("internal server error"));
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(
            parse_retry_after("rate limited, retry-after 30 seconds"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Retry-After: 5"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("no hint here"), None);
    }

    #[test]
    fn parses_retry_after_milliseconds() {
        assert_eq!(
            parse_retry_after("retry-after 250ms"),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_budget() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            attempts: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        };
        let result: Result<u32, &str> = with_backoff(
            &cfg,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("rate_limit")
                    } else {
                        Ok(42)
                    }
                }
            },
            |e| looks_rate_limited(e),
            |_| None,
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_attempts() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            attempts: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        };
        let result: Result<u32, &str> = with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("rate_limit") }
            },
            |e| looks_rate_limited(e),
            |_| None,
        )
        .await;
        assert_eq!(result, Err("rate_limit"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig::default();
        let result: Result<u32, &str> = with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid_input") }
            },
            |e| looks_rate_limited(e),
            |_| None,
        )
        .await;
        assert_eq!(result, Err("invalid_input"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
