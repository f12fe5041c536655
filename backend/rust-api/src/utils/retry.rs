use std::time::Duration;

/// Exponential backoff with optional random jitter.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl RetryConfig {
    /// Waiting on a lock held by a concurrent submission in the same module.
    /// Bounded to roughly one second in total before giving up.
    pub fn lock_wait() -> Self {
        Self {
            max_attempts: 8,
            base_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(250),
            jitter_max: Some(Duration::from_millis(25)),
        }
    }

    fn jitter(&self) -> Duration {
        match self.jitter_max {
            Some(jitter_max) if !jitter_max.is_zero() => {
                let jitter_ms = jitter_max.as_millis() as u64;
                Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
            }
            _ => Duration::ZERO,
        }
    }
}

/// Runs `f` until it succeeds, fails with an error `retryable` rejects, or the
/// attempts run out. The last error is returned.
pub async fn retry_while<F, Fut, T, E, P>(config: &RetryConfig, retryable: P, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts;
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !retryable(&e) {
                    return Err(e);
                }
                tokio::time::sleep(backoff + config.jitter()).await;
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn succeeds_after_retries() {
        let counter = AtomicUsize::new(0);

        let res: Result<usize, &'static str> = retry_while(&fast(), |_| true, || async {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("busy")
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let cfg = RetryConfig {
            max_attempts: 2,
            ..fast()
        };

        let res: Result<(), &'static str> = retry_while(&cfg, |_| true, || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("always busy")
        })
        .await;

        assert_eq!(res, Err("always busy"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_return_at_once() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> = retry_while(&fast(), |e| *e == "busy", || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("broken")
        })
        .await;

        assert_eq!(res, Err("broken"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lock_wait_is_bounded() {
        let cfg = RetryConfig::lock_wait();
        let mut backoff = cfg.base_backoff;
        let mut total = Duration::ZERO;
        for _ in 1..cfg.max_attempts {
            total += backoff + cfg.jitter_max.unwrap_or_default();
            backoff = std::cmp::min(backoff * 2, cfg.max_backoff);
        }
        assert!(total <= Duration::from_millis(1500));
    }
}
