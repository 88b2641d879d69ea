use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use threadline_common::{Result, RetryConfig, ThreadlineError};

/// How an error should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Fatal,
}

/// Message fragments the graph backend uses for conditions that clear on their own.
const TRANSIENT_MARKERS: &[&str] = &[
    "neo.transienterror",
    "deadlock",
    "lockclient",
    "lock acquisition",
    "connection reset",
    "broken pipe",
    "connection refused",
    "service unavailable",
];

/// The single place backend-specific transient detection lives.
pub fn classify(err: &ThreadlineError) -> ErrorClass {
    match err {
        ThreadlineError::Backend(msg) => {
            let msg = msg.to_lowercase();
            if TRANSIENT_MARKERS.iter().any(|m| msg.contains(m)) {
                ErrorClass::Transient
            } else {
                ErrorClass::Fatal
            }
        }
        _ => ErrorClass::Fatal,
    }
}

/// Bounded exponential backoff: delay before retry n is base * 2^n plus up to base of jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_cap = self.base_delay.as_millis() as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };
        exp + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget runs out.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if classify(&e) == ErrorClass::Transient => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(ThreadlineError::RetriesExhausted {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn deadlock() -> ThreadlineError {
        ThreadlineError::Backend(
            "Neo4j error `Neo.TransientError.Transaction.DeadlockDetected`: ForsetiClient can't acquire lock".into(),
        )
    }

    #[test]
    fn classifies_backend_signals() {
        assert_eq!(classify(&deadlock()), ErrorClass::Transient);
        assert_eq!(
            classify(&ThreadlineError::Backend("LockClient[12] can't wait on resource".into())),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&ThreadlineError::Backend("Neo.ClientError.Statement.SyntaxError".into())),
            ErrorClass::Fatal
        );
        assert_eq!(classify(&ThreadlineError::ChannelClosed), ErrorClass::Fatal);
        assert_eq!(
            classify(&ThreadlineError::MalformedComponent {
                component_id: 1,
                reason: "deadlock".into()
            }),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn backoff_grows_and_stays_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        for attempt in 0..3 {
            let d = policy.backoff(attempt);
            let floor = Duration::from_millis(100 * 2u64.pow(attempt));
            assert!(d >= floor && d <= floor + Duration::from_millis(100));
        }
        let zero = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };
        assert_eq!(zero.backoff(2), Duration::ZERO);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = fast()
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(deadlock())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(deadlock())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadlineError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ThreadlineError::Backend("Neo.ClientError.Schema".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadlineError::Backend(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
