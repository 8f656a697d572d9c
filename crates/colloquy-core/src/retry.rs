use std::future::Future;
use std::time::Duration;

/// Fixed-backoff retry schedule for flaky remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Outcome of a retried operation, keeping the attempt count visible so
/// call sites can either escalate or degrade with it.
#[derive(Debug)]
pub enum Attempted<T> {
    Ok { value: T, attempts: u32 },
    Exhausted { error: anyhow::Error, attempts: u32 },
}

impl<T> Attempted<T> {
    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            Attempted::Ok { value, .. } => Ok(value),
            Attempted::Exhausted { error, attempts } => {
                Err(error.context(format!("failed after {} attempts", attempts)))
            }
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times with a fixed sleep between
/// attempts. Retries on every error; classification of transient vs fatal
/// is deliberately not attempted here.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=max {
        match op().await {
            Ok(value) => return Attempted::Ok { value, attempts: attempt },
            Err(e) => {
                tracing::warn!(attempt, max_attempts = max, error = %e, "attempt failed");
                last_err = Some(e);
                if attempt < max {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }
    Attempted::Exhausted {
        error: last_err.unwrap_or_else(|| anyhow::anyhow!("operation never ran")),
        attempts: max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn first_attempt_success_counts_one() {
        let outcome = retry(&fast_policy(), || async { Ok::<_, anyhow::Error>(42) }).await;
        match outcome {
            Attempted::Ok { value, attempts } => {
                assert_eq!(value, 42);
                assert_eq!(attempts, 1);
            }
            Attempted::Exhausted { .. } => panic!("should not exhaust"),
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = retry(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("transient");
                }
                Ok("ok")
            }
        })
        .await;
        match outcome {
            Attempted::Ok { value, attempts } => {
                assert_eq!(value, "ok");
                assert_eq!(attempts, 3);
            }
            Attempted::Exhausted { .. } => panic!("should recover on third attempt"),
        }
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let outcome =
            retry(&fast_policy(), || async { Err::<(), _>(anyhow::anyhow!("down")) }).await;
        match outcome {
            Attempted::Exhausted { attempts, error } => {
                assert_eq!(attempts, 3);
                assert!(error.to_string().contains("down"));
            }
            Attempted::Ok { .. } => panic!("should exhaust"),
        }
        let err = retry(&fast_policy(), || async { Err::<(), _>(anyhow::anyhow!("down")) })
            .await
            .into_result()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("3 attempts"));
    }
}
