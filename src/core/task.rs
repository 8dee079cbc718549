use crate::utils::error::{ErrorSeverity, Result, SatflowError};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

/// 任務重試策略，最多執行 `1 + max_retries` 次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Retrying { attempt: u32 },
    Success,
    Failed {
        message: String,
        severity: ErrorSeverity,
    },
    /// 上游任務失敗，本任務未執行
    TriggerFailed,
}

impl TaskState {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Success)
    }

    pub fn failed(error: &SatflowError) -> Self {
        TaskState::Failed {
            message: error.to_string(),
            severity: error.severity(),
        }
    }

    pub fn severity(&self) -> Option<ErrorSeverity> {
        match self {
            TaskState::Failed { severity, .. } => Some(*severity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub name: String,
    pub state: TaskState,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl TaskRun {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: TaskState::Pending,
            attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn trigger_failed(name: impl Into<String>) -> Self {
        Self {
            state: TaskState::TriggerFailed,
            ..Self::pending(name)
        }
    }
}

/// 執行任務，可重試的錯誤在延遲後重跑；設定類錯誤立即失敗
pub async fn run_with_retry<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> (Result<T>, TaskRun)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut run = TaskRun::pending(name);
    let max_attempts = policy.max_attempts();

    loop {
        run.attempts += 1;
        run.state = TaskState::Running;
        tracing::info!("▶️ Task '{}': starting attempt {}/{}", name, run.attempts, max_attempts);

        match operation(run.attempts).await {
            Ok(value) => {
                run.state = TaskState::Success;
                run.duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!("✅ Task '{}': finished with state Success", name);
                return (Ok(value), run);
            }
            Err(e) if e.is_retryable() && run.attempts < max_attempts => {
                run.state = TaskState::Retrying {
                    attempt: run.attempts,
                };
                tracing::warn!(
                    "🔁 Task '{}': attempt {} failed ({}), retrying in {:?}",
                    name,
                    run.attempts,
                    e,
                    policy.retry_delay
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => {
                run.state = TaskState::failed(&e);
                run.duration_ms = started.elapsed().as_millis() as u64;
                tracing::error!(
                    "❌ Task '{}': failed after {} attempt(s): {}",
                    name,
                    run.attempts,
                    e
                );
                return (Err(e), run);
            }
        }
    }
}

/// 上游失敗時給下游使用的錯誤
pub fn upstream_failed(task: &str, upstream: &str) -> SatflowError {
    SatflowError::TaskError {
        task: task.to_string(),
        details: format!("upstream task '{}' did not succeed", upstream),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> SatflowError {
        SatflowError::ProviderError {
            provider: "Copernicus".to_string(),
            status: 503,
            message: "busy".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let (result, run) = run_with_retry("query", &policy, move |_| async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(run.attempts, 3);
        assert_eq!(run.state, TaskState::Success);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let (result, run) =
            run_with_retry("query", &policy, |_| async { Err::<(), _>(transient()) }).await;

        assert!(result.is_err());
        assert_eq!(run.attempts, 4);
        assert!(matches!(run.state, TaskState::Failed { .. }));
        assert_eq!(run.state.severity(), Some(ErrorSeverity::Medium));
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let (result, run) = run_with_retry("query", &policy, |_| async {
            Err::<(), _>(SatflowError::MissingConfigError {
                field: "DHUS_USER / DHUS_PASSWORD".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(run.attempts, 1);
        assert_eq!(run.state.severity(), Some(ErrorSeverity::High));
    }

    #[tokio::test]
    async fn test_waits_retry_delay_between_attempts() {
        let policy = RetryPolicy::new(1, Duration::from_millis(50));
        let started = Instant::now();

        let (_, run) =
            run_with_retry("query", &policy, |_| async { Err::<(), _>(transient()) }).await;

        assert_eq!(run.attempts, 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_policy_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(TaskRun::trigger_failed("download_all").state.severity(), None);
    }
}
