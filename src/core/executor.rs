use crate::core::task::{run_with_retry, RetryPolicy, TaskRun, TaskState};
use crate::utils::error::{Result, SatflowError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 固定工作數的本機執行器，同時執行的任務數不超過 `num_workers`
#[derive(Debug, Clone)]
pub struct FlowExecutor {
    permits: Arc<Semaphore>,
    num_workers: usize,
}

impl FlowExecutor {
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(num_workers)),
            num_workers,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// 取得 worker 後執行任務（含重試），重試等待期間仍占用 worker
    pub async fn run_task<T, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        operation: F,
    ) -> (Result<T>, TaskRun)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let mut run = TaskRun::pending(name);
                let err = SatflowError::TaskError {
                    task: name.to_string(),
                    details: "executor has been shut down".to_string(),
                };
                run.state = TaskState::failed(&err);
                return (Err(err), run);
            }
        };

        run_with_retry(name, policy, operation).await
    }
}

impl Default for FlowExecutor {
    fn default() -> Self {
        Self::new(8)
    }
}
