use crate::config::RunnerConfig;
use crate::engine::Engine;
use crate::model::{BatchResults, BatchStatus, JobStatus, TestSpec};
use crate::queue::{JobQueue, QueueStatus};
use crate::storage::{JobUpdate, ResultStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Caller surface over the queue, engine and store. Submission is
/// fire-and-forget; status and result queries read the store directly,
/// decoupled from in-flight execution.
pub struct Pipeline {
    queue: JobQueue,
    engine: Arc<Engine>,
    store: Arc<dyn ResultStore>,
}

impl Pipeline {
    pub fn new(config: &RunnerConfig, engine: Engine, store: Arc<dyn ResultStore>) -> Self {
        Self {
            queue: JobQueue::new(
                config.max_workers,
                Duration::from_millis(config.poll_interval_ms),
            ),
            engine: Arc::new(engine),
            store,
        }
    }

    pub async fn start(&self) {
        self.queue.start().await;
    }

    /// Waits for in-flight jobs to finish, then clears the backlog.
    pub async fn stop(&self) {
        self.queue.stop().await;
    }

    /// Records the job as queued and hands it to the worker pool. Returns
    /// as soon as the job is admitted.
    pub async fn enqueue_batch(
        &self,
        job_id: &str,
        batch_id: &str,
        tests: Vec<TestSpec>,
    ) -> anyhow::Result<()> {
        self.store
            .create_job(job_id, batch_id, tests.len() as u32)?;

        let engine = self.engine.clone();
        let store = self.store.clone();
        let job_id_owned = job_id.to_string();
        let batch_id_owned = batch_id.to_string();
        let task = Box::pin(async move {
            if let Err(e) = engine
                .execute_batch(&job_id_owned, &batch_id_owned, &tests)
                .await
            {
                // Errors escaping the engine are batch-scoped: fail the job.
                error!(job_id = %job_id_owned, error = %e, "batch execution failed");
                if let Err(store_err) = store.update_job_status(
                    &job_id_owned,
                    JobStatus::Failed,
                    JobUpdate {
                        error: Some(format!("{e:#}")),
                        clear_current: true,
                        ..Default::default()
                    },
                ) {
                    error!(job_id = %job_id_owned, error = %store_err, "failed to record job failure");
                }
            }
        });

        self.queue.enqueue(job_id, task).await
    }

    pub fn get_status(&self, job_id: &str) -> anyhow::Result<Option<BatchStatus>> {
        self.store.get_batch_status(job_id)
    }

    pub fn get_results(
        &self,
        job_id: &str,
        include_scraped_content: bool,
    ) -> anyhow::Result<Option<BatchResults>> {
        self.store.get_batch_results(job_id, include_scraped_content)
    }

    pub fn queue_health(&self) -> QueueStatus {
        self.queue.status()
    }

    pub fn set_max_workers(&self, max_workers: usize) {
        self.queue.set_max_workers(max_workers);
    }
}
