use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedJob {
    job_id: String,
    task: JobFuture,
}

/// Operational snapshot of the pool. Visibility only, not correctness.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub running: bool,
    pub workers: usize,
    pub queue_depth: usize,
    pub active_jobs: usize,
    pub active_job_ids: Vec<String>,
}

/// FIFO work queue with a bounded, lazily topped-up worker pool.
///
/// Admission is FIFO through a single mpsc channel; with one worker that is
/// strict end-to-end ordering, with more only intra-job sequencing holds
/// (the engine owns that). Workers poll with a short timeout so `stop()` is
/// observed promptly, and a failing task is logged and swallowed rather
/// than taking its worker down.
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tx: mpsc::UnboundedSender<QueuedJob>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<QueuedJob>>,
    running: AtomicBool,
    max_workers: AtomicUsize,
    poll_interval: Duration,
    depth: AtomicUsize,
    live_workers: AtomicUsize,
    next_worker_id: AtomicU64,
    active: Mutex<HashSet<String>>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    pub fn new(max_workers: usize, poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx: AsyncMutex::new(rx),
                running: AtomicBool::new(false),
                max_workers: AtomicUsize::new(max_workers.max(1)),
                poll_interval,
                depth: AtomicUsize::new(0),
                live_workers: AtomicUsize::new(0),
                next_worker_id: AtomicU64::new(1),
                active: Mutex::new(HashSet::new()),
                workers: AsyncMutex::new(Vec::new()),
            }),
        }
    }

    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            max_workers = self.inner.max_workers.load(Ordering::SeqCst),
            "starting job queue"
        );
        self.ensure_workers().await;
    }

    /// Appends work and returns immediately. The pool is topped up here so
    /// a raised worker limit takes effect on the next enqueue.
    pub async fn enqueue(&self, job_id: impl Into<String>, task: JobFuture) -> anyhow::Result<()> {
        let job_id = job_id.into();
        info!(job_id = %job_id, "enqueueing job");
        self.inner
            .tx
            .send(QueuedJob {
                job_id,
                task,
            })
            .map_err(|_| anyhow::anyhow!("job queue channel closed"))?;
        self.inner.depth.fetch_add(1, Ordering::SeqCst);
        self.ensure_workers().await;
        Ok(())
    }

    /// Stops accepting new work and waits for in-flight tasks to finish,
    /// then clears the backlog. Drains, never aborts.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping job queue");
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.inner.workers.lock().await;
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        let mut rx = self.inner.rx.lock().await;
        while rx.try_recv().is_ok() {}
        self.inner.depth.store(0, Ordering::SeqCst);
        self.inner.active.lock().unwrap().clear();
        info!("job queue stopped");
    }

    pub fn set_max_workers(&self, max_workers: usize) {
        self.inner
            .max_workers
            .store(max_workers.max(1), Ordering::SeqCst);
    }

    pub fn status(&self) -> QueueStatus {
        let active = self.inner.active.lock().unwrap();
        let mut active_job_ids: Vec<String> = active.iter().cloned().collect();
        active_job_ids.sort();
        QueueStatus {
            running: self.inner.running.load(Ordering::SeqCst),
            workers: self.inner.live_workers.load(Ordering::SeqCst),
            queue_depth: self.inner.depth.load(Ordering::SeqCst),
            active_jobs: active.len(),
            active_job_ids,
        }
    }

    async fn ensure_workers(&self) {
        if !self.inner.running.load(Ordering::SeqCst) {
            return;
        }
        let mut workers = self.inner.workers.lock().await;
        workers.retain(|h| !h.is_finished());
        let max = self.inner.max_workers.load(Ordering::SeqCst);
        while workers.len() < max {
            let inner = self.inner.clone();
            let worker_id = inner.next_worker_id.fetch_add(1, Ordering::SeqCst);
            workers.push(tokio::spawn(worker_loop(inner, worker_id)));
            debug!(worker_id, total = workers.len(), "started new worker");
        }
    }
}

async fn worker_loop(inner: Arc<QueueInner>, worker_id: u64) {
    inner.live_workers.fetch_add(1, Ordering::SeqCst);
    debug!(worker_id, "worker started");
    loop {
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }
        let job = {
            let mut rx = inner.rx.lock().await;
            match timeout(inner.poll_interval, rx.recv()).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                // Poll timeout: loop around to observe shutdown.
                Err(_) => continue,
            }
        };
        inner.depth.fetch_sub(1, Ordering::SeqCst);
        let QueuedJob { job_id, task } = job;
        inner.active.lock().unwrap().insert(job_id.clone());
        info!(worker_id, job_id = %job_id, "worker picked up job");

        // Run the task on its own handle so a panic surfaces as a join
        // error here instead of unwinding through the worker.
        match tokio::spawn(task).await {
            Ok(()) => info!(worker_id, job_id = %job_id, "worker completed job"),
            Err(e) => error!(worker_id, job_id = %job_id, error = %e, "job task aborted"),
        }

        inner.active.lock().unwrap().remove(&job_id);
    }
    inner.live_workers.fetch_sub(1, Ordering::SeqCst);
    debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn test_queue(workers: usize) -> JobQueue {
        JobQueue::new(workers, Duration::from_millis(25))
    }

    async fn wait_until<F: Fn() -> bool>(cond: F, max: Duration) -> bool {
        let deadline = Instant::now() + max;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    #[tokio::test]
    async fn single_worker_is_strictly_fifo() {
        let queue = test_queue(1);
        queue.start().await;

        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let log = log.clone();
            queue
                .enqueue(
                    name,
                    Box::pin(async move {
                        log.lock().unwrap().push(format!("{name}:start"));
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        log.lock().unwrap().push(format!("{name}:end"));
                    }),
                )
                .await
                .unwrap();
        }

        assert!(
            wait_until(|| log.lock().unwrap().len() == 4, Duration::from_secs(2)).await,
            "both jobs should finish"
        );
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:start", "a:end", "b:start", "b:end"]
        );
        queue.stop().await;
    }

    #[tokio::test]
    async fn stop_drains_in_flight_task() {
        let queue = test_queue(2);
        queue.start().await;

        let finished_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let marker = finished_at.clone();
        queue
            .enqueue(
                "slow",
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(120)).await;
                    *marker.lock().unwrap() = Some(Instant::now());
                }),
            )
            .await
            .unwrap();

        // Let a worker pick it up before stopping.
        tokio::time::sleep(Duration::from_millis(40)).await;
        queue.stop().await;
        let stopped_at = Instant::now();

        let finished = finished_at.lock().unwrap().expect("task must complete");
        assert!(finished <= stopped_at, "stop returned before task finished");
        assert!(!queue.status().running);
        assert_eq!(queue.status().queue_depth, 0);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stall_the_pool() {
        let queue = test_queue(1);
        queue.start().await;

        queue
            .enqueue("boom", Box::pin(async { panic!("task blew up") }))
            .await
            .unwrap();

        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        queue
            .enqueue(
                "after",
                Box::pin(async move {
                    *flag.lock().unwrap() = true;
                }),
            )
            .await
            .unwrap();

        assert!(
            wait_until(|| *ran.lock().unwrap(), Duration::from_secs(2)).await,
            "job after the panic should still run"
        );
        queue.stop().await;
    }

    #[tokio::test]
    async fn status_reports_pool_shape() {
        let queue = test_queue(3);
        assert!(!queue.status().running);
        queue.start().await;
        assert!(
            wait_until(|| queue.status().workers == 3, Duration::from_secs(1)).await,
            "all workers should come up"
        );
        let status = queue.status();
        assert!(status.running);
        assert_eq!(status.queue_depth, 0);
        assert!(status.active_job_ids.is_empty());
        queue.stop().await;
        assert_eq!(queue.status().workers, 0);
    }
}
