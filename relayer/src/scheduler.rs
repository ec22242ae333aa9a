//! Keyed task scheduler.
//!
//! Jobs are keyed by `(shard, contract)`. Each key is served by one worker
//! task, so jobs of a key run one at a time and in submission order, while
//! different keys run concurrently up to `max_workers`. A worker that sees
//! no job for `idle_timeout` closes its queue, drains what is left and
//! exits, releasing its slot; the next job for that key starts a new one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::types::ShardId;

pub type TaskKey = (ShardId, String);

type Handler<J> = Arc<dyn Fn(&TaskKey, J) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    Closed,
    #[error("worker for shard {0} contract {1} stopped")]
    WorkerGone(ShardId, String),
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    /// Jobs buffered per key before `submit` waits.
    pub queue_depth: usize,
    pub idle_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            queue_depth: 64,
            idle_timeout: Duration::from_secs(5),
        }
    }
}

pub struct TaskScheduler<J> {
    config: SchedulerConfig,
    handler: Handler<J>,
    permits: Arc<Semaphore>,
    workers: HashMap<TaskKey, mpsc::Sender<J>>,
    tasks: JoinSet<()>,
}

impl<J: Send + 'static> TaskScheduler<J> {
    /// `handler` runs on the blocking pool, once per job.
    pub fn new<F>(config: SchedulerConfig, handler: F) -> Self
    where
        F: Fn(&TaskKey, J) + Send + Sync + 'static,
    {
        let permits = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            handler: Arc::new(handler),
            permits,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Queues `job` for `key`, starting a worker if none is live.
    ///
    /// Waits when the key's queue is full, or when a new worker is needed
    /// and all slots are taken.
    pub async fn submit(&mut self, key: TaskKey, job: J) -> Result<(), SchedulerError> {
        while self.tasks.try_join_next().is_some() {}

        let mut job = job;
        if let Some(sender) = self.workers.get(&key) {
            match sender.send(job).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    self.workers.remove(&key);
                    job = returned;
                }
            }
        }

        let sender = self.spawn_worker(key.clone()).await?;
        sender
            .send(job)
            .await
            .map_err(|_| SchedulerError::WorkerGone(key.0, key.1))
    }

    /// Number of workers currently holding a slot.
    pub fn live_workers(&self) -> usize {
        self.config.max_workers.max(1) - self.permits.available_permits()
    }

    async fn spawn_worker(&mut self, key: TaskKey) -> Result<mpsc::Sender<J>, SchedulerError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::Closed)?;
        let (sender, mut receiver) = mpsc::channel::<J>(self.config.queue_depth.max(1));
        let handler = self.handler.clone();
        let idle_timeout = self.config.idle_timeout;
        let worker_key = key.clone();

        self.tasks.spawn(async move {
            let _permit = permit;
            tracing::debug!(shard = worker_key.0, contract = %worker_key.1, "worker started");
            loop {
                let job = match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                    Ok(Some(job)) => job,
                    Ok(None) => break,
                    Err(_) => {
                        receiver.close();
                        while let Ok(job) = receiver.try_recv() {
                            run_job(&handler, &worker_key, job).await;
                        }
                        break;
                    }
                };
                run_job(&handler, &worker_key, job).await;
            }
            tracing::debug!(shard = worker_key.0, contract = %worker_key.1, "worker stopped");
        });

        self.workers.insert(key, sender.clone());
        Ok(sender)
    }

    /// Closes every queue and waits for the workers to finish their jobs.
    pub async fn shutdown(mut self) {
        self.workers.clear();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }
        self.permits.close();
    }
}

async fn run_job<J: Send + 'static>(handler: &Handler<J>, key: &TaskKey, job: J) {
    let handler = handler.clone();
    let key = key.clone();
    let shard = key.0;
    if let Err(e) = tokio::task::spawn_blocking(move || handler(&key, job)).await {
        tracing::error!(shard, error = %e, "job panicked");
    }
}
