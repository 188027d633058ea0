//! Work queue with idempotent enqueue and timer-based delayed redelivery.
//!
//! Operation ids wait in a ready list for one of the workers. An id is
//! held at most once in the ready list; an id added while a worker is
//! processing it is marked dirty and handed out again once that worker is
//! done. Delays requested by the executor become a next eligible time per
//! id, promoted into the ready list by a dedicated timer task, so no worker
//! ever sleeps on behalf of an operation.

use crate::errors::OpflowError;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Enqueue port used by triggers and recovery.
pub trait Queue: Send + Sync {
    /// Enqueues an operation id. Adding an id that is already queued is a no-op.
    fn add(&self, operation_id: &str);
}

/// Processes one delivery of an operation id.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs the operation and returns when it wants to be delivered again.
    ///
    /// A zero delay means no redelivery is needed.
    async fn execute(&self, operation_id: &str) -> Result<Duration, OpflowError>;
}

fn default_name() -> String {
    "operations".to_string()
}

fn default_workers() -> usize {
    5
}

fn default_speed_factor() -> u32 {
    1
}

/// Configuration of a [`WorkQueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Divides every redelivery delay. Values above 1 speed up local runs and tests.
    #[serde(default = "default_speed_factor")]
    pub speed_factor: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            workers: default_workers(),
            speed_factor: default_speed_factor(),
        }
    }
}

impl QueueConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the speed factor.
    #[must_use]
    pub fn with_speed_factor(mut self, speed_factor: u32) -> Self {
        self.speed_factor = speed_factor;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<String>,
    queued: HashSet<String>,
    processing: HashSet<String>,
    dirty: HashSet<String>,
    waiting: HashMap<String, Instant>,
}

impl State {
    /// Returns true if the id became ready.
    fn push_ready(&mut self, id: &str) -> bool {
        if self.processing.contains(id) {
            self.dirty.insert(id.to_string());
            return false;
        }
        if !self.queued.insert(id.to_string()) {
            return false;
        }
        self.ready.push_back(id.to_string());
        true
    }
}

#[derive(Debug)]
struct Shared {
    config: QueueConfig,
    state: Mutex<State>,
    ready: Notify,
    timer: Notify,
    shutting_down: AtomicBool,
}

impl Shared {
    fn add(&self, id: &str) {
        if self.shutting_down.load(Ordering::SeqCst) {
            debug!(queue = %self.config.name, operation_id = %id, "queue is shutting down, dropping add");
            return;
        }
        let became_ready = {
            let mut state = self.state.lock();
            state.waiting.remove(id);
            state.push_ready(id)
        };
        if became_ready {
            self.ready.notify_one();
        }
    }

    fn add_after(&self, id: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(id);
            return;
        }
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let at = Instant::now() + delay;
        {
            let mut state = self.state.lock();
            let due = state.waiting.entry(id.to_string()).or_insert(at);
            if at < *due {
                *due = at;
            }
        }
        self.timer.notify_one();
    }

    fn try_take(&self) -> Option<String> {
        let mut state = self.state.lock();
        let id = state.ready.pop_front()?;
        state.queued.remove(&id);
        state.processing.insert(id.clone());
        Some(id)
    }

    async fn next(&self) -> Option<String> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shutting_down.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(id) = self.try_take() {
                return Some(id);
            }
            notified.await;
        }
    }

    fn done(&self, id: &str) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(id);
            state.dirty.remove(id) && state.push_ready(id)
        };
        if requeued {
            self.ready.notify_one();
        }
    }

    /// Moves due ids to the ready list and returns the next due time.
    fn promote_due(&self, now: Instant) -> Option<Instant> {
        let mut promoted = 0;
        let next = {
            let mut state = self.state.lock();
            let due: Vec<String> = state
                .waiting
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            for id in due {
                state.waiting.remove(&id);
                if state.push_ready(&id) {
                    promoted += 1;
                }
            }
            state.waiting.values().min().copied()
        };
        for _ in 0..promoted {
            self.ready.notify_one();
        }
        next
    }

    async fn run_timer(&self) {
        loop {
            let notified = self.timer.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            match self.promote_due(Instant::now()) {
                Some(at) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(at) => {}
                        () = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn run_worker(&self, worker: usize, executor: Arc<dyn Executor>) {
        debug!(queue = %self.config.name, worker, "worker started");
        while let Some(id) = self.next().await {
            self.process(&id, executor.as_ref()).await;
            self.done(&id);
        }
        debug!(queue = %self.config.name, worker, "worker stopped");
    }

    async fn process(&self, id: &str, executor: &dyn Executor) {
        let span = info_span!("operation", queue = %self.config.name, operation_id = %id);
        let result = AssertUnwindSafe(executor.execute(id))
            .catch_unwind()
            .instrument(span)
            .await;

        match result {
            Ok(Ok(delay)) if !delay.is_zero() => {
                let scaled = delay / self.config.speed_factor.max(1);
                debug!(
                    operation_id = %id,
                    delay_ms = u64::try_from(scaled.as_millis()).unwrap_or(u64::MAX),
                    "redelivery scheduled"
                );
                self.add_after(id, scaled);
            }
            Ok(Ok(_)) => debug!(operation_id = %id, "operation processed"),
            Ok(Err(err)) => error!(operation_id = %id, error = %err, "error while processing operation"),
            Err(panic) => error!(operation_id = %id, panic = ?panic, "executor panicked while processing operation"),
        }
    }
}

/// A multi-worker queue of operation ids.
#[derive(Debug)]
pub struct WorkQueue {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Creates a stopped queue. Ids added before [`start`](Self::start) are kept.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State::default()),
                ready: Notify::new(),
                timer: Notify::new(),
                shutting_down: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Spawns the workers and the timer task on the current runtime.
    pub fn start(&self, executor: Arc<dyn Executor>) {
        let workers = self.shared.config.workers.max(1);
        info!(queue = %self.shared.config.name, workers, "starting work queue");

        let mut handles = self.handles.lock();
        let shared = Arc::clone(&self.shared);
        handles.push(tokio::spawn(async move { shared.run_timer().await }));
        for worker in 0..workers {
            let shared = Arc::clone(&self.shared);
            let executor = Arc::clone(&executor);
            handles.push(tokio::spawn(async move { shared.run_worker(worker, executor).await }));
        }
    }

    /// Schedules `operation_id` no earlier than `delay` from now.
    ///
    /// If the id is already waiting the earlier time wins.
    pub fn add_after(&self, operation_id: &str, delay: Duration) {
        self.shared.add_after(operation_id, delay);
    }

    /// Number of ids ready for a worker.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// Returns true if no id is ready.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ids waiting for their next eligible time.
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Stops accepting work and waits for workers to finish their current delivery.
    pub async fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(queue = %self.shared.config.name, "shutting down work queue");
        self.shared.ready.notify_waiters();
        self.shared.timer.notify_waiters();

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(queue = %self.shared.config.name, error = %err, "queue task ended abnormally");
            }
        }
    }
}

impl Queue for WorkQueue {
    fn add(&self, operation_id: &str) {
        self.shared.add(operation_id);
    }
}
