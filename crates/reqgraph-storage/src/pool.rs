//! Worker pool and task abstraction.
//!
//! A [`WorkerPool`] runs [`Task`]s on a fixed set of OS threads. Work is a
//! FIFO list behind one mutex, and idle workers sleep on one condition
//! variable until there is work or the pool shuts down.
//!
//! # Lifecycle
//!
//! `Starting` (no threads yet) → `Ready` → `Processing` ⇄ `Ready` →
//! `Draining` (shutdown requested, workers still emptying the queue) →
//! `Shutdown` (every worker has exited).
//!
//! Shutdown never drops work: each worker keeps taking tasks until the queue
//! is empty, including tasks that running tasks enqueue while the pool
//! drains. Only once the last worker has exited are new tasks refused. A
//! pool dropped without any workers runs its queue inline first.
//!
//! A task that returns an error or panics is logged and the worker moves on.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::error::StorageError;

/// Lifecycle state of a pool or of one of its workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PoolState {
    Starting,
    Ready,
    Processing,
    Draining,
    Shutdown,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PoolState::Starting => "starting",
            PoolState::Ready => "ready",
            PoolState::Processing => "processing",
            PoolState::Draining => "draining",
            PoolState::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

/// Identifier assigned to a task when it is first enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping every task carries.
#[derive(Debug, Default)]
pub struct TaskHeader {
    name: String,
    id: Mutex<Option<TaskId>>,
    owner: Mutex<Option<PoolHandle>>,
}

impl TaskHeader {
    pub fn new(name: impl Into<String>) -> Self {
        TaskHeader {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<TaskId> {
        *self.id.lock()
    }

    /// The pool this task was enqueued on, if any.
    pub fn owner(&self) -> Option<PoolHandle> {
        self.owner.lock().clone()
    }

    fn assign(&self, owner: PoolHandle) -> TaskId {
        *self.owner.lock() = Some(owner);
        *self
            .id
            .lock()
            .get_or_insert_with(|| TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)))
    }
}

/// A unit of work run to completion on one worker.
pub trait Task: Send + Sync {
    fn header(&self) -> &TaskHeader;

    fn run(&self) -> Result<(), StorageError>;
}

pub type TaskRef = Arc<dyn Task>;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Queue {
    tasks: VecDeque<TaskRef>,
    started: bool,
    shutdown: bool,
    live: usize,
}

struct Shared {
    queue: Mutex<Queue>,
    work_ready: Condvar,
    workers: Mutex<Vec<PoolState>>,
}

impl Shared {
    fn enqueue(self: &Arc<Self>, task: TaskRef) -> Result<TaskId, StorageError> {
        let id = task.header().assign(PoolHandle {
            shared: Arc::downgrade(self),
        });
        {
            let mut queue = self.queue.lock();
            if queue.shutdown && queue.live == 0 {
                return Err(StorageError::PoolShutdown);
            }
            queue.tasks.push_back(task);
        }
        self.work_ready.notify_one();
        Ok(id)
    }

    fn set_worker(&self, index: usize, state: PoolState) {
        if let Some(slot) = self.workers.lock().get_mut(index) {
            *slot = state;
        }
    }
}

/// Cheap handle a running task uses to enqueue work on its own pool.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Weak<Shared>,
}

impl PoolHandle {
    pub fn enqueue(&self, task: TaskRef) -> Result<TaskId, StorageError> {
        let shared = self.shared.upgrade().ok_or(StorageError::PoolShutdown)?;
        shared.enqueue(task)
    }
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates a pool with no threads. Tasks queue up until
    /// [`WorkerPool::start_threads`] is called.
    pub fn new() -> Self {
        WorkerPool {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                work_ready: Condvar::new(),
                workers: Mutex::new(Vec::new()),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Creates a pool and starts `count` workers.
    pub fn with_threads(count: usize) -> Self {
        let pool = WorkerPool::new();
        pool.start_threads(count);
        pool
    }

    /// Starts `count` more workers. Returns how many actually started.
    pub fn start_threads(&self, count: usize) -> usize {
        let mut started = 0;
        let mut threads = self.threads.lock();
        for _ in 0..count {
            {
                let mut queue = self.shared.queue.lock();
                if queue.shutdown {
                    break;
                }
                queue.live += 1;
                queue.started = true;
            }
            let index = {
                let mut workers = self.shared.workers.lock();
                workers.push(PoolState::Starting);
                workers.len() - 1
            };
            let shared = self.shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("reqgraph-worker-{}", index))
                .spawn(move || worker_loop(shared, index));
            match spawned {
                Ok(handle) => {
                    threads.push(handle);
                    started += 1;
                }
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "failed to spawn worker");
                    self.shared.queue.lock().live -= 1;
                    self.shared.set_worker(index, PoolState::Shutdown);
                }
            }
        }
        tracing::debug!(started, "worker threads started");
        started
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Appends `task` to the work list and wakes one worker.
    pub fn enqueue(&self, task: TaskRef) -> Result<TaskId, StorageError> {
        self.shared.enqueue(task)
    }

    /// Takes the next task without waiting.
    pub fn request_work(&self) -> Option<TaskRef> {
        self.shared.queue.lock().tasks.pop_front()
    }

    pub fn has_work(&self) -> bool {
        !self.shared.queue.lock().tasks.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }

    pub fn status(&self) -> PoolState {
        let (started, shutdown, live) = {
            let queue = self.shared.queue.lock();
            (queue.started, queue.shutdown, queue.live)
        };
        if shutdown {
            return if live == 0 {
                PoolState::Shutdown
            } else {
                PoolState::Draining
            };
        }
        if !started {
            return PoolState::Starting;
        }
        if self
            .shared
            .workers
            .lock()
            .iter()
            .any(|w| *w == PoolState::Processing)
        {
            PoolState::Processing
        } else {
            PoolState::Ready
        }
    }

    pub fn worker_status(&self) -> Vec<PoolState> {
        self.shared.workers.lock().clone()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.queue.lock().live
    }

    /// Asks every worker to exit once the queue is empty. Does not wait.
    pub fn shutdown(&self) {
        let first = {
            let mut queue = self.shared.queue.lock();
            !std::mem::replace(&mut queue.shutdown, true)
        };
        if first {
            tracing::debug!("worker pool shutting down");
        }
        self.shared.work_ready.notify_all();
    }

    /// Blocks until every worker has exited.
    pub fn join(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.threads.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("worker thread panicked outside a task");
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let idle = self.shared.queue.lock().live == 0;
        if idle && self.has_work() {
            tracing::debug!(pending = self.pending(), "no workers, running queued tasks inline");
            while let Some(task) = self.request_work() {
                run_task(task.as_ref());
            }
        }
        self.shutdown();
        self.join();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("status", &self.status())
            .field("pending", &self.pending())
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    shared.set_worker(index, PoolState::Ready);
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break Some(task);
                }
                if queue.shutdown {
                    break None;
                }
                shared.work_ready.wait(&mut queue);
            }
        };
        let Some(task) = task else {
            break;
        };

        shared.set_worker(index, PoolState::Processing);
        run_task(task.as_ref());
        let draining = shared.queue.lock().shutdown;
        shared.set_worker(
            index,
            if draining {
                PoolState::Draining
            } else {
                PoolState::Ready
            },
        );
    }

    shared.queue.lock().live -= 1;
    shared.set_worker(index, PoolState::Shutdown);
    tracing::debug!(worker = index, "worker exited");
}

fn run_task(task: &dyn Task) {
    let header = task.header();
    let outcome = catch_unwind(AssertUnwindSafe(|| task.run()));
    match outcome {
        Ok(Ok(())) => {
            tracing::debug!(task = header.name(), id = ?header.id(), "task finished");
        }
        Ok(Err(e)) => {
            tracing::error!(task = header.name(), id = ?header.id(), error = %e, "task failed");
        }
        Err(_) => {
            tracing::error!(task = header.name(), id = ?header.id(), "task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct Counting {
        header: TaskHeader,
        hits: Arc<AtomicUsize>,
        spawn: usize,
    }

    impl Counting {
        fn new(hits: Arc<AtomicUsize>, spawn: usize) -> Arc<Self> {
            Arc::new(Counting {
                header: TaskHeader::new("counting"),
                hits,
                spawn,
            })
        }
    }

    impl Task for Counting {
        fn header(&self) -> &TaskHeader {
            &self.header
        }

        fn run(&self) -> Result<(), StorageError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.spawn > 0 {
                if let Some(owner) = self.header.owner() {
                    owner.enqueue(Counting::new(self.hits.clone(), self.spawn - 1))?;
                }
            }
            Ok(())
        }
    }

    struct Failing {
        header: TaskHeader,
        panic: bool,
    }

    impl Task for Failing {
        fn header(&self) -> &TaskHeader {
            &self.header
        }

        fn run(&self) -> Result<(), StorageError> {
            if self.panic {
                panic!("boom");
            }
            Err(StorageError::Migration("nope".into()))
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn new_pool_is_starting_and_queues_work() {
        let pool = WorkerPool::new();
        assert_eq!(pool.status(), PoolState::Starting);
        let hits = Arc::new(AtomicUsize::new(0));
        let id = pool.enqueue(Counting::new(hits.clone(), 0)).unwrap();
        assert!(pool.has_work());
        assert!(id.0 > 0);

        pool.start_threads(2);
        assert!(wait_for(|| hits.load(Ordering::SeqCst) == 1));
        assert!(wait_for(|| pool.status() == PoolState::Ready));
        assert_eq!(pool.worker_status().len(), 2);
    }

    #[test]
    fn request_work_is_fifo() {
        let pool = WorkerPool::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let first = pool.enqueue(Counting::new(hits.clone(), 0)).unwrap();
        let second = pool.enqueue(Counting::new(hits.clone(), 0)).unwrap();
        assert_eq!(pool.request_work().unwrap().header().id(), Some(first));
        assert_eq!(pool.request_work().unwrap().header().id(), Some(second));
        assert!(pool.request_work().is_none());
        assert!(!pool.has_work());
    }

    #[test]
    fn shutdown_drains_queued_and_cascaded_work() {
        let pool = WorkerPool::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            pool.enqueue(Counting::new(hits.clone(), 3)).unwrap();
        }
        pool.start_threads(3);
        pool.shutdown();
        pool.join();
        assert_eq!(hits.load(Ordering::SeqCst), 50 * 4);
        assert_eq!(pool.status(), PoolState::Shutdown);
        assert!(pool
            .worker_status()
            .iter()
            .all(|w| *w == PoolState::Shutdown));
    }

    #[test]
    fn shutdown_is_idempotent_and_refuses_late_work() {
        let pool = WorkerPool::with_threads(1);
        pool.shutdown();
        pool.shutdown();
        pool.join();
        let hits = Arc::new(AtomicUsize::new(0));
        let err = pool.enqueue(Counting::new(hits, 0)).unwrap_err();
        assert!(matches!(err, StorageError::PoolShutdown));
    }

    #[test]
    fn failing_tasks_do_not_kill_workers() {
        let pool = WorkerPool::with_threads(1);
        pool.enqueue(Arc::new(Failing {
            header: TaskHeader::new("error"),
            panic: false,
        }))
        .unwrap();
        pool.enqueue(Arc::new(Failing {
            header: TaskHeader::new("panic"),
            panic: true,
        }))
        .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        pool.enqueue(Counting::new(hits.clone(), 0)).unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn drop_joins_workers() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::with_threads(2);
            for _ in 0..20 {
                pool.enqueue(Counting::new(hits.clone(), 0)).unwrap();
            }
        }
        assert_eq!(hits.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn drop_without_workers_runs_queued_work() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new();
            pool.enqueue(Counting::new(hits.clone(), 2)).unwrap();
            pool.enqueue(Counting::new(hits.clone(), 0)).unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn enqueue_records_owner() {
        let pool = WorkerPool::new();
        let task = Counting::new(Arc::new(AtomicUsize::new(0)), 0);
        assert!(task.header().owner().is_none());
        assert!(task.header().id().is_none());
        pool.enqueue(task.clone()).unwrap();
        assert!(task.header().owner().is_some());
        assert!(task.header().id().is_some());
    }
}
