//! Bounded priority worker pools with identity-deduplicated tasks.
//!
//! Each pool owns a fixed set of worker threads and a bounded pending
//! queue. Tasks carry a *flag* (their deduplication identity); while a task
//! with the same flag is queued or running, a new submission is offered to
//! the incumbent through [`PoolTask::on_repeat_put`] instead of being
//! scheduled. Dispatch is by priority, then by submission order, oldest or
//! newest first depending on the pool's `time_sort_asc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

/// Dispatch priority. Higher variants run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

/// Unit of schedulable work.
pub trait PoolTask: Send + Sync + 'static {
    /// Deduplication identity, normally the source identifier.
    fn flag(&self) -> String;

    /// Perform the work on a pool worker.
    fn run(&self);

    /// Called when a same-flag task is submitted while this one is pending
    /// or running. Returning `true` absorbs the newcomer (merge its
    /// interest); returning `false` schedules both independently.
    fn on_repeat_put(&self, _newcomer: &Self) -> bool {
        false
    }
}

/// Outcome of a [`TaskPool::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Scheduled as a fresh task.
    Enqueued,
    /// Absorbed by an already-pending task with the same flag.
    Merged,
    /// Dropped because the pool has been shut down.
    Rejected,
}

struct Entry<T> {
    task: Arc<T>,
    priority: TaskPriority,
    seq: u64,
    tag: String,
}

struct PoolState<T> {
    queue: Vec<Entry<T>>,
    /// Tasks queued or running, keyed by flag.
    pending: HashMap<String, Arc<T>>,
    shutdown: bool,
}

/// Fixed-size worker pool dispatching tagged, prioritized tasks.
pub struct TaskPool<T: PoolTask> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    time_sort_asc: bool,
    max_queue: usize,
    seq: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: PoolTask> TaskPool<T> {
    /// Create a pool with `worker_count` threads and a pending queue capped
    /// at `max_queue` entries.
    pub fn new(
        name: &str,
        worker_count: usize,
        max_queue: usize,
        time_sort_asc: bool,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState {
                queue: Vec::new(),
                pending: HashMap::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
            time_sort_asc,
            max_queue: max_queue.max(1),
            seq: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
        });

        let mut workers = pool.workers.lock();
        for idx in 0..worker_count.max(1) {
            let pool = Arc::clone(&pool);
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{idx}"))
                .spawn(move || pool.worker_loop())
                .expect("failed to spawn pool worker");
            workers.push(handle);
        }
        drop(workers);
        pool
    }

    /// Submit a task. Non-blocking; this is the only pool operation callers
    /// perform on their own thread.
    pub fn put(&self, tag: &str, task: T, priority: TaskPriority) -> PutOutcome {
        let mut state = self.state.lock();
        if state.shutdown {
            return PutOutcome::Rejected;
        }

        let flag = task.flag();
        if let Some(existing) = state.pending.get(&flag) {
            if existing.on_repeat_put(&task) {
                trace!(flag = %flag, tag = %tag, "submission merged into pending task");
                return PutOutcome::Merged;
            }
        }

        if state.queue.len() >= self.max_queue {
            if let Some(idx) = self.rank_extreme(&state.queue, false) {
                let dropped = state.queue.swap_remove(idx);
                let dropped_flag = dropped.task.flag();
                let still_registered = state
                    .pending
                    .get(&dropped_flag)
                    .is_some_and(|current| Arc::ptr_eq(current, &dropped.task));
                if still_registered {
                    state.pending.remove(&dropped_flag);
                }
                debug!(flag = %dropped_flag, "queue full, discarded worst-ranked pending task");
            }
        }

        let task = Arc::new(task);
        state.pending.insert(flag, Arc::clone(&task));
        state.queue.push(Entry {
            task,
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            tag: tag.to_string(),
        });
        drop(state);
        self.available.notify_one();
        PutOutcome::Enqueued
    }

    /// Discard all queued work, wake the workers, and join them. Work
    /// already running finishes its current unit cooperatively.
    pub fn shutdown_now(&self) {
        {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.queue.clear();
            state.pending.clear();
        }
        self.available.notify_all();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }

    /// Number of queued (not yet running) tasks.
    pub fn queued_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether a task with this flag is queued or running.
    pub fn is_pending(&self, flag: &str) -> bool {
        self.state.lock().pending.contains_key(flag)
    }

    fn worker_loop(self: Arc<Self>) {
        loop {
            let entry = {
                let mut state = self.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some(idx) = self.rank_extreme(&state.queue, true) {
                        break state.queue.swap_remove(idx);
                    }
                    self.available.wait(&mut state);
                }
            };

            trace!(flag = %entry.task.flag(), tag = %entry.tag, "task dispatched");
            entry.task.run();

            let mut state = self.state.lock();
            let flag = entry.task.flag();
            let still_registered = state
                .pending
                .get(&flag)
                .is_some_and(|current| Arc::ptr_eq(current, &entry.task));
            if still_registered {
                state.pending.remove(&flag);
            }
        }
    }

    /// Index of the best (`best = true`) or worst entry under the pool's
    /// ordering: priority first, then submission sequence per
    /// `time_sort_asc`.
    fn rank_extreme(&self, queue: &[Entry<T>], best: bool) -> Option<usize> {
        if queue.is_empty() {
            return None;
        }
        let better = |a: &Entry<T>, b: &Entry<T>| -> bool {
            if a.priority != b.priority {
                return a.priority > b.priority;
            }
            if self.time_sort_asc {
                a.seq < b.seq
            } else {
                a.seq > b.seq
            }
        };
        let mut extreme = 0;
        for idx in 1..queue.len() {
            let wins = better(&queue[idx], &queue[extreme]);
            if wins == best {
                extreme = idx;
            }
        }
        Some(extreme)
    }
}
