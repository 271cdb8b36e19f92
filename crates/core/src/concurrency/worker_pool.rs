use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use super::bounded_queue::BoundedQueue;
use super::task_handle::{panic_message, TaskError, TaskHandle};

/// A unit of work; the argument is the worker slot running it.
pub type Job = Box<dyn FnOnce(usize) + Send + 'static>;

/// Invoked on the worker after every tagged task with `(tag, elapsed)`,
/// whether the task returned or panicked.
pub type TimingCallback = Arc<dyn Fn(u64, Duration) + Send + Sync>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool is stopping")]
    Stopped,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

struct Shared {
    tasks: BoundedQueue<Job>,
    lock: Mutex<()>,
    wake: Condvar,
    /// Graceful stop: drain the queue, then exit.
    done: AtomicBool,
    /// Hard stop: queued work was discarded.
    stopped: AtomicBool,
    idle: AtomicUsize,
    /// Slots held by live threads, including retired ones still finishing.
    live_slots: Mutex<BTreeSet<usize>>,
    on_timing: Option<TimingCallback>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.done.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst)
    }

    fn claim_slot(&self) -> usize {
        let mut live = self.live_slots.lock();
        let slot = (0..).find(|s| !live.contains(s)).unwrap_or(live.len());
        live.insert(slot);
        slot
    }

    fn release_slot(&self, slot: usize) {
        self.live_slots.lock().remove(&slot);
    }

    fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }
}

struct Worker {
    slot: usize,
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

/// Releases the slot id when the worker thread exits, including by unwind.
struct SlotGuard {
    shared: Arc<Shared>,
    slot: usize,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.release_slot(self.slot);
    }
}

/// Resizable pool of worker threads pulling from one shared task queue.
///
/// Each thread is bound to a worker slot for its whole life; slots are the
/// lowest ids not held by any live thread, so per-slot caches see a dense
/// `0..size()` range in steady state and never see two threads on one id.
///
/// `resize` and `stop` take `&mut self`: only the owning coordinator thread
/// may change the pool's shape.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        Self::build(threads, None)
    }

    /// Pool whose tagged tasks report their wall time to `on_timing`.
    pub fn with_timing_callback(
        threads: usize,
        on_timing: TimingCallback,
    ) -> Result<Self, PoolError> {
        Self::build(threads, Some(on_timing))
    }

    fn build(threads: usize, on_timing: Option<TimingCallback>) -> Result<Self, PoolError> {
        let mut pool = Self {
            shared: Arc::new(Shared {
                tasks: BoundedQueue::new(),
                lock: Mutex::new(()),
                wake: Condvar::new(),
                done: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                idle: AtomicUsize::new(0),
                live_slots: Mutex::new(BTreeSet::new()),
                on_timing,
            }),
            workers: Vec::new(),
        };
        pool.resize(threads)?;
        Ok(pool)
    }

    /// Number of active (non-retired) workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Tasks queued but not yet picked up.
    pub fn queue_size(&self) -> usize {
        self.shared.tasks.len()
    }

    /// Workers currently blocked waiting for a task.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.load(Ordering::SeqCst)
    }

    /// Slots owned by the active workers, in spawn order.
    pub fn slots(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.slot).collect()
    }

    /// True once `stop` has begun; pushes are rejected from then on.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_closed()
    }

    /// Queues `f`; its return value (or panic) is delivered to the handle.
    pub fn push<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce(usize) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(None, f)
    }

    /// Like [`push`](Self::push), and reports `(tag, elapsed)` to the timing
    /// callback once the task ends.
    pub fn push_tagged<F, R>(&self, tag: u64, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce(usize) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(Some(tag), f)
    }

    fn submit<F, R>(&self, tag: Option<u64>, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce(usize) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.is_closed() {
            return Err(PoolError::Stopped);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let timing = tag.zip(self.shared.on_timing.clone());
        let job: Job = Box::new(move |slot| {
            let start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(slot)));
            let elapsed = start.elapsed();
            let result = outcome.map_err(|payload| {
                let message = panic_message(payload.as_ref());
                log::error!("Task panicked on worker slot {slot}: {message}");
                TaskError::Panicked(message)
            });
            if let Some((tag, on_timing)) = timing {
                on_timing(tag, elapsed);
            }
            let _ = tx.send(result);
        });

        self.shared.tasks.push_back(job);
        let _guard = self.shared.lock.lock();
        self.shared.wake.notify_one();
        Ok(TaskHandle::new(rx))
    }

    /// Discards every queued task that has not started.
    pub fn clear_queue(&self) {
        self.shared.tasks.clear();
    }

    /// Grows by spawning workers on fresh slots, or shrinks by retiring the
    /// most recently added workers. Retired workers finish their current
    /// task, then exit without taking new work.
    pub fn resize(&mut self, threads: usize) -> Result<(), PoolError> {
        if self.shared.is_closed() {
            return Err(PoolError::Stopped);
        }

        let current = self.workers.len();
        if threads >= current {
            for _ in current..threads {
                let worker = self.spawn_worker()?;
                self.workers.push(worker);
            }
        } else {
            for mut worker in self.workers.drain(threads..) {
                worker.stop.store(true, Ordering::SeqCst);
                // Dropping the handle detaches the thread.
                worker.handle.take();
                log::debug!("Retired worker slot {}", worker.slot);
            }
            self.shared.wake_all();
        }
        Ok(())
    }

    fn spawn_worker(&self) -> Result<Worker, PoolError> {
        let slot = self.shared.claim_slot();
        let stop = Arc::new(AtomicBool::new(false));
        let shared = self.shared.clone();
        let flag = stop.clone();

        let spawned = thread::Builder::new()
            .name(format!("facetrack-worker-{slot}"))
            .spawn(move || {
                let guard = SlotGuard { shared, slot };
                worker_loop(&guard.shared, slot, &flag);
            });

        match spawned {
            Ok(handle) => Ok(Worker {
                slot,
                handle: Some(handle),
                stop,
            }),
            Err(e) => {
                self.shared.release_slot(slot);
                Err(PoolError::Spawn(e))
            }
        }
    }

    /// Stops the pool and joins every active worker.
    ///
    /// With `wait_for_drain`, every queued task runs first. Without it,
    /// queued tasks are discarded (their handles resolve to
    /// [`TaskError::Discarded`]) and workers exit after their current task.
    /// Either way no task is accepted once this has been called.
    pub fn stop(&mut self, wait_for_drain: bool) {
        if wait_for_drain {
            if self.shared.is_closed() {
                return;
            }
            self.shared.done.store(true, Ordering::SeqCst);
        } else {
            if self.shared.stopped.load(Ordering::SeqCst) {
                return;
            }
            self.shared.stopped.store(true, Ordering::SeqCst);
            for worker in &self.workers {
                worker.stop.store(true, Ordering::SeqCst);
            }
            self.shared.tasks.clear();
        }

        self.shared.wake_all();

        for mut worker in self.workers.drain(..) {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::error!("Worker slot {} exited by panic", worker.slot);
                }
            }
        }

        // Tasks left over when the pool had no threads.
        self.shared.tasks.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

fn worker_loop(shared: &Shared, slot: usize, stop: &AtomicBool) {
    let mut next = shared.tasks.try_pop_front();
    loop {
        while let Some(job) = next.take() {
            job(slot);
            if stop.load(Ordering::SeqCst) {
                return;
            }
            next = shared.tasks.try_pop_front();
        }

        let mut guard = shared.lock.lock();
        shared.idle.fetch_add(1, Ordering::SeqCst);
        loop {
            // A retired slot must not take queued work.
            if stop.load(Ordering::SeqCst) {
                next = None;
                break;
            }
            next = shared.tasks.try_pop_front();
            if next.is_some() || shared.done.load(Ordering::SeqCst) {
                break;
            }
            shared.wake.wait(&mut guard);
        }
        shared.idle.fetch_sub(1, Ordering::SeqCst);
        drop(guard);

        if next.is_none() {
            return;
        }
    }
}
