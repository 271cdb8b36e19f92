use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::concurrency::worker_pool::{PoolError, TimingCallback, WorkerPool};
use crate::scheduling::domain::scheduling_policy::{FuncId, SchedParams, SchedulingPolicy};
use crate::scheduling::infrastructure::fair_policy::FairPolicy;
use crate::scheduling::infrastructure::interval_policy::IntervalPolicy;

/// A schedulable function; receives the worker slot it runs on.
pub type ScheduledFn = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("min interval {min:?} exceeds max interval {max:?}")]
    InvalidInterval { min: Duration, max: Duration },
    #[error("weight must be finite and positive, got {0}")]
    InvalidWeight(f64),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

struct Registry {
    funcs: HashMap<FuncId, ScheduledFn>,
    outstanding: HashSet<FuncId>,
    policy: Box<dyn SchedulingPolicy>,
    next_id: u64,
}

impl Registry {
    fn complete(&mut self, id: FuncId, elapsed: Duration) {
        self.outstanding.remove(&id);
        if self.funcs.contains_key(&id) {
            self.policy.on_complete(id, elapsed);
        }
    }
}

/// Admits registered functions into a worker pool, one policy decision at a
/// time.
///
/// The embedding loop calls [`schedule`](Self::schedule) every iteration.
/// Admission stops as soon as the pool has no idle worker left to take the
/// next task, so the task queue never grows past what the pool can start
/// right away. A function is never admitted while a previous admission of
/// it is still queued or running.
pub struct Scheduler {
    registry: Arc<Mutex<Registry>>,
    pool: WorkerPool,
}

impl Scheduler {
    pub fn new(workers: usize, policy: Box<dyn SchedulingPolicy>) -> Result<Self, SchedulerError> {
        log::info!("Scheduler: {} policy on {workers} workers", policy.name());
        let registry = Arc::new(Mutex::new(Registry {
            funcs: HashMap::new(),
            outstanding: HashSet::new(),
            policy,
            next_id: 1,
        }));

        let on_timing: TimingCallback = {
            let registry = registry.clone();
            Arc::new(move |tag, elapsed| registry.lock().complete(FuncId(tag), elapsed))
        };
        let pool = WorkerPool::with_timing_callback(workers, on_timing)?;

        Ok(Self { registry, pool })
    }

    pub fn fair(workers: usize) -> Result<Self, SchedulerError> {
        Self::new(workers, Box::new(FairPolicy::new()))
    }

    pub fn interval(workers: usize) -> Result<Self, SchedulerError> {
        Self::new(workers, Box::new(IntervalPolicy::new()))
    }

    pub fn add_func(&self, func: ScheduledFn, params: SchedParams) -> Result<FuncId, SchedulerError> {
        if !(params.weight.is_finite() && params.weight > 0.0) {
            return Err(SchedulerError::InvalidWeight(params.weight));
        }
        if params.min_interval > params.max_interval {
            return Err(SchedulerError::InvalidInterval {
                min: params.min_interval,
                max: params.max_interval,
            });
        }

        let mut registry = self.registry.lock();
        let id = FuncId(registry.next_id);
        registry.next_id += 1;
        registry.funcs.insert(id, func);
        registry.policy.insert(id, &params, Instant::now());
        log::debug!("Scheduler: registered {id} with {params:?}");
        Ok(id)
    }

    /// Unregisters `id`. An admission already in flight still runs to
    /// completion.
    pub fn remove_func(&self, id: FuncId) -> bool {
        let mut registry = self.registry.lock();
        if registry.funcs.remove(&id).is_none() {
            return false;
        }
        registry.policy.remove(id);
        log::debug!("Scheduler: removed {id}");
        true
    }

    /// Admits `id` right away if it is not outstanding and the policy agrees.
    pub fn trigger_func(&self, id: FuncId) -> bool {
        let mut registry = self.registry.lock();
        if !registry.funcs.contains_key(&id) || registry.outstanding.contains(&id) {
            return false;
        }
        let has_idle_worker = self.pool.idle_count() > self.pool.queue_size();
        if !registry.policy.try_trigger(id, Instant::now(), has_idle_worker) {
            return false;
        }
        self.admit(&mut registry, id)
    }

    /// Runs one admission tick; returns how many functions were admitted.
    pub fn schedule(&self) -> usize {
        if self.pool.is_stopped() {
            return 0;
        }
        let mut registry = self.registry.lock();
        let mut admitted = 0;

        while self.pool.idle_count() > self.pool.queue_size() {
            let Some(id) = registry.policy.next_due(Instant::now()) else {
                break;
            };
            if !registry.funcs.contains_key(&id) {
                log::error!("Scheduler: policy returned unknown {id}");
                debug_assert!(false, "policy returned unknown {id}");
                registry.policy.remove(id);
                continue;
            }
            if !self.admit(&mut registry, id) {
                break;
            }
            admitted += 1;
        }

        admitted
    }

    fn admit(&self, registry: &mut Registry, id: FuncId) -> bool {
        let Some(func) = registry.funcs.get(&id).cloned() else {
            return false;
        };
        registry.outstanding.insert(id);

        match self.pool.push_tagged(id.0, move |slot| func(slot)) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Scheduler: could not admit {id}: {e}");
                registry.complete(id, Duration::ZERO);
                false
            }
        }
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.registry.lock().funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Functions admitted and not yet completed.
    pub fn outstanding(&self) -> usize {
        self.registry.lock().outstanding.len()
    }

    pub fn policy_name(&self) -> &'static str {
        self.registry.lock().policy.name()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn resize(&mut self, workers: usize) -> Result<(), SchedulerError> {
        self.pool.resize(workers)?;
        Ok(())
    }

    /// Stops the underlying pool; see [`WorkerPool::stop`].
    pub fn stop(&mut self, wait_for_drain: bool) {
        self.pool.stop(wait_for_drain);
    }
}
