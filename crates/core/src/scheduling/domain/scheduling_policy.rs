use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of a registered scheduled function, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u64);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling metadata of one registered function.
///
/// `weight` scales consumed time under the fair policy (larger means the
/// function is charged more and runs less often). The interval bounds are
/// read by the interval policy only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedParams {
    pub weight: f64,
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl SchedParams {
    pub fn weighted(weight: f64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }

    pub fn interval(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            min_interval,
            max_interval,
            ..Self::default()
        }
    }
}

impl Default for SchedParams {
    fn default() -> Self {
        Self {
            weight: 1.0,
            min_interval: Duration::ZERO,
            max_interval: Duration::from_millis(33),
        }
    }
}

/// Decides which registered function the scheduler admits next.
///
/// The scheduler owns the registry and serializes every call; a policy only
/// keeps the ordering state. An id handed out by [`next_due`] or accepted by
/// [`try_trigger`] is outstanding until [`on_complete`] is called for it, and
/// must not be handed out again before that.
///
/// [`next_due`]: SchedulingPolicy::next_due
/// [`try_trigger`]: SchedulingPolicy::try_trigger
/// [`on_complete`]: SchedulingPolicy::on_complete
pub trait SchedulingPolicy: Send {
    fn insert(&mut self, id: FuncId, params: &SchedParams, now: Instant);
    fn remove(&mut self, id: FuncId);
    /// Admits and returns the most deserving function that is due at `now`.
    fn next_due(&mut self, now: Instant) -> Option<FuncId>;
    /// Admits `id` outside the regular tick if the policy allows it.
    fn try_trigger(&mut self, id: FuncId, now: Instant, has_idle_worker: bool) -> bool;
    fn on_complete(&mut self, id: FuncId, elapsed: Duration);
    fn name(&self) -> &'static str;
}
