use std::time::{Duration, Instant};

use crate::scheduling::domain::scheduling_policy::{FuncId, SchedParams, SchedulingPolicy};

struct IntervalEntry {
    id: FuncId,
    min_interval: Duration,
    max_interval: Duration,
    last_run: Option<Instant>,
    outstanding: bool,
}

impl IntervalEntry {
    fn since_last_run(&self, now: Instant) -> Option<Duration> {
        self.last_run.map(|t| now.saturating_duration_since(t))
    }
}

/// Time-budget admission: a function is due once `max_interval` has passed
/// since it was last admitted.
///
/// Entries are walked in descending `max_interval` order, so the slow,
/// rarely-run functions get a worker before a flood of cheap ones can take
/// them all. Last-run is stamped at admission, not completion.
pub struct IntervalPolicy {
    entries: Vec<IntervalEntry>,
}

impl IntervalPolicy {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn entry_mut(&mut self, id: FuncId) -> Option<&mut IntervalEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for IntervalPolicy {
    fn insert(&mut self, id: FuncId, params: &SchedParams, _now: Instant) {
        let at = self
            .entries
            .iter()
            .position(|e| e.max_interval < params.max_interval)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            at,
            IntervalEntry {
                id,
                min_interval: params.min_interval,
                max_interval: params.max_interval,
                last_run: None,
                outstanding: false,
            },
        );
    }

    fn remove(&mut self, id: FuncId) {
        self.entries.retain(|e| e.id != id);
    }

    fn next_due(&mut self, now: Instant) -> Option<FuncId> {
        let entry = self.entries.iter_mut().find(|e| {
            !e.outstanding && e.since_last_run(now).map_or(true, |d| d >= e.max_interval)
        })?;
        entry.last_run = Some(now);
        entry.outstanding = true;
        Some(entry.id)
    }

    fn try_trigger(&mut self, id: FuncId, now: Instant, has_idle_worker: bool) -> bool {
        if !has_idle_worker {
            return false;
        }
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        if entry.outstanding {
            return false;
        }
        if entry.since_last_run(now).is_some_and(|d| d < entry.min_interval) {
            return false;
        }
        entry.last_run = Some(now);
        entry.outstanding = true;
        true
    }

    fn on_complete(&mut self, id: FuncId, _elapsed: Duration) {
        if let Some(entry) = self.entry_mut(id) {
            entry.outstanding = false;
        }
    }

    fn name(&self) -> &'static str {
        "interval"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_longest_interval_is_admitted_first() {
        let mut policy = IntervalPolicy::new();
        let t0 = Instant::now();
        policy.insert(FuncId(1), &SchedParams::interval(ms(0), ms(10)), t0);
        policy.insert(FuncId(2), &SchedParams::interval(ms(0), ms(100)), t0);
        policy.insert(FuncId(3), &SchedParams::interval(ms(0), ms(10)), t0);

        assert_eq!(policy.next_due(t0), Some(FuncId(2)));
        assert_eq!(policy.next_due(t0), Some(FuncId(1)));
        assert_eq!(policy.next_due(t0), Some(FuncId(3)));
        assert_eq!(policy.next_due(t0), None);
    }

    #[test]
    fn test_due_again_only_after_max_interval() {
        let mut policy = IntervalPolicy::new();
        let t0 = Instant::now();
        policy.insert(FuncId(1), &SchedParams::interval(ms(0), ms(30)), t0);

        assert_eq!(policy.next_due(t0), Some(FuncId(1)));
        policy.on_complete(FuncId(1), ms(5));
        assert_eq!(policy.next_due(t0 + ms(20)), None);
        assert_eq!(policy.next_due(t0 + ms(30)), Some(FuncId(1)));
    }

    #[test]
    fn test_outstanding_entry_is_not_readmitted_when_overdue() {
        let mut policy = IntervalPolicy::new();
        let t0 = Instant::now();
        policy.insert(FuncId(1), &SchedParams::interval(ms(0), ms(10)), t0);

        assert_eq!(policy.next_due(t0), Some(FuncId(1)));
        assert_eq!(policy.next_due(t0 + ms(500)), None);
        assert!(!policy.try_trigger(FuncId(1), t0 + ms(500), true));
    }

    #[test]
    fn test_trigger_respects_min_interval() {
        let mut policy = IntervalPolicy::new();
        let t0 = Instant::now();
        policy.insert(FuncId(1), &SchedParams::interval(ms(20), ms(100)), t0);

        assert!(policy.try_trigger(FuncId(1), t0, true));
        policy.on_complete(FuncId(1), ms(1));
        assert!(!policy.try_trigger(FuncId(1), t0 + ms(10), true));
        assert!(policy.try_trigger(FuncId(1), t0 + ms(20), true));
    }

    #[test]
    fn test_trigger_needs_idle_worker() {
        let mut policy = IntervalPolicy::new();
        let t0 = Instant::now();
        policy.insert(FuncId(1), &SchedParams::default(), t0);
        assert!(!policy.try_trigger(FuncId(1), t0, false));
        assert!(policy.try_trigger(FuncId(1), t0, true));
    }

    #[test]
    fn test_unknown_and_removed_ids() {
        let mut policy = IntervalPolicy::new();
        let t0 = Instant::now();
        assert!(!policy.try_trigger(FuncId(7), t0, true));
        policy.insert(FuncId(7), &SchedParams::default(), t0);
        policy.remove(FuncId(7));
        assert_eq!(policy.next_due(t0), None);
    }
}
