use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::scheduling::domain::scheduling_policy::{FuncId, SchedParams, SchedulingPolicy};

struct FairEntry {
    weight: f64,
    vruntime: f64,
    /// Bumped on every enqueue and trigger; heap items from older
    /// generations are stale.
    generation: u64,
    queued: bool,
}

struct Pending {
    vruntime: f64,
    seq: u64,
    id: FuncId,
    generation: u64,
}

// Reversed so the BinaryHeap pops the smallest virtual runtime first,
// earliest enqueue first among equals.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .vruntime
            .total_cmp(&self.vruntime)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

/// Proportional-fair admission in the manner of CFS.
///
/// Every function accumulates a virtual runtime: wall time spent in it,
/// multiplied by its weight. The one with the least virtual runtime runs
/// next, so over time each function's share of worker time is inversely
/// proportional to its weight, regardless of how slow or fast it is.
/// Functions registered late start at the current minimum virtual runtime
/// instead of zero, so they cannot monopolize the pool while catching up.
pub struct FairPolicy {
    entries: HashMap<FuncId, FairEntry>,
    heap: BinaryHeap<Pending>,
    seq: u64,
}

impl FairPolicy {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn vruntime(&self, id: FuncId) -> Option<f64> {
        self.entries.get(&id).map(|e| e.vruntime)
    }

    fn min_vruntime(&self) -> f64 {
        self.entries
            .values()
            .map(|e| e.vruntime)
            .min_by(f64::total_cmp)
            .unwrap_or(0.0)
    }

    fn enqueue(&mut self, id: FuncId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.generation += 1;
        entry.queued = true;
        self.heap.push(Pending {
            vruntime: entry.vruntime,
            seq: self.seq,
            id,
            generation: entry.generation,
        });
        self.seq += 1;
    }
}

impl Default for FairPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingPolicy for FairPolicy {
    fn insert(&mut self, id: FuncId, params: &SchedParams, _now: Instant) {
        let vruntime = self.min_vruntime();
        self.entries.insert(
            id,
            FairEntry {
                weight: params.weight,
                vruntime,
                generation: 0,
                queued: false,
            },
        );
        self.enqueue(id);
    }

    fn remove(&mut self, id: FuncId) {
        self.entries.remove(&id);
    }

    fn next_due(&mut self, _now: Instant) -> Option<FuncId> {
        while let Some(pending) = self.heap.pop() {
            match self.entries.get_mut(&pending.id) {
                Some(entry) if entry.queued && entry.generation == pending.generation => {
                    entry.queued = false;
                    return Some(pending.id);
                }
                _ => continue,
            }
        }
        None
    }

    fn try_trigger(&mut self, id: FuncId, _now: Instant, _has_idle_worker: bool) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.queued => {
                entry.queued = false;
                entry.generation += 1;
                true
            }
            _ => false,
        }
    }

    fn on_complete(&mut self, id: FuncId, elapsed: Duration) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        if entry.queued {
            log::error!("Fair policy: completion for {id} which was not outstanding");
            return;
        }
        entry.vruntime += elapsed.as_secs_f64() * entry.weight;
        self.enqueue(id);
    }

    fn name(&self) -> &'static str {
        "fair"
    }
}
