use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::detection::domain::detector::Detector;
use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::infrastructure::detector_factory::DetectorFactory;
use crate::detection::infrastructure::empty_detector::EmptyDetector;

/// One lazily-built detector per worker slot.
///
/// A worker checks its slot's detector out for the duration of a call, so
/// the map lock is never held while detecting and two slots never share an
/// instance. The instance goes back into the map when the guard drops,
/// unless it was [discarded](CheckedOutDetector::discard) or the thread is
/// unwinding; either way the slot is rebuilt on the next check-out.
pub struct DetectorCache {
    kind: DetectorKind,
    factory: Arc<dyn DetectorFactory>,
    slots: Mutex<HashMap<usize, Box<dyn Detector>>>,
    builds: AtomicUsize,
}

impl DetectorCache {
    pub fn new(kind: DetectorKind, factory: Arc<dyn DetectorFactory>) -> Self {
        Self {
            kind,
            factory,
            slots: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    pub fn check_out(&self, slot: usize) -> CheckedOutDetector<'_> {
        let cached = self.slots.lock().remove(&slot);
        let detector = cached.unwrap_or_else(|| self.build(slot));
        CheckedOutDetector {
            cache: self,
            slot,
            detector,
            discarded: false,
        }
    }

    fn build(&self, slot: usize) -> Box<dyn Detector> {
        self.builds.fetch_add(1, Ordering::Relaxed);
        match self.factory.create(self.kind) {
            Ok(detector) => {
                log::debug!("Built {} detector for worker slot {slot}", self.kind);
                detector
            }
            Err(e) => {
                log::warn!("{e}; worker slot {slot} falls back to the empty detector");
                Box::new(EmptyDetector)
            }
        }
    }

    /// Detectors currently parked in the cache.
    pub fn cached(&self) -> usize {
        self.slots.lock().len()
    }

    /// How many times a detector has been constructed.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

/// Exclusive use of one slot's detector; returns it to the cache on drop.
pub struct CheckedOutDetector<'a> {
    cache: &'a DetectorCache,
    slot: usize,
    detector: Box<dyn Detector>,
    discarded: bool,
}

impl CheckedOutDetector<'_> {
    /// Drops the detector instead of returning it to the cache, for
    /// instances left in an unknown state by a caught panic.
    pub fn discard(mut self) {
        self.discarded = true;
    }
}

impl Deref for CheckedOutDetector<'_> {
    type Target = dyn Detector;

    fn deref(&self) -> &Self::Target {
        self.detector.as_ref()
    }
}

impl DerefMut for CheckedOutDetector<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.detector.as_mut()
    }
}

impl Drop for CheckedOutDetector<'_> {
    fn drop(&mut self) {
        // EmptyDetector is zero-sized; the placeholder does not allocate.
        let detector = std::mem::replace(&mut self.detector, Box::new(EmptyDetector));
        if self.discarded || thread::panicking() {
            log::warn!(
                "Discarding {} detector of worker slot {} after a panic",
                self.cache.kind,
                self.slot
            );
            return;
        }
        self.cache.slots.lock().insert(self.slot, detector);
    }
}
