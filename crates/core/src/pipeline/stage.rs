use crate::detection::domain::points::PointsList;

/// A unit of pipeline work the scheduler can admit into the worker pool.
///
/// `execute` pulls whatever input is available, runs one detection pass on
/// the detector cached for `slot`, and publishes the result. With no input
/// it returns immediately.
pub trait Stage: Send + Sync {
    fn execute(&self, slot: usize);

    /// Smoothed execution time in seconds.
    fn average_time(&self) -> f64;

    fn name(&self) -> &str;
}

/// Result of one stage pass over one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    pub frame_index: usize,
    pub points: PointsList,
    /// Wall time of the detector call, in seconds.
    pub elapsed: f64,
}

impl Detections {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
