// src/pipeline/mod.rs

pub mod controller;
pub mod metrics;

pub use controller::{
    FrameLoop, FrameSource, ObstacleDetector, PresentationSink, SessionError, SessionSummary,
    StopReason,
};
pub use metrics::{MetricsSummary, SessionMetrics};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the loop's stop predicate
/// and whatever trips it (keyboard, Ctrl-C).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
