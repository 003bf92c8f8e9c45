// src/pipeline/controller.rs
//
// Per-frame control loop: Acquire -> Detect -> Decide -> Emit -> CheckStop.
// Frames are processed strictly sequentially; cancellation is cooperative
// and only observed between frames.

use crate::guidance::{GuidanceEngine, GuidanceError};
use crate::pipeline::metrics::{MetricsSummary, SessionMetrics};
use crate::types::{BoundingBox, Detection, Directive, Frame, FrameGeometry};
use anyhow::Result;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const PROGRESS_LOG_INTERVAL: u64 = 50;

/// Produces bounding boxes for one frame. Swappable so synthetic
/// detectors can drive the loop in tests.
pub trait ObstacleDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Delivers frames until the stream ends. `Ok(None)` is normal
/// exhaustion; `Err` is an abnormal source failure.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    fn geometry(&self) -> FrameGeometry;
}

/// Downstream consumer of (frame, detections, directive). Best-effort:
/// failures are reported but never gate the decision path.
pub trait PresentationSink {
    fn present(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        directive: Directive,
    ) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid frame geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("detector failed: {0}")]
    Detector(anyhow::Error),

    #[error("frame source failed: {0}")]
    Source(anyhow::Error),
}

/// Why a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SourceExhausted,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::SourceExhausted => "stream ended",
            StopReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub metrics: MetricsSummary,
}

pub struct FrameLoop {
    engine: GuidanceEngine,
    metrics: SessionMetrics,
}

impl FrameLoop {
    pub fn new(engine: GuidanceEngine) -> Self {
        Self {
            engine,
            metrics: SessionMetrics::new(),
        }
    }

    /// Drive the loop until the source is exhausted, the stop predicate
    /// fires, or a loop-fatal error occurs. Exactly one directive is
    /// emitted per acquired frame; the source and sink are released on
    /// every exit path.
    pub fn run<D, S, P, F>(
        &mut self,
        detector: &mut D,
        source: &mut S,
        sink: &mut P,
        mut should_stop: F,
    ) -> Result<SessionSummary, SessionError>
    where
        D: ObstacleDetector,
        S: FrameSource,
        P: PresentationSink,
        F: FnMut() -> bool,
    {
        self.engine.reset();

        loop {
            // ── Acquire ──────────────────────────────────────────────
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("frame source exhausted, ending session");
                    return Ok(self.finish(StopReason::SourceExhausted));
                }
                Err(e) => {
                    error!("frame acquisition failed: {:#}", e);
                    return Err(SessionError::Source(e));
                }
            };
            self.metrics.total_frames += 1;
            let frame_id = self.metrics.total_frames;

            // ── Detect ───────────────────────────────────────────────
            // No per-frame retry: a broken detector cannot recover
            // mid-session.
            let detect_start = Instant::now();
            let detections = match detector.detect(&frame) {
                Ok(detections) => detections,
                Err(e) => {
                    error!("detector failed on frame {}: {:#}", frame_id, e);
                    return Err(SessionError::Detector(e));
                }
            };
            self.metrics.last_detect_us = detect_start.elapsed().as_micros() as u64;
            self.metrics.detections_total += detections.len() as u64;

            // ── Decide ───────────────────────────────────────────────
            let geometry = frame.geometry();
            let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
            let directive = match self.engine.update(&boxes, geometry.width, geometry.height) {
                Ok(directive) => directive,
                Err(GuidanceError::InvalidGeometry { width, height }) => {
                    error!("unusable frame geometry {}x{}", width, height);
                    return Err(SessionError::InvalidGeometry { width, height });
                }
            };
            self.metrics.record_directive(directive);
            debug!(
                "frame {}: {} obstacle(s) -> {}",
                frame_id,
                detections.len(),
                directive
            );

            // ── Emit ─────────────────────────────────────────────────
            if let Err(e) = sink.present(&frame, &detections, directive) {
                self.metrics.sink_failures += 1;
                warn!("presentation sink failed (continuing): {:#}", e);
            }

            if frame_id % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "frame {} | directive: {} | obstacles: {} | {:.1} FPS",
                    frame_id,
                    directive,
                    detections.len(),
                    self.metrics.fps()
                );
            }

            // ── CheckStop ────────────────────────────────────────────
            if should_stop() {
                info!("stop requested, ending session");
                return Ok(self.finish(StopReason::Cancelled));
            }
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    fn finish(&self, reason: StopReason) -> SessionSummary {
        SessionSummary {
            reason,
            metrics: self.metrics.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::ZoneThresholds;

    const W: u32 = 640;
    const H: u32 = 480;

    fn frame() -> Frame {
        Frame {
            data: Vec::new(),
            width: W,
            height: H,
            timestamp_ms: 0.0,
        }
    }

    fn detection(cx: f32, bottom: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(cx - 20.0, bottom - 40.0, cx + 20.0, bottom),
            confidence: 0.9,
            class_id: 0,
            class_name: "person".to_string(),
        }
    }

    /// Scripted detector: one detection set per frame, in order.
    struct ScriptedDetector {
        per_frame: Vec<Vec<Detection>>,
        calls: usize,
        fail_on_call: Option<usize>,
    }

    impl ScriptedDetector {
        fn new(per_frame: Vec<Vec<Detection>>) -> Self {
            Self {
                per_frame,
                calls: 0,
                fail_on_call: None,
            }
        }
    }

    impl ObstacleDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_on_call == Some(call) {
                anyhow::bail!("synthetic detector crash");
            }
            Ok(self.per_frame.get(call).cloned().unwrap_or_default())
        }
    }

    struct VecSource {
        frames: Vec<Frame>,
        fail_after: bool,
    }

    impl VecSource {
        fn new(count: usize) -> Self {
            Self {
                frames: (0..count).map(|_| frame()).collect(),
                fail_after: false,
            }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if !self.frames.is_empty() {
                return Ok(Some(self.frames.remove(0)));
            }
            if self.fail_after {
                anyhow::bail!("camera disconnected");
            }
            Ok(None)
        }

        fn geometry(&self) -> FrameGeometry {
            FrameGeometry {
                width: W,
                height: H,
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        directives: Vec<Directive>,
        fail: bool,
    }

    impl PresentationSink for RecordingSink {
        fn present(
            &mut self,
            _frame: &Frame,
            _detections: &[Detection],
            directive: Directive,
        ) -> Result<()> {
            self.directives.push(directive);
            if self.fail {
                anyhow::bail!("window gone");
            }
            Ok(())
        }
    }

    fn frame_loop() -> FrameLoop {
        FrameLoop::new(GuidanceEngine::new(ZoneThresholds::default()))
    }

    #[test]
    fn test_session_ends_on_source_exhaustion() {
        // Frame 1: nothing detected. Frame 2: near center obstacle.
        // Frame 3 never arrives; the source is exhausted.
        let mut detector = ScriptedDetector::new(vec![
            vec![],
            vec![detection(W as f32 * 0.5, H as f32 * 0.9)],
        ]);
        let mut source = VecSource::new(2);
        let mut sink = RecordingSink::default();

        let summary = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || false)
            .unwrap();

        assert_eq!(summary.reason, StopReason::SourceExhausted);
        assert_eq!(summary.metrics.directives_emitted, 2);
        assert_eq!(sink.directives, vec![Directive::Forward, Directive::Stop]);
    }

    #[test]
    fn test_detector_failure_terminates_loop() {
        let mut detector = ScriptedDetector::new(vec![vec![], vec![]]);
        detector.fail_on_call = Some(1);
        let mut source = VecSource::new(5);
        let mut sink = RecordingSink::default();

        let err = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || false)
            .unwrap_err();

        assert!(matches!(err, SessionError::Detector(_)));
        // The first frame got through before the crash
        assert_eq!(sink.directives, vec![Directive::Forward]);
    }

    #[test]
    fn test_sink_failure_is_non_fatal() {
        let mut detector = ScriptedDetector::new(vec![vec![], vec![], vec![]]);
        let mut source = VecSource::new(3);
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        let summary = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || false)
            .unwrap();

        assert_eq!(summary.reason, StopReason::SourceExhausted);
        assert_eq!(summary.metrics.total_frames, 3);
        assert_eq!(summary.metrics.sink_failures, 3);
    }

    #[test]
    fn test_cancellation_observed_after_current_frame() {
        let mut detector = ScriptedDetector::new(vec![vec![], vec![], vec![]]);
        let mut source = VecSource::new(3);
        let mut sink = RecordingSink::default();

        let summary = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || true)
            .unwrap();

        // The frame in flight completes fully before the stop is seen
        assert_eq!(summary.reason, StopReason::Cancelled);
        assert_eq!(summary.metrics.total_frames, 1);
        assert_eq!(sink.directives, vec![Directive::Forward]);
    }

    #[test]
    fn test_invalid_geometry_is_session_fatal() {
        struct ZeroWidthSource {
            served: bool,
        }
        impl FrameSource for ZeroWidthSource {
            fn next_frame(&mut self) -> Result<Option<Frame>> {
                if self.served {
                    return Ok(None);
                }
                self.served = true;
                Ok(Some(Frame {
                    data: Vec::new(),
                    width: 0,
                    height: H,
                    timestamp_ms: 0.0,
                }))
            }
            fn geometry(&self) -> FrameGeometry {
                FrameGeometry {
                    width: 0,
                    height: H,
                }
            }
        }

        let mut detector = ScriptedDetector::new(vec![vec![]]);
        let mut source = ZeroWidthSource { served: false };
        let mut sink = RecordingSink::default();

        let err = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || false)
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::InvalidGeometry { width: 0, height: _ }
        ));
        assert!(sink.directives.is_empty());
    }

    #[test]
    fn test_source_failure_surfaces_as_error() {
        let mut detector = ScriptedDetector::new(vec![vec![]]);
        let mut source = VecSource::new(1);
        source.fail_after = true;
        let mut sink = RecordingSink::default();

        let err = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || false)
            .unwrap_err();

        assert!(matches!(err, SessionError::Source(_)));
        assert_eq!(sink.directives.len(), 1);
    }

    #[test]
    fn test_directives_follow_obstacle_motion() {
        // An obstacle sweeping left zone -> center -> right zone.
        let mut detector = ScriptedDetector::new(vec![
            vec![detection(W as f32 * 0.2, H as f32 * 0.9)],
            vec![detection(W as f32 * 0.5, H as f32 * 0.9)],
            vec![detection(W as f32 * 0.8, H as f32 * 0.9)],
            vec![detection(W as f32 * 0.8, H as f32 * 0.3)],
        ]);
        let mut source = VecSource::new(4);
        let mut sink = RecordingSink::default();

        let summary = frame_loop()
            .run(&mut detector, &mut source, &mut sink, || false)
            .unwrap();

        assert_eq!(
            sink.directives,
            vec![
                Directive::Right,
                Directive::Stop,
                Directive::Left,
                Directive::Analyze
            ]
        );
        assert_eq!(summary.metrics.detections_total, 4);
    }
}
