// src/guidance/engine.rs
//
// Maps one frame's bounding boxes into a single steering directive.
// The scan order is canonical (left-to-right by box center, ties by top
// edge), so the result never depends on detector-internal ordering.

use crate::guidance::smoother::DirectiveSmoother;
use crate::types::{BoundingBox, Directive, GuidanceConfig};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuidanceError {
    #[error("invalid frame geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
}

/// Zone partition of the frame. A box center left of `left_ratio·width`
/// is in the left zone, right of `right_ratio·width` in the right zone,
/// center zone inclusive in between. A box is "near" when its bottom edge
/// is below `near_ratio·height`.
#[derive(Debug, Clone, Copy)]
pub struct ZoneThresholds {
    pub left_ratio: f32,
    pub right_ratio: f32,
    pub near_ratio: f32,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            left_ratio: 0.4,
            right_ratio: 0.6,
            near_ratio: 0.7,
        }
    }
}

impl ZoneThresholds {
    pub fn from_config(config: &GuidanceConfig) -> Self {
        Self {
            left_ratio: config.left_zone_ratio,
            right_ratio: config.right_zone_ratio,
            near_ratio: config.near_band_ratio,
        }
    }
}

pub struct GuidanceEngine {
    thresholds: ZoneThresholds,
    smoother: Option<DirectiveSmoother>,
}

impl GuidanceEngine {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        Self {
            thresholds,
            smoother: None,
        }
    }

    pub fn from_config(config: &GuidanceConfig) -> Self {
        let mut engine = Self::new(ZoneThresholds::from_config(config));
        if config.smoothing {
            engine.smoother = Some(DirectiveSmoother::new(config.confirm_frames));
        }
        engine
    }

    pub fn with_smoothing(mut self, confirm_frames: u32) -> Self {
        self.smoother = Some(DirectiveSmoother::new(confirm_frames));
        self
    }

    /// Raw zone-heuristic decision for one frame. Pure: the box slice is
    /// never reordered or mutated.
    ///
    /// With multiple simultaneous near obstacles, the left-most one wins.
    /// That tie-break is deliberate and load-bearing; see the scan-order
    /// tests below before changing it.
    pub fn decide(
        &self,
        boxes: &[BoundingBox],
        width: u32,
        height: u32,
    ) -> Result<Directive, GuidanceError> {
        if width == 0 || height == 0 {
            return Err(GuidanceError::InvalidGeometry { width, height });
        }

        if boxes.is_empty() {
            return Ok(Directive::Forward);
        }

        let w = width as f32;
        let h = height as f32;
        let near_y = h * self.thresholds.near_ratio;

        // Canonical scan order without touching the caller's slice.
        let mut order: Vec<usize> = (0..boxes.len()).collect();
        order.sort_by(|&a, &b| {
            let key_a = (boxes[a].center_x(), boxes[a].top_y());
            let key_b = (boxes[b].center_x(), boxes[b].top_y());
            key_a
                .partial_cmp(&key_b)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for &i in &order {
            // Clamp rather than reject: detectors emit boxes that stick
            // out of the frame, and those still carry signal.
            let bottom = boxes[i].bottom_y().clamp(0.0, h);
            if bottom <= near_y {
                continue;
            }

            let center = boxes[i].center_x().clamp(0.0, w);
            let directive = if center < w * self.thresholds.left_ratio {
                Directive::Right
            } else if center > w * self.thresholds.right_ratio {
                Directive::Left
            } else {
                Directive::Stop
            };

            debug!(
                "near obstacle at center_x={:.1} bottom_y={:.1} -> {}",
                center, bottom, directive
            );
            return Ok(directive);
        }

        // Obstacles present but none in the near band: too ambiguous to
        // commit to a heading.
        Ok(Directive::Analyze)
    }

    /// Per-frame decision with temporal smoothing applied when enabled.
    pub fn update(
        &mut self,
        boxes: &[BoundingBox],
        width: u32,
        height: u32,
    ) -> Result<Directive, GuidanceError> {
        let raw = self.decide(boxes, width, height)?;
        match self.smoother.as_mut() {
            Some(smoother) => Ok(smoother.apply(raw)),
            None => Ok(raw),
        }
    }

    /// Clear smoothing state (e.g., when the capture session changes).
    pub fn reset(&mut self) {
        if let Some(smoother) = self.smoother.as_mut() {
            smoother.reset();
        }
    }
}
