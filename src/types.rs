use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub guidance: GuidanceConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub input_size: usize,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceConfig {
    pub left_zone_ratio: f32,
    pub right_zone_ratio: f32,
    pub near_band_ratio: f32,
    pub smoothing: bool,
    pub confirm_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub camera_index: i32,
    pub window_title: String,
    pub output_dir: String,
    pub save_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One RGB24 frame as delivered by the frame source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.width,
            height: self.height,
        }
    }
}

/// Pixel dimensions of a frame. Read per frame; a source may change
/// resolution mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned box in pixel coordinates of the frame it was detected in.
///
/// Upstream detectors occasionally emit inverted or out-of-range corners;
/// the accessors below are order-independent so such boxes still classify.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Horizontal center. The midpoint is symmetric, so inverted corners
    /// give the same answer.
    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    /// Lowest edge in image coordinates (proximity proxy).
    pub fn bottom_y(&self) -> f32 {
        self.y1.max(self.y2)
    }

    /// Highest edge in image coordinates, used for scan-order tie-breaks.
    pub fn top_y(&self) -> f32 {
        self.y1.min(self.y2)
    }
}

/// A single detector output. The decision core only reads `bbox`;
/// class and confidence are carried for annotation and logging.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// The steering directive emitted once per processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directive {
    Forward,
    Left,
    Right,
    Stop,
    Analyze,
}

impl Directive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::Forward => "forward",
            Directive::Left => "left",
            Directive::Right => "right",
            Directive::Stop => "stop",
            Directive::Analyze => "analyze",
        }
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
