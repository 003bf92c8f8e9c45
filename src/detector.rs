// src/detector.rs
//
// YOLOv8 obstacle detector over ONNX Runtime. Anything the model sees is
// an obstacle: no class filtering, only confidence and NMS.

use crate::pipeline::ObstacleDetector;
use crate::types::{BoundingBox, Detection, DetectionConfig, Frame, ModelConfig};
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const NUM_CLASSES: usize = 80;

const COCO_CLASS_NAMES: [&str; NUM_CLASSES] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub struct YoloDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(model: &ModelConfig, detection: &DetectionConfig) -> Result<Self> {
        info!("Loading detection model: {}", model.path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(model.num_threads)?
            .commit_from_file(&model.path)
            .with_context(|| format!("loading model {}", model.path))?;

        info!("✓ Detection model loaded");
        Ok(Self {
            session,
            input_size: model.input_size,
            confidence_threshold: detection.confidence_threshold,
            iou_threshold: detection.iou_threshold,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1_usize, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    /// Turn the raw [1, 84, N] output tensor into frame-space detections.
    fn parse_output(&self, output: &[f32], letterbox: Letterbox) -> Vec<Detection> {
        let attrs = 4 + NUM_CLASSES;
        let num_preds = output.len() / attrs;
        let mut detections = Vec::new();

        for i in 0..num_preds {
            // Center-format box followed by one score per class,
            // transposed: attribute-major layout.
            let cx = output[i];
            let cy = output[num_preds + i];
            let w = output[num_preds * 2 + i];
            let h = output[num_preds * 3 + i];

            let mut best_score = 0.0f32;
            let mut best_class = 0;
            for c in 0..NUM_CLASSES {
                let score = output[num_preds * (4 + c) + i];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < self.confidence_threshold {
                continue;
            }

            let bbox = letterbox.to_frame(BoundingBox::new(
                cx - w / 2.0,
                cy - h / 2.0,
                cx + w / 2.0,
                cy + h / 2.0,
            ));

            detections.push(Detection {
                bbox,
                confidence: best_score,
                class_id: best_class,
                class_name: COCO_CLASS_NAMES[best_class].to_string(),
            });
        }

        non_max_suppression(detections, self.iou_threshold)
    }
}

impl ObstacleDetector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::fit(frame.width, frame.height, self.input_size);
        let input = letterbox.preprocess(&frame.data, frame.width, frame.height, self.input_size);

        let output = self.infer(input)?;
        let detections = self.parse_output(&output, letterbox);

        debug!("detected {} object(s)", detections.len());
        Ok(detections)
    }
}

/// Aspect-preserving resize onto a square model input, plus the inverse
/// mapping back to frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(src_w: u32, src_h: u32, target: usize) -> Self {
        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;
        Self {
            scale,
            pad_x: (target - scaled_w) as f32 / 2.0,
            pad_y: (target - scaled_h) as f32 / 2.0,
        }
    }

    /// Letterbox the RGB frame onto a gray canvas and emit normalized CHW.
    fn preprocess(&self, src: &[u8], src_w: u32, src_h: u32, target: usize) -> Vec<f32> {
        let scaled_w = (src_w as f32 * self.scale) as usize;
        let scaled_h = (src_h as f32 * self.scale) as usize;
        let resized = resize_rgb(src, src_w as usize, src_h as usize, scaled_w, scaled_h);

        let mut canvas = vec![114u8; target * target * 3];
        let off_x = self.pad_x as usize;
        let off_y = self.pad_y as usize;
        for y in 0..scaled_h {
            let src_row = y * scaled_w * 3;
            let dst_row = ((y + off_y) * target + off_x) * 3;
            canvas[dst_row..dst_row + scaled_w * 3]
                .copy_from_slice(&resized[src_row..src_row + scaled_w * 3]);
        }

        let mut input = vec![0.0f32; 3 * target * target];
        for c in 0..3 {
            for y in 0..target {
                for x in 0..target {
                    input[c * target * target + y * target + x] =
                        canvas[(y * target + x) * 3 + c] as f32 / 255.0;
                }
            }
        }
        input
    }

    /// Undo the letterbox transform on a model-space box.
    fn to_frame(&self, b: BoundingBox) -> BoundingBox {
        BoundingBox::new(
            (b.x1 - self.pad_x) / self.scale,
            (b.y1 - self.pad_y) / self.scale,
            (b.x2 - self.pad_x) / self.scale,
            (b.y2 - self.pad_y) / self.scale,
        )
    }
}

fn resize_rgb(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    'candidates: for det in detections {
        for kept in &keep {
            if iou(&kept.bbox, &det.bbox) >= iou_threshold {
                continue 'candidates;
            }
        }
        keep.push(det);
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence: conf,
            class_id: 0,
            class_name: "person".to_string(),
        }
    }

    #[test]
    fn test_iou_values() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((iou(&a, &b) - 1.0).abs() < 1e-6);

        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &c), 0.0);

        // Half-overlapping: intersection 50, union 150
        let d = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((iou(&a, &d) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let detections = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6),
            det(1.0, 1.0, 11.0, 11.0, 0.9),
            det(50.0, 50.0, 60.0, 60.0, 0.5),
        ];

        let kept = non_max_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn test_letterbox_round_trip() {
        // 1280x720 into 640: scale 0.5, vertical padding only
        let lb = Letterbox::fit(1280, 720, 640);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);

        let model_space = BoundingBox::new(100.0, 240.0, 200.0, 340.0);
        let frame_space = lb.to_frame(model_space);
        assert!((frame_space.x1 - 200.0).abs() < 1e-4);
        assert!((frame_space.y1 - 200.0).abs() < 1e-4);
        assert!((frame_space.x2 - 400.0).abs() < 1e-4);
        assert!((frame_space.y2 - 400.0).abs() < 1e-4);
    }

    #[test]
    fn test_resize_preserves_solid_color() {
        let src = vec![200u8; 8 * 8 * 3];
        let out = resize_rgb(&src, 8, 8, 4, 4);
        assert_eq!(out.len(), 4 * 4 * 3);
        assert!(out.iter().all(|&v| v == 200));
    }
}
