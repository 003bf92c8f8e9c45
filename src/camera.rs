// src/camera.rs

use crate::pipeline::FrameSource;
use crate::types::{Frame, FrameGeometry};
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::time::Instant;
use tracing::info;

/// Live camera frame source backed by an OpenCV capture device.
pub struct CameraSource {
    cap: VideoCapture,
    geometry: FrameGeometry,
    opened_at: Instant,
}

impl CameraSource {
    pub fn open(index: i32) -> Result<Self> {
        info!("Opening camera device {}", index);

        let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("failed to open camera device {}", index);
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        Ok(Self {
            cap,
            geometry: FrameGeometry { width, height },
            opened_at: Instant::now(),
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();

        // A live camera that stops delivering frames is gone for good;
        // report end of stream rather than an error.
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        // Geometry comes from the delivered frame, not the capture
        // properties: some devices renegotiate resolution mid-session.
        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        self.geometry = FrameGeometry { width, height };

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let data = rgb.data_bytes()?.to_vec();
        let timestamp_ms = self.opened_at.elapsed().as_secs_f64() * 1000.0;

        Ok(Some(Frame {
            data,
            width,
            height,
            timestamp_ms,
        }))
    }

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}
