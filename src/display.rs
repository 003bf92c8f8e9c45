// src/display.rs
//
// On-screen presentation: annotated frame, directive hint, keyboard
// shutdown. Strictly downstream of the decision path; every failure here
// is tolerated by the loop.

use crate::pipeline::{CancelToken, PresentationSink};
use crate::types::{Detection, Directive, Frame, VideoConfig};
use anyhow::Result;
use opencv::{
    core::{self, Mat},
    highgui, imgproc,
    prelude::*,
};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

const CROSSHAIR_SIZE: i32 = 15;
const HINT_ARROW_LEN: i32 = 100;

pub struct DisplaySink {
    window: String,
    cancel: CancelToken,
    event_writer: Option<File>,
    last_directive: Option<Directive>,
}

impl DisplaySink {
    pub fn new(config: &VideoConfig, cancel: CancelToken) -> Result<Self> {
        highgui::named_window(&config.window_title, highgui::WINDOW_AUTOSIZE)?;

        let event_writer = if config.save_events {
            std::fs::create_dir_all(&config.output_dir)?;
            let path = Path::new(&config.output_dir).join("directives.jsonl");
            info!("💾 Directive events will be written to: {}", path.display());
            Some(File::create(path)?)
        } else {
            None
        };

        Ok(Self {
            window: config.window_title.clone(),
            cancel,
            event_writer,
            last_directive: None,
        })
    }

    fn annotate(frame: &Frame, detections: &[Detection], directive: Directive) -> Result<Mat> {
        let mat = Mat::from_slice(&frame.data)?;
        let mat = mat.reshape(3, frame.height as i32)?;

        let mut output = Mat::default();
        imgproc::cvt_color(&mat, &mut output, imgproc::COLOR_RGB2BGR, 0)?;

        let box_color = core::Scalar::new(0.0, 255.0, 0.0, 0.0);
        let crosshair_color = core::Scalar::new(255.0, 255.0, 255.0, 0.0);

        for det in detections {
            let b = det.bbox;
            let rect = core::Rect::new(
                b.x1.min(b.x2) as i32,
                b.top_y() as i32,
                (b.x2 - b.x1).abs() as i32,
                (b.y2 - b.y1).abs() as i32,
            );
            imgproc::rectangle(&mut output, rect, box_color, 2, imgproc::LINE_8, 0)?;

            let label = format!("{} {:.0}%", det.class_name, det.confidence * 100.0);
            imgproc::put_text(
                &mut output,
                &label,
                core::Point::new(rect.x, (rect.y - 6).max(12)),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                box_color,
                1,
                imgproc::LINE_8,
                false,
            )?;

            // Crosshair on the box center
            let cx = b.center_x() as i32;
            let cy = ((b.y1 + b.y2) / 2.0) as i32;
            imgproc::line(
                &mut output,
                core::Point::new(cx - CROSSHAIR_SIZE, cy),
                core::Point::new(cx + CROSSHAIR_SIZE, cy),
                crosshair_color,
                1,
                imgproc::LINE_8,
                0,
            )?;
            imgproc::line(
                &mut output,
                core::Point::new(cx, cy - CROSSHAIR_SIZE),
                core::Point::new(cx, cy + CROSSHAIR_SIZE),
                crosshair_color,
                1,
                imgproc::LINE_8,
                0,
            )?;
        }

        draw_directive_hint(&mut output, frame.width as i32, frame.height as i32, directive)?;

        Ok(output)
    }

    fn log_event(&mut self, frame: &Frame, detections: &[Detection], directive: Directive) -> Result<()> {
        if let Some(file) = self.event_writer.as_mut() {
            let line = serde_json::json!({
                "timestamp_ms": frame.timestamp_ms,
                "directive": directive,
                "obstacles": detections.len(),
            });
            writeln!(file, "{}", serde_json::to_string(&line)?)?;
            file.flush()?;
        }
        Ok(())
    }
}

impl PresentationSink for DisplaySink {
    fn present(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        directive: Directive,
    ) -> Result<()> {
        let annotated = Self::annotate(frame, detections, directive)?;
        highgui::imshow(&self.window, &annotated)?;

        let key = highgui::wait_key(1)?;
        if key == i32::from(b'q') {
            info!("'q' pressed, requesting shutdown");
            self.cancel.cancel();
        }

        if self.last_directive != Some(directive) {
            self.last_directive = Some(directive);
            self.log_event(frame, detections, directive)?;
        }

        Ok(())
    }
}

/// Overlay the steering hint. `forward` means a clear path and draws
/// nothing.
fn draw_directive_hint(output: &mut Mat, width: i32, height: i32, directive: Directive) -> Result<()> {
    let green = core::Scalar::new(0.0, 255.0, 0.0, 0.0);
    let red = core::Scalar::new(0.0, 0.0, 255.0, 0.0);
    let yellow = core::Scalar::new(0.0, 255.0, 255.0, 0.0);
    let anchor = core::Point::new(50, 50);
    let center = core::Point::new(width / 2, height / 2);

    match directive {
        Directive::Left => {
            put_hint_text(output, "LEFT", anchor, green)?;
            imgproc::arrowed_line(
                output,
                center,
                core::Point::new(center.x - HINT_ARROW_LEN, center.y),
                green,
                3,
                imgproc::LINE_8,
                0,
                0.5,
            )?;
        }
        Directive::Right => {
            put_hint_text(output, "RIGHT", anchor, green)?;
            imgproc::arrowed_line(
                output,
                center,
                core::Point::new(center.x + HINT_ARROW_LEN, center.y),
                green,
                3,
                imgproc::LINE_8,
                0,
                0.5,
            )?;
        }
        Directive::Stop => put_hint_text(output, "STOP", anchor, red)?,
        Directive::Analyze => put_hint_text(output, "ANALYZING...", anchor, yellow)?,
        Directive::Forward => {}
    }

    Ok(())
}

fn put_hint_text(output: &mut Mat, text: &str, at: core::Point, color: core::Scalar) -> Result<()> {
    imgproc::put_text(
        output,
        text,
        at,
        imgproc::FONT_HERSHEY_SIMPLEX,
        1.5,
        color,
        3,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
