// src/main.rs

mod camera;
mod config;
mod detector;
mod display;
mod guidance;
mod pipeline;
mod types;

use anyhow::Result;
use camera::CameraSource;
use detector::YoloDetector;
use display::DisplaySink;
use guidance::GuidanceEngine;
use pipeline::{CancelToken, FrameLoop, FrameSource, SessionSummary};
use std::path::Path;
use tracing::{error, info};

fn main() -> Result<()> {
    let config_path =
        std::env::var("OBSTACLE_GUIDANCE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "obstacle_guidance={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🧭 Obstacle Guidance System Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Guidance zones: left < {:.2}·w, right > {:.2}·w, near > {:.2}·h",
        config.guidance.left_zone_ratio,
        config.guidance.right_zone_ratio,
        config.guidance.near_band_ratio
    );

    let mut detector = YoloDetector::new(&config.model, &config.detection)?;
    info!("✓ Obstacle detector ready");

    let mut camera = CameraSource::open(config.video.camera_index)?;
    let geometry = camera.geometry();
    info!("✓ Camera ready ({}x{})", geometry.width, geometry.height);

    let cancel = CancelToken::new();
    {
        let token = cancel.clone();
        ctrlc::set_handler(move || token.cancel())?;
    }

    let mut sink = DisplaySink::new(&config.video, cancel.clone())?;
    info!("✓ Display ready (press 'q' or Ctrl-C to quit)");

    let engine = GuidanceEngine::from_config(&config.guidance);
    if config.guidance.smoothing {
        info!(
            "Directive smoothing: {} consecutive frame(s) to switch",
            config.guidance.confirm_frames
        );
    } else {
        info!("Directive smoothing disabled (raw per-frame directives)");
    }

    let mut frame_loop = FrameLoop::new(engine);
    match frame_loop.run(&mut detector, &mut camera, &mut sink, || cancel.cancelled()) {
        Ok(summary) => {
            report(&summary);
            if let Err(e) = write_summary(&summary, &config.video.output_dir) {
                error!("Failed to write session summary: {:#}", e);
            }
            Ok(())
        }
        Err(e) => {
            error!("Session aborted: {}", e);
            Err(e.into())
        }
    }
}

fn report(summary: &SessionSummary) {
    let m = &summary.metrics;
    info!("\n📊 Session Report ({}):", summary.reason.as_str());
    info!("  Total frames: {}", m.total_frames);
    info!("  Directives emitted: {}", m.directives_emitted);
    info!("    ⬆️  forward: {}", m.forward);
    info!("    ⬅️  left:    {}", m.left);
    info!("    ➡️  right:   {}", m.right);
    info!("    🛑 stop:    {}", m.stop);
    info!("    🔍 analyze: {}", m.analyze);
    info!("  Obstacles detected: {}", m.detections_total);
    if m.sink_failures > 0 {
        info!("  ⚠️  Display failures (tolerated): {}", m.sink_failures);
    }
    info!("  Processing Speed: {:.1} FPS", m.fps);
}

fn write_summary(summary: &SessionSummary, output_dir: &str) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let path = Path::new(output_dir).join("session_summary.json");
    let json = serde_json::to_string_pretty(&summary.metrics)?;
    std::fs::write(&path, json)?;
    info!("💾 Session summary saved to: {}", path.display());
    Ok(())
}
