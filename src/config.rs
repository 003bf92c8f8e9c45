use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let g = &self.guidance;
        if !(g.left_zone_ratio > 0.0 && g.left_zone_ratio <= g.right_zone_ratio) {
            anyhow::bail!(
                "guidance zone ratios out of order: left={} right={}",
                g.left_zone_ratio,
                g.right_zone_ratio
            );
        }
        if g.right_zone_ratio >= 1.0 {
            anyhow::bail!("guidance.right_zone_ratio must be < 1.0");
        }
        if !(g.near_band_ratio > 0.0 && g.near_band_ratio < 1.0) {
            anyhow::bail!(
                "guidance.near_band_ratio must be in (0, 1), got {}",
                g.near_band_ratio
            );
        }
        if self.detection.confidence_threshold <= 0.0 {
            anyhow::bail!("detection.confidence_threshold must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn base_config() -> Config {
        Config {
            model: ModelConfig {
                path: "models/yolov8n.onnx".to_string(),
                input_size: 640,
                num_threads: 4,
            },
            detection: DetectionConfig {
                confidence_threshold: 0.3,
                iou_threshold: 0.45,
            },
            guidance: GuidanceConfig {
                left_zone_ratio: 0.4,
                right_zone_ratio: 0.6,
                near_band_ratio: 0.7,
                smoothing: true,
                confirm_frames: 3,
            },
            video: VideoConfig {
                camera_index: 0,
                window_title: "Obstacle Guidance".to_string(),
                output_dir: "output".to_string(),
                save_events: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn test_default_ratios_pass_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_inverted_zone_ratios_rejected() {
        let mut config = base_config();
        config.guidance.left_zone_ratio = 0.7;
        config.guidance.right_zone_ratio = 0.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_near_band_must_be_fractional() {
        let mut config = base_config();
        config.guidance.near_band_ratio = 1.0;
        assert!(config.validate().is_err());
    }
}
