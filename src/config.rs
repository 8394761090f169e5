use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_videos_path")]
    pub videos_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default = "default_seconds_per_clip")]
    pub seconds_per_clip: f64,
    #[serde(default = "default_true")]
    pub subtitles_enabled: bool,
    /// Also render the retimed subtitles into the final video.
    #[serde(default)]
    pub burn_subtitles: bool,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_vaapi_devices")]
    pub vaapi_devices: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_nvenc: bool,
    #[serde(default = "default_hardware_timeout")]
    pub hardware_timeout_secs: u64,
    #[serde(default = "default_software_timeout")]
    pub software_timeout_secs: u64,
    #[serde(default = "default_subtitle_timeout")]
    pub subtitle_timeout_secs: u64,
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

fn default_videos_path() -> PathBuf {
    PathBuf::from("Videos")
}

fn default_seconds_per_clip() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_vaapi_devices() -> Vec<String> {
    vec![
        "/dev/dri/renderD128".to_string(),
        "/dev/dri/renderD129".to_string(),
    ]
}

fn default_hardware_timeout() -> u64 {
    120
}

fn default_software_timeout() -> u64 {
    300
}

fn default_subtitle_timeout() -> u64 {
    300
}

fn default_target_fps() -> u32 {
    60
}

fn default_frame_width() -> u32 {
    1080
}

fn default_frame_height() -> u32 {
    1920
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            vaapi_devices: default_vaapi_devices(),
            enable_nvenc: true,
            hardware_timeout_secs: default_hardware_timeout(),
            software_timeout_secs: default_software_timeout(),
            subtitle_timeout_secs: default_subtitle_timeout(),
            target_fps: default_target_fps(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
        }
    }
}

impl EncoderConfig {
    pub fn hardware_timeout(&self) -> Duration {
        Duration::from_secs(self.hardware_timeout_secs)
    }

    pub fn software_timeout(&self) -> Duration {
        Duration::from_secs(self.software_timeout_secs)
    }

    pub fn subtitle_timeout(&self) -> Duration {
        Duration::from_secs(self.subtitle_timeout_secs)
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content).context("config.json: invalid JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_path.as_os_str().is_empty() {
            anyhow::bail!("config.json: output_path missing");
        }
        if self.videos_path.as_os_str().is_empty() {
            anyhow::bail!("config.json: videos_path missing");
        }
        if !(self.seconds_per_clip > 0.0) {
            anyhow::bail!(
                "config.json: seconds_per_clip must be positive (got {})",
                self.seconds_per_clip
            );
        }
        if self.encoder.target_fps == 0 {
            anyhow::bail!("config.json: encoder.target_fps must be positive");
        }
        let (w, h) = (self.encoder.frame_width, self.encoder.frame_height);
        // yuv420p needs even dimensions.
        if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
            anyhow::bail!(
                "config.json: encoder frame size must be even and non-zero (got {}x{})",
                w,
                h
            );
        }
        Ok(())
    }
}
