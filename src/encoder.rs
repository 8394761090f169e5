//! Speed normalization of the composed story video.
//!
//! A [`SpeedEncoder`] holds an ordered list of [`SpeedBackend`]s (VAAPI
//! devices, NVENC, CPU) and tries them one after another until one produces
//! the sped-up video. Every backend writes to a staging file that is only
//! renamed onto the final name after it succeeds, so a half-written attempt
//! can never be published. When every backend fails the composed video is
//! promoted unchanged and the story is recorded as played at 1.0x.

use crate::config::EncoderConfig;
use crate::error::TierError;
use crate::ffmpeg::run_cmd;
use crate::files::{file_exists, promote, remove_if_exists};
use crate::speed::{SpeedProfile, speed_factor};
use crate::{logi, logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const FINAL_OUTPUT_FILE: &str = "final_output.mp4";
pub const STAGING_FILE: &str = "final_output.part.mp4";

const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// One way of re-encoding a video at a different playback speed.
#[async_trait]
pub trait SpeedBackend: Send + Sync {
    fn name(&self) -> String;

    /// Wall-clock budget for a single attempt.
    fn timeout(&self) -> Duration;

    /// Write `input` played `factor` times faster to `output`.
    async fn encode(&self, input: &Path, output: &Path, factor: f64) -> Result<(), TierError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderKind {
    Vaapi { device: String },
    Nvenc,
    Software,
}

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    pub kind: EncoderKind,
    pub timeout: Duration,
    pub fps: u32,
}

pub fn setpts_filter(factor: f64) -> String {
    format!("setpts={:.6}*PTS", 1.0 / factor)
}

/// `atempo` only accepts 0.5..=2.0 per instance on older ffmpeg builds, so
/// larger changes are split into a chain.
pub fn atempo_chain(factor: f64) -> String {
    let mut stages = Vec::new();
    let mut remaining = factor;
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);
    stages
        .iter()
        .map(|stage| format!("atempo={:.6}", stage))
        .collect::<Vec<_>>()
        .join(",")
}

impl FfmpegBackend {
    pub fn new(kind: EncoderKind, timeout: Duration, fps: u32) -> Self {
        Self { kind, timeout, fps }
    }

    pub fn args(&self, input: &Path, output: &Path, factor: f64) -> Vec<String> {
        let mut args = vec![
            "ffmpeg".to_string(),
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        let video_filter = match &self.kind {
            EncoderKind::Vaapi { device } => {
                args.push("-vaapi_device".to_string());
                args.push(device.clone());
                format!("{},format=nv12,hwupload", setpts_filter(factor))
            }
            EncoderKind::Nvenc | EncoderKind::Software => setpts_filter(factor),
        };

        args.extend([
            "-i".to_string(),
            input.display().to_string(),
            "-filter:v".to_string(),
            video_filter,
            "-filter:a".to_string(),
            atempo_chain(factor),
            "-r".to_string(),
            self.fps.to_string(),
        ]);

        let codec: &[&str] = match &self.kind {
            EncoderKind::Vaapi { .. } => &["-c:v", "h264_vaapi", "-qp", "23"],
            EncoderKind::Nvenc => &["-c:v", "h264_nvenc", "-preset", "p4", "-cq", "23"],
            EncoderKind::Software => &[
                "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-pix_fmt", "yuv420p",
            ],
        };
        args.extend(codec.iter().map(|s| s.to_string()));

        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl SpeedBackend for FfmpegBackend {
    fn name(&self) -> String {
        match &self.kind {
            EncoderKind::Vaapi { device } => format!("vaapi:{}", device),
            EncoderKind::Nvenc => "nvenc".to_string(),
            EncoderKind::Software => "cpu".to_string(),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn encode(&self, input: &Path, output: &Path, factor: f64) -> Result<(), TierError> {
        run_cmd(&self.args(input, output, factor)).await
    }
}

/// Diagnostic record of one backend attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeAttempt {
    pub backend: String,
    pub error: Option<String>,
}

impl EncodeAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub final_path: PathBuf,
    pub profile: SpeedProfile,
    pub attempts: Vec<EncodeAttempt>,
    /// Every backend failed and the video kept its natural speed.
    pub degraded: bool,
}

pub struct SpeedEncoder {
    backends: Vec<Box<dyn SpeedBackend>>,
}

impl SpeedEncoder {
    pub fn with_backends(backends: Vec<Box<dyn SpeedBackend>>) -> Self {
        Self { backends }
    }

    /// VAAPI on each configured device, then NVENC, then CPU.
    pub fn from_config(cfg: &EncoderConfig) -> Self {
        let mut backends: Vec<Box<dyn SpeedBackend>> = Vec::new();
        for device in &cfg.vaapi_devices {
            backends.push(Box::new(FfmpegBackend::new(
                EncoderKind::Vaapi {
                    device: device.clone(),
                },
                cfg.hardware_timeout(),
                cfg.target_fps,
            )));
        }
        if cfg.enable_nvenc {
            backends.push(Box::new(FfmpegBackend::new(
                EncoderKind::Nvenc,
                cfg.hardware_timeout(),
                cfg.target_fps,
            )));
        }
        backends.push(Box::new(FfmpegBackend::new(
            EncoderKind::Software,
            cfg.software_timeout(),
            cfg.target_fps,
        )));
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Speed up `source` according to the narration length and publish it as
    /// [`FINAL_OUTPUT_FILE`] in `output_folder`, alongside its [`SpeedProfile`].
    /// Long-form target durations are drawn from `rng`.
    pub async fn encode<R: Rng + ?Sized>(
        &self,
        source: &Path,
        output_folder: &Path,
        original_audio_duration: f64,
        rng: &mut R,
    ) -> Result<EncodeOutcome> {
        let factor = speed_factor(original_audio_duration, rng);
        self.encode_at(source, output_folder, original_audio_duration, factor)
            .await
    }

    pub async fn encode_at(
        &self,
        source: &Path,
        output_folder: &Path,
        original_audio_duration: f64,
        factor: f64,
    ) -> Result<EncodeOutcome> {
        if !(factor > 0.0) || !factor.is_finite() {
            anyhow::bail!("Invalid speed factor {}", factor);
        }
        if !file_exists(source).await {
            anyhow::bail!("Source video not found: {}", source.display());
        }

        let final_path = output_folder.join(FINAL_OUTPUT_FILE);

        if factor == 1.0 {
            promote(source, &final_path).await?;
            logok(format!(
                "No speedup needed ({:.2}s narration): {}",
                original_audio_duration,
                final_path.display()
            ));
            return self
                .finish(final_path, original_audio_duration, 1.0, Vec::new(), false)
                .await;
        }

        logi(format!(
            "Applying {:.4}x speed to {:.2}s video ({} backends available)",
            factor,
            original_audio_duration,
            self.backends.len()
        ));

        let staging = output_folder.join(STAGING_FILE);
        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let name = backend.name();
            remove_if_exists(&staging).await?;

            logi(format!("Encoding with {} (timeout {:?})...", name, backend.timeout()));
            let result =
                match tokio::time::timeout(backend.timeout(), backend.encode(source, &staging, factor))
                    .await
                {
                    Ok(Ok(())) if staging.is_file() => Ok(()),
                    Ok(Ok(())) => Err(TierError::MissingOutput(staging.clone())),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(TierError::Timeout(backend.timeout())),
                };

            match result {
                Ok(()) => {
                    attempts.push(EncodeAttempt {
                        backend: name.clone(),
                        error: None,
                    });
                    promote(&staging, &final_path).await?;
                    remove_if_exists(source).await?;
                    logok(format!(
                        "Video created with {:.2}x speed using {}: {}",
                        factor,
                        name,
                        final_path.display()
                    ));
                    return self
                        .finish(final_path, original_audio_duration, factor, attempts, false)
                        .await;
                }
                Err(err) => {
                    logw(format!("{} encoding failed: {}", name, err));
                    attempts.push(EncodeAttempt {
                        backend: name,
                        error: Some(err.to_string()),
                    });
                    remove_if_exists(&staging).await?;
                }
            }
        }

        logw(format!(
            "All {} encoder backends failed; keeping normal speed video as final output",
            attempts.len()
        ));
        promote(source, &final_path).await?;
        self.finish(final_path, original_audio_duration, 1.0, attempts, true)
            .await
    }

    async fn finish(
        &self,
        final_path: PathBuf,
        original_audio_duration: f64,
        factor: f64,
        attempts: Vec<EncodeAttempt>,
        degraded: bool,
    ) -> Result<EncodeOutcome> {
        let folder = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let profile = SpeedProfile::new(original_audio_duration, factor);
        profile.save(&folder).await?;
        Ok(EncodeOutcome {
            final_path,
            profile,
            attempts,
            degraded,
        })
    }
}
