use crate::config::EncoderConfig;
use crate::error::{PipelineError, TierError};
use crate::files::{promote, remove_if_exists};
use crate::logw;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const NORMAL_SPEED_FILE: &str = "normal_speed.mp4";
pub const SUBTITLED_STAGING_FILE: &str = "final_output.subs.mp4";

const SUBTITLE_STYLE: &str =
    "FontSize=24,PrimaryColour=&Hffffff,OutlineColour=&H000000,Outline=2,BorderStyle=3,Shadow=1";

const MIN_CLIP_SECS: f64 = 0.1;
const STDERR_TAIL_LINES: usize = 12;

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run an external tool to completion. The child is killed if the returned
/// future is dropped, which is how callers enforce timeouts.
pub async fn run_cmd(args: &[String]) -> Result<(), TierError> {
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };

    let output = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => TierError::MissingBinary {
                binary: program.clone(),
            },
            _ => TierError::Io(err),
        })?;

    if !output.status.success() {
        return Err(TierError::Failed {
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed: {}", stderr_tail(&output.stderr));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= MIN_CLIP_SECS {
        anyhow::bail!("Invalid duration {:?}", text);
    }
    Ok(duration)
}

/// Clips accepted for one story, in playback order.
#[derive(Debug, Default)]
pub struct FootagePlan {
    pub clips: Vec<PathBuf>,
    pub covered: f64,
    pub skipped: Vec<PipelineError>,
}

impl FootagePlan {
    /// Accept `path` if ffprobe reported a usable duration, otherwise record
    /// it as unreadable and move on.
    pub fn offer(&mut self, path: PathBuf, measured: Result<f64>) {
        let reason = match measured {
            Ok(duration) if duration > MIN_CLIP_SECS => {
                self.covered += duration;
                self.clips.push(path);
                return;
            }
            Ok(duration) => format!("duration {duration:.3}s is too short"),
            Err(err) => err.to_string(),
        };
        let skipped = PipelineError::UnreadableClip { path, reason };
        logw(format!("Skipping clip: {}", skipped));
        self.skipped.push(skipped);
    }

    pub fn covers(&self, needed: f64) -> bool {
        !self.clips.is_empty() && self.covered >= needed
    }

    pub fn finish(self, needed: f64) -> Result<Self, PipelineError> {
        if self.covers(needed) {
            Ok(self)
        } else {
            Err(PipelineError::InsufficientFootage {
                covered: self.covered,
                needed,
            })
        }
    }
}

/// Output frame every composed clip is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl FrameFormat {
    pub fn from_config(cfg: &EncoderConfig) -> Self {
        Self {
            width: cfg.frame_width,
            height: cfg.frame_height,
            fps: cfg.target_fps,
        }
    }
}

/// Letterbox input `index` into `frame` with square pixels, a constant rate
/// and one pixel format, so clips with different sources can be joined.
fn normalize_input(index: usize, frame: FrameFormat) -> String {
    let FrameFormat { width, height, fps } = frame;
    format!(
        "[{index}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black,setsar=1,fps={fps},format=yuv420p[v{index}]"
    )
}

pub fn compose_filter(clip_count: usize, frame: FrameFormat) -> String {
    let mut parts: Vec<String> = (0..clip_count).map(|i| normalize_input(i, frame)).collect();
    let labels: String = (0..clip_count).map(|i| format!("[v{i}]")).collect();
    parts.push(format!("{labels}concat=n={clip_count}:v=1:a=0[v]"));
    parts.join(";")
}

/// One input per clip, the narration last, joined through a `concat`
/// filtergraph and cut at the narration length.
pub fn compose_args(
    clips: &[PathBuf],
    audio: &Path,
    audio_duration: f64,
    frame: FrameFormat,
    out_mp4: &Path,
) -> Vec<String> {
    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    for clip in clips {
        args.push("-i".to_string());
        args.push(clip.display().to_string());
    }
    args.extend([
        "-i".to_string(),
        audio.display().to_string(),
        "-filter_complex".to_string(),
        compose_filter(clips.len(), frame),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        format!("{}:a:0", clips.len()),
        "-t".to_string(),
        format!("{:.3}", audio_duration),
        "-r".to_string(),
        frame.fps.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);
    args
}

/// Stitch `clips` into one video covering the narration and mux the narration
/// over it, producing the pre-speed intermediate in `story_dir`.
pub async fn compose_story_video(
    clips: &[PathBuf],
    audio: &Path,
    audio_duration: f64,
    story_dir: &Path,
    frame: FrameFormat,
) -> Result<PathBuf> {
    let mut plan = FootagePlan::default();
    for clip in clips {
        if plan.covers(audio_duration) {
            break;
        }
        let measured = ffprobe_duration_seconds(clip).await;
        plan.offer(clip.clone(), measured);
    }
    let plan = plan.finish(audio_duration)?;

    let out_mp4 = story_dir.join(NORMAL_SPEED_FILE);
    let args = compose_args(&plan.clips, audio, audio_duration, frame, &out_mp4);
    run_cmd(&args)
        .await
        .with_context(|| format!("Composition failed for {}", story_dir.display()))?;

    if !out_mp4.exists() {
        anyhow::bail!("Composition produced no file at {}", out_mp4.display());
    }
    Ok(out_mp4)
}

/// Path as the `subtitles` filter expects it inside a quoted option value.
pub fn subtitles_filter_path(srt: &Path) -> String {
    srt.display()
        .to_string()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', r"'\''")
}

pub fn burn_args(video: &Path, srt: &Path, out_mp4: &Path) -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-vf".to_string(),
        format!(
            "subtitles='{}':force_style='{}'",
            subtitles_filter_path(srt),
            SUBTITLE_STYLE
        ),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]
}

/// Render `srt` into `video` in place. The render goes to
/// [`SUBTITLED_STAGING_FILE`] next to `video` and only replaces it once
/// ffmpeg has finished and left a file behind; on any failure `video` is
/// untouched.
pub async fn burn_subtitles(video: &Path, srt: &Path, timeout: Duration) -> Result<()> {
    let staging = video.with_file_name(SUBTITLED_STAGING_FILE);
    remove_if_exists(&staging).await?;

    let args = burn_args(video, srt, &staging);
    let result = match tokio::time::timeout(timeout, run_cmd(&args)).await {
        Ok(Ok(())) if staging.is_file() => Ok(()),
        Ok(Ok(())) => Err(TierError::MissingOutput(staging.clone())),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(TierError::Timeout(timeout)),
    };

    if let Err(err) = result {
        remove_if_exists(&staging).await?;
        return Err(err)
            .with_context(|| format!("Subtitle burn-in failed for {}", video.display()));
    }
    promote(&staging, video).await
}
