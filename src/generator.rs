use crate::catalog::VideoCatalog;
use crate::config::Config;
use crate::encoder::{FINAL_OUTPUT_FILE, SpeedEncoder};
use crate::error::PipelineError;
use crate::ffmpeg::FrameFormat;
use crate::files::file_exists;
use crate::speed::SpeedProfile;
use crate::{ffmpeg, selector, srt};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

pub const AUDIO_FILE: &str = "gene_audio.wav";
/// Normal-speed transcript of the narration, produced upstream.
pub const TRANSCRIPT_FILE: &str = "gene_audio.srt";
pub const SUBTITLES_FILE: &str = "subtitles.srt";

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn story_name(story_dir: &Path) -> String {
    story_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| story_dir.display().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct StoryReport {
    pub final_path: PathBuf,
    pub profile: SpeedProfile,
    pub clips_selected: usize,
    pub degraded: bool,
    pub subtitles: Option<PathBuf>,
    pub subtitles_burned: bool,
}

/// Story folders under `output_root` that carry narration audio, by name.
pub async fn discover_stories(output_root: &Path) -> Result<Vec<PathBuf>> {
    let mut stories = Vec::new();
    let mut entries = fs::read_dir(output_root)
        .await
        .with_context(|| format!("Failed to list stories in {}", output_root.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() && file_exists(&path.join(AUDIO_FILE)).await {
            stories.push(path);
        }
    }
    stories.sort();
    Ok(stories)
}

pub fn output_already_exists(story_dir: &Path) -> bool {
    story_dir.join(FINAL_OUTPUT_FILE).exists()
}

/// Build the final video for one story folder.
pub async fn process_story(
    cfg: &Config,
    catalog: &VideoCatalog,
    encoder: &SpeedEncoder,
    story_dir: &Path,
    rng: &mut StdRng,
) -> Result<StoryReport> {
    let audio = story_dir.join(AUDIO_FILE);
    if !file_exists(&audio).await {
        return Err(PipelineError::MissingAudio(audio).into());
    }

    let audio_duration = ffmpeg::ffprobe_duration_seconds(&audio)
        .await
        .with_context(|| format!("Failed to read narration duration: {}", audio.display()))?;
    logi(format!(
        "Creating video to match audio duration: {:.2}s",
        audio_duration
    ));

    let count = selector::clip_count_for(audio_duration, cfg.seconds_per_clip);
    let clips = selector::select(catalog, count, rng)?;
    logok(format!(
        "Selected {} clips from {} folders",
        clips.len(),
        catalog.folder_count()
    ));

    let normal = ffmpeg::compose_story_video(
        &clips,
        &audio,
        audio_duration,
        story_dir,
        FrameFormat::from_config(&cfg.encoder),
    )
    .await?;
    logok(format!("Composed normal speed video: {}", normal.display()));

    let outcome = encoder
        .encode(&normal, story_dir, audio_duration, rng)
        .await?;
    if outcome.degraded {
        logw(format!(
            "{}: published at natural speed after {} failed encoder attempts",
            story_name(story_dir),
            outcome.attempts.len()
        ));
    }

    let mut subtitles = None;
    let transcript = story_dir.join(TRANSCRIPT_FILE);
    if cfg.subtitles_enabled && file_exists(&transcript).await {
        let out = story_dir.join(SUBTITLES_FILE);
        srt::adjust_srt_for_speed(&transcript, &out, outcome.profile.speed_factor).await?;
        logok(format!(
            "Subtitles retimed for {:.2}x: {}",
            outcome.profile.speed_factor,
            out.display()
        ));
        subtitles = Some(out);
    }

    let subtitles_burned = match &subtitles {
        Some(srt) => burn_in(cfg, &outcome.final_path, srt).await,
        None => false,
    };

    Ok(StoryReport {
        final_path: outcome.final_path,
        profile: outcome.profile,
        clips_selected: clips.len(),
        degraded: outcome.degraded,
        subtitles,
        subtitles_burned,
    })
}

/// Burn `srt` into the published video when enabled. A failed burn-in is
/// logged and the story keeps its video without subtitles.
async fn burn_in(cfg: &Config, final_path: &Path, srt: &Path) -> bool {
    if !cfg.burn_subtitles {
        return false;
    }
    logi(format!("Burning subtitles into {}", final_path.display()));
    match ffmpeg::burn_subtitles(final_path, srt, cfg.encoder.subtitle_timeout()).await {
        Ok(()) => {
            logok(format!("Subtitles burned in: {}", final_path.display()));
            true
        }
        Err(err) => {
            logw(format!(
                "Keeping {} without burned-in subtitles: {:#}",
                final_path.display(),
                err
            ));
            false
        }
    }
}

/// Process every pending story under `cfg.output_path`, one at a time. A story
/// that fails is reported and counted; the run moves on to the next one.
pub async fn run_generation(cfg: &Config) -> Result<RunSummary> {
    let catalog = VideoCatalog::scan(&cfg.videos_path)?;
    if catalog.is_empty() {
        return Err(PipelineError::EmptyCatalog(cfg.videos_path.clone()).into());
    }
    logok(format!(
        "Found {} videos in {} folders under {}",
        catalog.total_videos(),
        catalog.folder_count(),
        cfg.videos_path.display()
    ));

    let encoder = SpeedEncoder::from_config(&cfg.encoder);
    logi(format!(
        "Encoder order: {}",
        encoder.backend_names().join(" -> ")
    ));

    let stories = discover_stories(&cfg.output_path).await?;
    let mut summary = RunSummary {
        discovered: stories.len(),
        ..RunSummary::default()
    };
    let mut rng = StdRng::seed_from_u64(now_seed());

    for (idx, story_dir) in stories.iter().enumerate() {
        let name = story_name(story_dir);
        if output_already_exists(story_dir) {
            logi(format!("Skipping {} (already has {})", name, FINAL_OUTPUT_FILE));
            summary.skipped += 1;
            continue;
        }

        logi(format!(
            "=== Processing video {}/{}: {} ===",
            idx + 1,
            stories.len(),
            name
        ));
        match process_story(cfg, &catalog, &encoder, story_dir, &mut rng).await {
            Ok(report) => {
                summary.succeeded += 1;
                logok(format!(
                    "DONE: {} ({:.2}s -> {:.2}s at {:.2}x, {} clips)",
                    name,
                    report.profile.original_duration,
                    report.profile.final_duration,
                    report.profile.speed_factor,
                    report.clips_selected
                ));
            }
            Err(err) => {
                summary.failed += 1;
                logw(format!("FAILED: {}: {:#}", name, err));
            }
        }
    }

    logi(format!(
        "All done. Succeeded: {}, failed: {}, skipped: {} (of {})",
        summary.succeeded, summary.failed, summary.skipped, summary.discovered
    ));
    Ok(summary)
}
