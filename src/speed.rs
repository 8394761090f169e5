use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Narrations up to this length keep their natural speed.
pub const NO_SPEEDUP_MAX_SECS: f64 = 90.0;
/// Narrations at or above this length are squeezed into a random target window.
pub const LONG_FORM_MIN_SECS: f64 = 180.0;
pub const RAMP_END_SECS: f64 = 179.0;
pub const LONG_FORM_TARGET_SECS: (f64, f64) = (150.0, 166.0);

pub const SPEED_INFO_FILE: &str = "speed_info.json";

/// Playback multiplier for a narration of `duration` seconds.
///
/// * `<= 90s`: 1.0
/// * `90s..180s`: linear ramp, 1.0 at 90s to 2.0 at 179s
/// * `>= 180s`: `duration / target`, target drawn uniformly from 150..=166s
pub fn speed_factor<R: Rng + ?Sized>(duration: f64, rng: &mut R) -> f64 {
    if duration <= NO_SPEEDUP_MAX_SECS {
        1.0
    } else if duration < LONG_FORM_MIN_SECS {
        1.0 + (duration - NO_SPEEDUP_MAX_SECS) / (RAMP_END_SECS - NO_SPEEDUP_MAX_SECS)
    } else {
        let (lo, hi) = LONG_FORM_TARGET_SECS;
        let target = rng.gen_range(lo..=hi);
        duration / target
    }
}

/// Sidecar describing how much a story's final video was sped up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub original_duration: f64,
    pub final_duration: f64,
    pub speed_factor: f64,
    #[serde(default)]
    pub encoded_at: Option<String>,
}

impl SpeedProfile {
    pub fn new(original_duration: f64, speed_factor: f64) -> Self {
        Self {
            original_duration,
            final_duration: original_duration / speed_factor,
            speed_factor,
            encoded_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn unchanged(original_duration: f64) -> Self {
        Self::new(original_duration, 1.0)
    }

    pub fn path_in(story_dir: &Path) -> PathBuf {
        story_dir.join(SPEED_INFO_FILE)
    }

    pub async fn save(&self, story_dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(story_dir);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write speed info: {}", path.display()))?;
        Ok(path)
    }

    pub async fn load(story_dir: &Path) -> Result<Self> {
        let path = Self::path_in(story_dir);
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read speed info: {}", path.display()))?;
        let profile: SpeedProfile = serde_json::from_str(&text)
            .with_context(|| format!("Invalid speed info: {}", path.display()))?;
        if !(profile.speed_factor > 0.0) {
            anyhow::bail!("{}: speed_factor must be positive", path.display());
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn factor(duration: f64) -> f64 {
        speed_factor(duration, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn short_narrations_keep_natural_speed() {
        assert_eq!(factor(45.0), 1.0);
        assert_eq!(factor(89.0), 1.0);
        assert_eq!(factor(90.0), 1.0);
    }

    #[test]
    fn mid_length_narrations_ramp_linearly() {
        let just_over = factor(90.0001);
        assert!((just_over - (1.0 + 0.0001 / 89.0)).abs() < 1e-12);
        assert!(just_over > 1.0);

        assert_eq!(factor(179.0), 2.0);
        assert!((factor(135.0) - 1.505_617_977).abs() < 1e-6);
        assert!(factor(179.9) > 2.0);
    }

    #[test]
    fn long_narrations_land_in_target_window() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut targets = Vec::new();
        for _ in 0..2_000 {
            for duration in [180.0, 200.0, 420.0] {
                let f = speed_factor(duration, &mut rng);
                let target = duration / f;
                assert!(
                    (150.0 - 1e-9..=166.0 + 1e-9).contains(&target),
                    "target {target} out of range for {duration}s"
                );
                targets.push(target);
            }
        }
        let min = targets.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = targets.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max - min > 10.0, "targets should spread across the window");
    }

    #[test]
    fn profile_derives_final_duration() {
        let profile = SpeedProfile::new(200.0, 1.25);
        assert_eq!(profile.final_duration, 160.0);
        let same = SpeedProfile::unchanged(45.0);
        assert_eq!(same.original_duration, 45.0);
        assert_eq!(same.final_duration, 45.0);
        assert_eq!(same.speed_factor, 1.0);
    }

    #[tokio::test]
    async fn profile_is_persisted_next_to_the_video() {
        let dir = tempfile::tempdir().unwrap();
        let profile = SpeedProfile::new(135.0, 1.5);
        let path = profile.save(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join(SPEED_INFO_FILE));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["original_duration"], 135.0);
        assert_eq!(raw["final_duration"], 90.0);
        assert_eq!(raw["speed_factor"], 1.5);

        assert_eq!(SpeedProfile::load(dir.path()).await.unwrap(), profile);
    }

    #[tokio::test]
    async fn load_accepts_records_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SPEED_INFO_FILE),
            r#"{"original_duration": 10.0, "final_duration": 5.0, "speed_factor": 2.0}"#,
        )
        .unwrap();
        let profile = SpeedProfile::load(dir.path()).await.unwrap();
        assert_eq!(profile.speed_factor, 2.0);
        assert_eq!(profile.encoded_at, None);
    }

    #[tokio::test]
    async fn load_rejects_zero_factor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SPEED_INFO_FILE),
            r#"{"original_duration": 10.0, "final_duration": 5.0, "speed_factor": 0.0}"#,
        )
        .unwrap();
        assert!(SpeedProfile::load(dir.path()).await.is_err());
    }
}
