use crate::config::Config;
use crate::logi;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Create the videos and output roots named in `cfg` if they are missing.
pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [cfg.videos_path.as_path(), cfg.output_path.as_path()] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_available(binary: &str) -> bool {
    match tokio::process::Command::new(binary)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub async fn check_ffmpeg() -> bool {
    tool_available("ffmpeg").await && tool_available("ffprobe").await
}
