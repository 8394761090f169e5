use anyhow::Result;
use story_shorts::config::Config;
use story_shorts::generator::run_generation;
use story_shorts::init;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let cfg = Config::load(&config_path).await?;

    init::ensure_directories(&cfg).await?;

    if !init::check_ffmpeg().await {
        warn!("FFmpeg/ffprobe not found in PATH. Please install FFmpeg.");
    }

    let summary = run_generation(&cfg).await?;
    std::process::exit(if summary.failed == 0 { 0 } else { 1 });
}
