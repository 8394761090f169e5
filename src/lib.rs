use tracing::{info, warn};

pub mod catalog;
pub mod config;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
mod files;
pub mod generator;
pub mod init;
pub mod selector;
pub mod speed;
pub mod srt;

pub(crate) fn logi(message: impl AsRef<str>) {
    info!("{}", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    info!(status = "ok", "{}", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    warn!("{}", message.as_ref());
}
