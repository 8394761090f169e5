use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

pub(crate) async fn file_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Move `from` onto `to`, replacing whatever was there. Falls back to
/// copy + remove when the two paths live on different filesystems.
pub(crate) async fn promote(from: &Path, to: &Path) -> Result<()> {
    remove_if_exists(to).await?;
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => copy_then_remove(from, to).await,
        Err(err) => Err(err)
            .with_context(|| format!("Failed to move {} -> {}", from.display(), to.display())),
    }
}

async fn copy_then_remove(from: &Path, to: &Path) -> Result<()> {
    if let Err(err) = fs::copy(from, to).await {
        // A half-written copy must not be mistaken for a finished file.
        remove_if_exists(to).await?;
        return Err(err)
            .with_context(|| format!("Failed to copy {} -> {}", from.display(), to.display()));
    }
    remove_if_exists(from).await
}
