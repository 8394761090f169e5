use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Folder label for videos stored directly under the catalog root.
pub const ROOT_FOLDER_LABEL: &str = "(root)";

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// Background footage grouped by source folder.
///
/// Folders never map to an empty list. The catalog is read-only once built and
/// can be shared by every story of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoCatalog {
    folders: BTreeMap<String, Vec<PathBuf>>,
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl VideoCatalog {
    /// Scan `root` for videos. Files directly under `root` land in
    /// [`ROOT_FOLDER_LABEL`], files one level down are grouped by their
    /// subfolder name. Deeper files are ignored.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Videos folder not found: {}", root.display());
        }

        let mut folders: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        for entry in WalkDir::new(root).min_depth(1).max_depth(2).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("Failed to scan videos: {}", root.display()))?;
            if !entry.file_type().is_file() || !is_video_file(entry.path()) {
                continue;
            }

            let label = if entry.depth() == 1 {
                ROOT_FOLDER_LABEL.to_string()
            } else {
                entry
                    .path()
                    .parent()
                    .and_then(Path::file_name)
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ROOT_FOLDER_LABEL.to_string())
            };

            folders
                .entry(label)
                .or_default()
                .push(entry.path().to_path_buf());
        }

        Ok(Self { folders })
    }

    /// Build a catalog from an in-memory listing. Empty groups are dropped and
    /// duplicate paths within a group collapse to one.
    pub fn from_groups<I, S, P>(groups: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<P>)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        let mut folders: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for (label, paths) in groups {
            let slot = folders.entry(label.into()).or_default();
            for path in paths {
                let path = path.into();
                if !slot.contains(&path) {
                    slot.push(path);
                }
            }
        }
        folders.retain(|_, paths| !paths.is_empty());
        Self { folders }
    }

    pub fn folders(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.folders
            .iter()
            .map(|(label, paths)| (label.as_str(), paths.as_slice()))
    }

    pub fn folder(&self, label: &str) -> Option<&[PathBuf]> {
        self.folders.get(label).map(Vec::as_slice)
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn total_videos(&self) -> usize {
        self.folders.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}
