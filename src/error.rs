use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures that end the processing of a single story.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot select {requested} unique videos, only {available} available")]
    InsufficientInventory { requested: usize, available: usize },

    #[error("unreadable clip {}: {reason}", path.display())]
    UnreadableClip { path: PathBuf, reason: String },

    #[error("usable footage covers {covered:.2}s of {needed:.2}s narration")]
    InsufficientFootage { covered: f64, needed: f64 },

    #[error("no video files found under {}", .0.display())]
    EmptyCatalog(PathBuf),

    #[error("narration audio not found at {}", .0.display())]
    MissingAudio(PathBuf),
}

/// Why one encoder backend did not produce output. Never fatal on its own.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("{binary} not found in PATH")]
    MissingBinary { binary: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("finished without writing {}", .0.display())]
    MissingOutput(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
