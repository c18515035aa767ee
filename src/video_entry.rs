// src/video_entry.rs

use std::{path::PathBuf, time::SystemTime};

/// Represents a video file discovered during scanning.
/// Includes its path, last modification time and size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    /// The full path to the video file.
    pub path: PathBuf,
    /// Last-modification timestamp reported by the filesystem.
    pub modified: SystemTime,
    /// File size, used to estimate progress when durations are unknown.
    pub size_bytes: u64,
}

impl VideoFile {
    pub fn new(path: PathBuf, modified: SystemTime, size_bytes: u64) -> Self {
        VideoFile {
            path,
            modified,
            size_bytes,
        }
    }
}

/// The order in which videos are handed to the merge.
/// Modification times never decrease from one entry to the next.
#[derive(Debug, Clone)]
pub struct MergeSequence {
    files: Vec<VideoFile>,
}

impl MergeSequence {
    pub fn files(&self) -> &[VideoFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all input sizes; the merged output of a stream copy ends up close to this.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Orders discovered files oldest first.
///
/// The sort is stable, so files sharing a timestamp keep their discovery
/// order (which is file-name order, see `find_video_files`).
pub fn plan(mut files: Vec<VideoFile>) -> MergeSequence {
    files.sort_by_key(|f| f.modified);
    MergeSequence { files }
}
