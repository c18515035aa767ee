// src/file_utils.rs

use crate::config::{APP_NAME, LAST_DIR_FILE_NAME, STATE_FILE_ENV, VIDEO_EXTENSIONS};
use crate::errors::MergeError;
use crate::video_entry::VideoFile;
use std::{
    env, fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Returns the full path to the application's config directory.
/// Unlike the file itself, the directory is only created when something is saved.
///
/// Returns `None` if the system's config directory cannot be determined.
pub fn get_app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_NAME))
}

/// Returns the full path to the file remembering the last merged directory.
/// `CLIP_CONCAT_STATE_FILE` takes precedence over the config directory.
pub fn get_last_dir_path() -> Option<PathBuf> {
    match env::var_os(STATE_FILE_ENV) {
        Some(custom) if !custom.is_empty() => Some(PathBuf::from(custom)),
        _ => get_app_config_dir().map(|dir| dir.join(LAST_DIR_FILE_NAME)),
    }
}

/// Returns true if the path has one of the recognized video extensions, ignoring case.
pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Scans the top level of `folder_path` for files with recognized video extensions.
///
/// Entries are visited in file-name order so the result is deterministic.
/// Subdirectories are never entered, and a directory named like a video is skipped.
///
/// # Errors
///
/// * `DirectoryNotFound` if `folder_path` is not an existing directory.
/// * `DirectoryUnreadable` if listing the directory or reading an entry's metadata fails.
/// * `NoVideosFound` if nothing matched.
pub fn find_video_files(folder_path: &Path) -> Result<Vec<VideoFile>, MergeError> {
    if !folder_path.is_dir() {
        return Err(MergeError::DirectoryNotFound(folder_path.to_path_buf()));
    }

    let unreadable = |source: io::Error| MergeError::DirectoryUnreadable {
        path: folder_path.to_path_buf(),
        source,
    };

    let walker = WalkDir::new(folder_path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut video_files = Vec::new();
    for entry_result in walker {
        let entry = entry_result.map_err(|e| unreadable(e.into()))?;
        let path = entry.path();
        if !has_video_extension(path) {
            continue;
        }

        // fs::metadata follows symlinks, so a linked clip counts as a file.
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Skipping dangling entry '{}'", path.display());
                continue;
            }
            Err(e) => return Err(unreadable(e)),
        };
        if !metadata.is_file() {
            continue;
        }

        let modified = metadata.modified().map_err(unreadable)?;
        video_files.push(VideoFile::new(path.to_path_buf(), modified, metadata.len()));
    }

    if video_files.is_empty() {
        return Err(MergeError::NoVideosFound(folder_path.to_path_buf()));
    }

    log::debug!(
        "Found {} video(s) in '{}'",
        video_files.len(),
        folder_path.display()
    );
    Ok(video_files)
}
