// src/last_dir.rs

use crate::errors::MergeError;
use crate::file_utils::get_last_dir_path;
use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

fn resolve(custom_path: Option<&Path>) -> Option<PathBuf> {
    match custom_path {
        Some(p) => Some(p.to_path_buf()),
        None => get_last_dir_path(),
    }
}

/// Loads the directory remembered from the last successful merge.
/// If `custom_path` is provided, it reads that file instead of the default store.
///
/// A missing store yields `None` silently. An unreadable store or one with
/// no usable contents is logged as a warning and also yields `None`, so the
/// caller falls back to requiring an explicit directory.
pub fn load_last_dir(custom_path: Option<&Path>) -> Option<PathBuf> {
    let store_path = resolve(custom_path)?;

    match fs::read_to_string(&store_path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            log::warn!(
                "Could not read last directory from '{}' ({}). Ignoring it.",
                store_path.display(),
                e
            );
            None
        }
    }
}

/// Overwrites the remembered directory with `dir`.
/// If `custom_path` is provided, it writes that file instead of the default store.
/// The record is the path as UTF-8 text, without a trailing newline.
///
/// # Errors
///
/// Returns `MergeError::Persistence` if the store location cannot be determined
/// or written. Callers treat this as a warning.
pub fn save_last_dir(dir: &Path, custom_path: Option<&Path>) -> Result<(), MergeError> {
    let store_path = resolve(custom_path).ok_or_else(|| MergeError::Persistence {
        path: PathBuf::new(),
        source: io::Error::new(
            io::ErrorKind::NotFound,
            "Failed to determine the system's config directory.",
        ),
    })?;

    let persistence = |source: io::Error| MergeError::Persistence {
        path: store_path.clone(),
        source,
    };

    if let Some(parent) = store_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(persistence)?;
        }
    }
    fs::write(&store_path, dir.to_string_lossy().as_bytes()).map_err(persistence)?;

    log::debug!(
        "Remembered '{}' in '{}'",
        dir.display(),
        store_path.display()
    );
    Ok(())
}

/// Removes the remembered directory. Returns whether there was one to remove.
pub fn clear_last_dir(custom_path: Option<&Path>) -> Result<bool, MergeError> {
    let Some(store_path) = resolve(custom_path) else {
        return Ok(false);
    };
    match fs::remove_file(&store_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(MergeError::Persistence {
            path: store_path,
            source,
        }),
    }
}
