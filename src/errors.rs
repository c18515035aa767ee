// src/errors.rs

use std::{fmt, io, path::PathBuf, process::ExitStatus};

/// Every way a merge run can fail.
///
/// All variants except `Persistence` abort the run; `Persistence` is only
/// ever logged as a warning.
#[derive(Debug)]
pub enum MergeError {
    /// Missing or invalid command-line input.
    Usage(String),
    /// The input path does not exist or is not a directory.
    DirectoryNotFound(PathBuf),
    /// The input directory exists but could not be listed.
    DirectoryUnreadable { path: PathBuf, source: io::Error },
    /// The directory contains no file with a recognized video extension.
    NoVideosFound(PathBuf),
    /// The external media tool could not be started because it was not found.
    ExternalToolMissing { program: PathBuf, source: io::Error },
    /// The external media tool ran but exited unsuccessfully.
    ExternalToolFailed { status: ExitStatus, diagnostic: String },
    /// The merged output file (or the manifest) could not be created.
    OutputWrite { path: PathBuf, source: io::Error },
    /// Reading or writing the remembered directory failed.
    Persistence { path: PathBuf, source: io::Error },
}

impl MergeError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MergeError::Usage(_) => 2,
            MergeError::DirectoryNotFound(_) | MergeError::DirectoryUnreadable { .. } => 3,
            MergeError::NoVideosFound(_) => 4,
            MergeError::ExternalToolMissing { .. } => 5,
            MergeError::ExternalToolFailed { .. } => 6,
            MergeError::OutputWrite { .. } => 7,
            MergeError::Persistence { .. } => 8,
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::Usage(msg) => write!(f, "{}", msg),
            MergeError::DirectoryNotFound(path) => write!(
                f,
                "Path provided is not a directory or does not exist: {}",
                path.display()
            ),
            MergeError::DirectoryUnreadable { path, source } => {
                write!(f, "Could not read directory '{}': {}", path.display(), source)
            }
            MergeError::NoVideosFound(path) => {
                write!(f, "Found no videos in: {}", path.display())
            }
            MergeError::ExternalToolMissing { program, source } => write!(
                f,
                "Could not run '{}' ({}). Is ffmpeg installed and on your PATH?",
                program.display(),
                source
            ),
            MergeError::ExternalToolFailed { status, diagnostic } => {
                let diagnostic = diagnostic.trim();
                if diagnostic.is_empty() {
                    write!(f, "ffmpeg failed ({})", status)
                } else {
                    // Keep the message on one line; ffmpeg's last line is usually the useful one.
                    let last = diagnostic.lines().last().unwrap_or(diagnostic);
                    write!(f, "ffmpeg failed ({}): {}", status, last.trim())
                }
            }
            MergeError::OutputWrite { path, source } => {
                write!(f, "Could not create output '{}': {}", path.display(), source)
            }
            MergeError::Persistence { path, source } => write!(
                f,
                "Could not persist last directory at '{}': {}",
                path.display(),
                source
            ),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MergeError::DirectoryUnreadable { source, .. }
            | MergeError::ExternalToolMissing { source, .. }
            | MergeError::OutputWrite { source, .. }
            | MergeError::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}
