// src/metadata_retriever.rs

use crate::config::{FFPROBE_EXECUTABLE_NAME, FFPROBE_PATH_ENV};
use crate::video_entry::MergeSequence;
use serde::Deserialize;
use std::{
    env,
    fmt,
    io::Error as IoError,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Duration,
};

/// Custom error type for ffprobe command execution failures.
#[derive(Debug)]
pub struct FfprobeError {
    message: String,
}

impl FfprobeError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

impl fmt::Display for FfprobeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ffprobe error: {}", self.message)
    }
}

impl std::error::Error for FfprobeError {}

// Internal structs for parsing ffprobe JSON output.
#[derive(Deserialize, Debug)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Deserialize, Debug)]
struct FfprobeFormat {
    duration: Option<String>, // Overall duration in seconds (string format).
}

/// Finds a media executable.
///
/// Searched in the following order:
/// 1. The path in the environment variable `env_var`, if set.
/// 2. Next to the application executable.
/// 3. In a `tools` subdirectory next to the executable.
/// 4. The bare name, resolved through the system's PATH when spawned.
pub fn locate_tool(executable_name: &str, env_var: &str) -> PathBuf {
    if let Some(custom) = env::var_os(env_var).filter(|v| !v.is_empty()) {
        return PathBuf::from(custom);
    }

    if let Ok(current_exe_path) = env::current_exe() {
        if let Some(exe_dir) = current_exe_path.parent() {
            let paths_to_check = [
                exe_dir.join(executable_name),
                exe_dir.join("tools").join(executable_name),
            ];
            if let Some(found) = paths_to_check.into_iter().find(|p| p.is_file()) {
                return found;
            }
        }
    }

    PathBuf::from(executable_name)
}

/// Parses ffprobe's `duration` string (seconds) into a `Duration`.
/// Returns `None` for anything that isn't a non-negative number of seconds a `Duration` can hold.
fn parse_duration_string(duration_str: &str) -> Option<Duration> {
    let secs = duration_str.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn parse_ffprobe_json(json_str: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let parsed_data: FfprobeOutput = serde_json::from_str(json_str)
        .map_err(|e| FfprobeError::new(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let duration_str = parsed_data
        .format
        .duration
        .ok_or_else(|| FfprobeError::new("no duration reported".into()))?;

    parse_duration_string(&duration_str)
        .ok_or_else(|| FfprobeError::new(format!("unusable duration '{}'", duration_str)).into())
}

/// Retrieves a video's duration by running `ffprobe`.
///
/// # Errors
///
/// Returns an error if `ffprobe` cannot be executed, exits unsuccessfully,
/// or its output carries no usable duration.
pub fn get_video_duration(
    ffprobe: &Path,
    file_path: &Path,
) -> Result<Duration, Box<dyn std::error::Error>> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(file_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            IoError::new(
                e.kind(),
                format!(
                    "Failed to execute ffprobe command '{}': {}",
                    ffprobe.display(),
                    e
                ),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Box::new(FfprobeError::new(format!(
            "ffprobe failed (status: {}): {}",
            output.status,
            stderr.trim()
        ))));
    }

    parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
}

/// Sums the durations of every file in the sequence.
///
/// Returns `None` as soon as one file has no readable duration; progress then falls
/// back to comparing byte counts.
pub fn total_duration(sequence: &MergeSequence) -> Option<Duration> {
    let ffprobe = locate_tool(FFPROBE_EXECUTABLE_NAME, FFPROBE_PATH_ENV);
    let mut total = Duration::ZERO;
    for video in sequence.files() {
        match get_video_duration(&ffprobe, &video.path) {
            Ok(duration) => total = total.checked_add(duration)?,
            Err(e) => {
                log::info!(
                    "Could not read the duration of '{}' ({}); estimating progress from file sizes.",
                    video.path.display(),
                    e
                );
                return None;
            }
        }
    }
    Some(total)
}
