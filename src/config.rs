// src/config.rs

/// Recognized video container extensions (all lowercase).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];
/// The filename for storing the last directory that was merged successfully.
pub const LAST_DIR_FILE_NAME: &str = "last_dir";
/// The application name, used for creating the application-specific config directory.
pub const APP_NAME: &str = "clip_concat";

/// `chrono` format string for the merged output file name.
pub const OUTPUT_NAME_FORMAT: &str = "merged_%d_%m_%Y_%H%M%S.mp4";

/// Environment variable overriding where the last directory is stored.
pub const STATE_FILE_ENV: &str = "CLIP_CONCAT_STATE_FILE";
/// Environment variable pointing at a specific ffmpeg binary.
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";
/// Environment variable pointing at a specific ffprobe binary.
pub const FFPROBE_PATH_ENV: &str = "FFPROBE_PATH";

/// Width of the drawn progress bar, in ticks.
pub const PROGRESS_BAR_TICKS: usize = 50;

/// The names of the media executables, which are platform-dependent.
#[cfg(windows)]
pub const FFMPEG_EXECUTABLE_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
pub const FFMPEG_EXECUTABLE_NAME: &str = "ffmpeg";
#[cfg(windows)]
pub const FFPROBE_EXECUTABLE_NAME: &str = "ffprobe.exe";
#[cfg(not(windows))]
pub const FFPROBE_EXECUTABLE_NAME: &str = "ffprobe";
