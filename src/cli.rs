// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Merges the videos in a folder, oldest first, into a single mp4 using ffmpeg.",
    long_about = "Merges the videos in a folder, oldest first, into a single mp4 using ffmpeg.\n\
                  The last folder merged successfully is remembered; run without arguments to reuse it."
)]
pub struct Cli {
    /// Folder containing the video files to concatenate (supports ~).
    pub directory: Option<String>,

    /// Where the merged file is written. Defaults to the current directory.
    #[clap(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Print one progress line per percent instead of redrawing in place.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    pub plain: bool,

    /// Clear the remembered folder and exit.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    pub forget: bool,
}
