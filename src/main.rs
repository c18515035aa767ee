// src/main.rs

use chrono::{DateTime, Local};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

// Module declarations
mod cli;
mod config;
mod errors;
mod file_utils;
mod last_dir;
mod merger;
mod metadata_retriever;
mod progress;
mod video_entry;

// Crate imports for convenience
use crate::cli::Cli;
use crate::errors::MergeError;
use crate::file_utils::find_video_files;
use crate::last_dir::{clear_last_dir, load_last_dir, save_last_dir};
use crate::merger::{invoke, output_file_name, Ffmpeg, MediaTool};
use crate::metadata_retriever::total_duration;
use crate::progress::{select_sink, ProgressReporter, ProgressSink, ProgressState};
use crate::video_entry::{plan, MergeSequence};

const USAGE_HINT: &str = "Only argument is path to video files to concatenate. \
                          The last used dir is remembered after the first successful run; no args will use it.";

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli_args = Cli::parse();
    if let Err(err) = run_app(cli_args) {
        eprintln!("Error: {}", err);
        process::exit(err.exit_code());
    }
}

fn run_app(cli_args: Cli) -> Result<(), MergeError> {
    if cli_args.forget {
        if clear_last_dir(None)? {
            println!("Forgot the remembered folder.");
        } else {
            println!("No folder was remembered.");
        }
        return Ok(());
    }

    let output_dir = match cli_args.output_dir {
        Some(dir) => dir,
        None => env::current_dir().map_err(|source| MergeError::OutputWrite {
            path: PathBuf::from("."),
            source,
        })?,
    };

    let request = MergeRequest {
        directory: cli_args.directory.as_deref(),
        output_dir: &output_dir,
        store_path: None,
        started: Local::now(),
    };
    let tool = Ffmpeg::locate();
    let merged = merge_directory(&request, &tool, select_sink(cli_args.plain), total_duration)?;

    println!("Merged video written to: {}", merged.display());
    Ok(())
}

/// Everything one merge run needs to know besides its collaborators.
struct MergeRequest<'a> {
    /// Directory given on the command line, before `~` expansion.
    directory: Option<&'a str>,
    output_dir: &'a Path,
    /// Alternative location of the remembered directory (tests only use this).
    store_path: Option<&'a Path>,
    started: DateTime<Local>,
}

/// Picks the directory to merge: the explicit argument, or the remembered one.
fn resolve_directory(
    directory: Option<&str>,
    store_path: Option<&Path>,
) -> Result<PathBuf, MergeError> {
    let path = match directory {
        Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
        None => {
            let remembered =
                load_last_dir(store_path).ok_or_else(|| MergeError::Usage(USAGE_HINT.into()))?;
            println!("Using last folder: {}", remembered.display());
            remembered
        }
    };
    Ok(std::path::absolute(&path).unwrap_or(path))
}

/// Discovers, orders and merges the videos of one directory, then remembers it.
///
/// The directory is only remembered when the merge succeeded.
fn merge_directory<T, S, P>(
    request: &MergeRequest<'_>,
    tool: &T,
    sink: S,
    durations: P,
) -> Result<PathBuf, MergeError>
where
    T: MediaTool + ?Sized,
    S: ProgressSink,
    P: FnOnce(&MergeSequence) -> Option<Duration>,
{
    let directory = resolve_directory(request.directory, request.store_path)?;

    let sequence = plan(find_video_files(&directory)?);
    let output_name = output_file_name(request.started);
    println!(
        "Combined mp4 will be written to: {}",
        request.output_dir.join(&output_name).display()
    );
    println!(
        "Merging {} video(s) from '{}', oldest first.",
        sequence.len(),
        directory.display()
    );

    let state = ProgressState::new(durations(&sequence), sequence.total_bytes());
    let mut reporter = ProgressReporter::new(state, sink);
    let merged = invoke(&sequence, request.output_dir, &output_name, tool, &mut reporter)?;

    if let Err(e) = save_last_dir(&directory, request.store_path) {
        log::warn!("{}", e);
    }
    Ok(merged)
}
