// src/merger.rs

use crate::config::{FFMPEG_EXECUTABLE_NAME, FFMPEG_PATH_ENV, OUTPUT_NAME_FORMAT};
use crate::errors::MergeError;
use crate::metadata_retriever::locate_tool;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::video_entry::MergeSequence;
use chrono::{DateTime, Local};
use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tempfile::NamedTempFile;

/// An external program able to concatenate the files listed in a concat-demuxer manifest.
pub trait MediaTool {
    /// Runs the concatenation, handing each line of status output to `on_line`
    /// as it arrives. Returns once the program has exited.
    fn concat(
        &self,
        manifest: &Path,
        output: &Path,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<(), MergeError>;
}

/// ffmpeg in concat-demuxer, stream-copy mode.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: PathBuf) -> Self {
        Ffmpeg { program }
    }

    /// Uses `FFMPEG_PATH`, a bundled binary, or whatever `ffmpeg` is on the PATH.
    pub fn locate() -> Self {
        Self::new(locate_tool(FFMPEG_EXECUTABLE_NAME, FFMPEG_PATH_ENV))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The argument list for one merge. Progress goes to stdout as key=value
    /// lines; stderr only carries errors.
    pub fn args(manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-nostdin",
            "-nostats",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(manifest.as_os_str().to_owned());
        args.extend(["-c", "copy", "-y"].iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl MediaTool for Ffmpeg {
    fn concat(
        &self,
        manifest: &Path,
        output: &Path,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<(), MergeError> {
        let missing = |source: io::Error| MergeError::ExternalToolMissing {
            program: self.program.clone(),
            source,
        };

        // stderr goes to a scratch file so a single blocking read on stdout is enough.
        let mut stderr_log = tempfile::tempfile().map_err(|source| MergeError::OutputWrite {
            path: std::env::temp_dir(),
            source,
        })?;
        let stderr_handle = stderr_log.try_clone().map_err(|source| MergeError::OutputWrite {
            path: std::env::temp_dir(),
            source,
        })?;

        log::debug!(
            "Running {} {:?}",
            self.program().display(),
            Self::args(manifest, output)
        );
        let mut child = Command::new(&self.program)
            .args(Self::args(manifest, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(missing)?;

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    // Status output is ASCII; anything else is noise the reporter ignores.
                    Ok(_) => on_line(String::from_utf8_lossy(&buf).trim_end()),
                    Err(e) => {
                        log::warn!("Stopped reading ffmpeg progress: {}", e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().map_err(missing)?;
        if status.success() {
            return Ok(());
        }

        let mut raw = Vec::new();
        let diagnostic = match stderr_log
            .seek(SeekFrom::Start(0))
            .and_then(|_| stderr_log.read_to_end(&mut raw))
        {
            Ok(_) => String::from_utf8_lossy(&raw).into_owned(),
            Err(e) => format!("(could not read ffmpeg output: {})", e),
        };
        Err(MergeError::ExternalToolFailed { status, diagnostic })
    }
}

/// Output file name for a merge started at `started`, e.g. `merged_19_10_2026_141502.mp4`.
pub fn output_file_name(started: DateTime<Local>) -> String {
    started.format(OUTPUT_NAME_FORMAT).to_string()
}

/// Quotes a path for a concat-demuxer `file` directive.
fn quote_manifest_path(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

/// Renders the manifest: one `file '<absolute path>'` line per video, in merge order.
pub fn manifest_contents(sequence: &MergeSequence) -> String {
    let mut contents = String::new();
    for video in sequence.files() {
        let absolute = fs::canonicalize(&video.path).unwrap_or_else(|_| video.path.clone());
        contents.push_str("file ");
        contents.push_str(&quote_manifest_path(&absolute.to_string_lossy()));
        contents.push('\n');
    }
    contents
}

fn write_manifest(sequence: &MergeSequence) -> Result<NamedTempFile, MergeError> {
    let to_error = |source: io::Error| MergeError::OutputWrite {
        path: std::env::temp_dir(),
        source,
    };
    let mut manifest = tempfile::Builder::new()
        .prefix("clip_concat_")
        .suffix(".txt")
        .tempfile()
        .map_err(to_error)?;
    manifest
        .write_all(manifest_contents(sequence).as_bytes())
        .and_then(|_| manifest.flush())
        .map_err(to_error)?;
    Ok(manifest)
}

/// Concatenates `sequence` into `output_directory/output_name` with `tool`.
///
/// The output file is created up front so an unwritable destination fails
/// before the tool starts. If the tool fails, the partial output is removed
/// and the remembered directory is left to the caller to keep unchanged.
/// The manifest is a temporary file deleted on return.
pub fn invoke<T, S>(
    sequence: &MergeSequence,
    output_directory: &Path,
    output_name: &str,
    tool: &T,
    reporter: &mut ProgressReporter<S>,
) -> Result<PathBuf, MergeError>
where
    T: MediaTool + ?Sized,
    S: ProgressSink,
{
    let output_path = output_directory.join(output_name);
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&output_path)
        .map_err(|source| MergeError::OutputWrite {
            path: output_path.clone(),
            source,
        })?;

    let result = write_manifest(sequence).and_then(|manifest| {
        tool.concat(manifest.path(), &output_path, &mut |line: &str| reporter.render(line))
    });
    reporter.finish();

    match result {
        Ok(()) => Ok(output_path),
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&output_path) {
                log::warn!(
                    "Could not remove partial output '{}': {}",
                    output_path.display(),
                    remove_err
                );
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::RefCell;

    /// How a `FakeTool` run should end.
    pub enum FakeOutcome {
        Succeed,
        #[cfg(unix)]
        FailWith(i32, &'static str),
        Missing,
    }

    /// Stands in for ffmpeg: replays canned status lines and writes the inputs' bytes.
    pub struct FakeTool {
        pub lines: Vec<&'static str>,
        pub outcome: FakeOutcome,
        pub manifests: RefCell<Vec<String>>,
    }

    impl FakeTool {
        pub fn new(lines: Vec<&'static str>, outcome: FakeOutcome) -> Self {
            FakeTool {
                lines,
                outcome,
                manifests: RefCell::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.manifests.borrow().len()
        }
    }

    impl MediaTool for FakeTool {
        fn concat(
            &self,
            manifest: &Path,
            output: &Path,
            on_line: &mut dyn FnMut(&str),
        ) -> Result<(), MergeError> {
            let listed = fs::read_to_string(manifest).unwrap();
            self.manifests.borrow_mut().push(listed.clone());
            for line in &self.lines {
                on_line(line);
            }
            match self.outcome {
                FakeOutcome::Succeed => {
                    let mut merged = Vec::new();
                    for entry in listed.lines() {
                        let path = entry
                            .trim_start_matches("file '")
                            .trim_end_matches('\'')
                            .replace(r"'\''", "'");
                        merged.extend(fs::read(path).unwrap());
                    }
                    fs::write(output, merged).unwrap();
                    Ok(())
                }
                #[cfg(unix)]
                FakeOutcome::FailWith(code, diagnostic) => {
                    use std::os::unix::process::ExitStatusExt;
                    fs::write(output, b"partial").unwrap();
                    Err(MergeError::ExternalToolFailed {
                        status: std::process::ExitStatus::from_raw(code << 8),
                        diagnostic: diagnostic.to_string(),
                    })
                }
                FakeOutcome::Missing => Err(MergeError::ExternalToolMissing {
                    program: PathBuf::from("ffmpeg"),
                    source: io::Error::from(io::ErrorKind::NotFound),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{FakeOutcome, FakeTool};
    use super::*;
    use crate::file_utils::test_support::write_video;
    use crate::progress::test_support::RecordingSink;
    use crate::progress::ProgressState;
    use crate::video_entry::{plan, VideoFile};
    use chrono::TimeZone;
    use std::time::Duration;

    fn sequence_in(dir: &Path) -> MergeSequence {
        let second = write_video(dir, "GH020001.MP4", b"second", 20);
        let first = write_video(dir, "GH010001.MP4", b"first-", 10);
        let files = vec![second, first]
            .into_iter()
            .map(|p| {
                let meta = fs::metadata(&p).unwrap();
                VideoFile::new(p, meta.modified().unwrap(), meta.len())
            })
            .collect();
        plan(files)
    }

    fn reporter() -> ProgressReporter<RecordingSink> {
        ProgressReporter::new(
            ProgressState::new(Some(Duration::from_secs(10)), 0),
            RecordingSink::default(),
        )
    }

    #[test]
    fn test_output_file_name() {
        let started = Local.with_ymd_and_hms(2026, 10, 19, 14, 15, 2).unwrap();
        assert_eq!(output_file_name(started), "merged_19_10_2026_141502.mp4");
    }

    #[test]
    fn test_quote_manifest_path() {
        assert_eq!(quote_manifest_path("/v/a.mp4"), "'/v/a.mp4'");
        assert_eq!(quote_manifest_path("/v/it's.mp4"), r"'/v/it'\''s.mp4'");
    }

    #[test]
    fn test_manifest_lists_absolute_paths_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_in(dir.path());
        let contents = manifest_contents(&sequence);
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("file '/") || cfg!(windows));
        assert!(lines[0].ends_with("GH010001.MP4'"));
        assert!(lines[1].ends_with("GH020001.MP4'"));
    }

    #[test]
    fn test_ffmpeg_args_use_stream_copy_concat() {
        let args = Ffmpeg::args(Path::new("/tmp/list.txt"), Path::new("out.mp4"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = args.join(" ");
        assert!(joined.contains("-f concat -safe 0 -i /tmp/list.txt -c copy"));
        assert!(joined.contains("-progress pipe:1"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_invoke_merges_in_order_and_reports_progress() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let sequence = sequence_in(input.path());
        let tool = FakeTool::new(
            vec!["out_time_us=5000000", "garbage", "progress=end"],
            FakeOutcome::Succeed,
        );
        let mut reporter = reporter();

        let merged = invoke(&sequence, output.path(), "merged.mp4", &tool, &mut reporter).unwrap();

        assert_eq!(merged, output.path().join("merged.mp4"));
        assert_eq!(fs::read(&merged).unwrap(), b"first-second");
        assert_eq!(tool.calls(), 1);
        let sink = reporter.into_sink();
        assert_eq!(sink.consumed.len(), 2);
        assert!(sink.finished.unwrap().finished);
    }

    #[test]
    fn test_invoke_existing_output_fails_before_running_tool() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(output.path().join("merged.mp4"), b"keep me").unwrap();
        let tool = FakeTool::new(vec![], FakeOutcome::Succeed);

        let result = invoke(
            &sequence_in(input.path()),
            output.path(),
            "merged.mp4",
            &tool,
            &mut reporter(),
        );

        assert!(matches!(result, Err(MergeError::OutputWrite { .. })));
        assert_eq!(tool.calls(), 0);
        assert_eq!(fs::read(output.path().join("merged.mp4")).unwrap(), b"keep me");
    }

    #[test]
    fn test_invoke_missing_output_directory() {
        let input = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(vec![], FakeOutcome::Succeed);
        let result = invoke(
            &sequence_in(input.path()),
            &input.path().join("nope"),
            "merged.mp4",
            &tool,
            &mut reporter(),
        );
        assert!(matches!(result, Err(MergeError::OutputWrite { .. })));
        assert_eq!(tool.calls(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_invoke_tool_failure_removes_partial_output() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(
            vec!["out_time_us=1000000"],
            FakeOutcome::FailWith(1, "Invalid data found when processing input"),
        );
        let mut reporter = reporter();

        let result = invoke(
            &sequence_in(input.path()),
            output.path(),
            "merged.mp4",
            &tool,
            &mut reporter,
        );

        match result {
            Err(err @ MergeError::ExternalToolFailed { .. }) => {
                assert!(err.to_string().contains("Invalid data found"));
            }
            other => panic!("expected ExternalToolFailed, got {:?}", other),
        }
        assert!(!output.path().join("merged.mp4").exists());
        assert!(reporter.into_sink().finished.is_some());
    }

    #[test]
    fn test_invoke_missing_tool_cleans_up_placeholder() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(vec![], FakeOutcome::Missing);
        let result = invoke(
            &sequence_in(input.path()),
            output.path(),
            "merged.mp4",
            &tool,
            &mut reporter(),
        );
        assert!(matches!(result, Err(MergeError::ExternalToolMissing { .. })));
        assert!(!output.path().join("merged.mp4").exists());
    }

    /// Runs a shell script standing in for ffmpeg. Retries briefly when the
    /// freshly written script is still busy in another test's forked child.
    #[cfg(unix)]
    fn run_script(script: &str) -> (Result<(), MergeError>, Vec<String>) {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fake-ffmpeg");
        fs::write(&program, script).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        let tool = Ffmpeg::new(program);

        for attempt in 0.. {
            let mut lines = Vec::new();
            let result = tool.concat(
                &dir.path().join("list.txt"),
                &dir.path().join("out.mp4"),
                &mut |line: &str| lines.push(line.to_string()),
            );
            match &result {
                Err(MergeError::ExternalToolMissing { source, .. })
                    if source.raw_os_error() == Some(26) && attempt < 20 =>
                {
                    std::thread::sleep(Duration::from_millis(50));
                }
                _ => return (result, lines),
            }
        }
        unreachable!()
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_failure_reports_its_stderr() {
        let (result, lines) = run_script(
            "#!/bin/sh\necho progress=continue\necho 'Conversion failed!' >&2\nexit 1\n",
        );
        match result {
            Err(MergeError::ExternalToolFailed { status, diagnostic }) => {
                assert_eq!(status.code(), Some(1));
                assert!(diagnostic.contains("Conversion failed!"), "{}", diagnostic);
            }
            other => panic!("expected ExternalToolFailed, got {:?}", other),
        }
        assert_eq!(lines, ["progress=continue"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_success_streams_stdout_lines() {
        let (result, lines) = run_script(
            "#!/bin/sh\necho out_time_us=1000000\necho progress=end\nexit 0\n",
        );
        assert!(result.is_ok());
        assert_eq!(lines, ["out_time_us=1000000", "progress=end"]);
    }

    #[test]
    fn test_ffmpeg_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let tool = Ffmpeg::new(dir.path().join("no-such-ffmpeg"));
        let result = tool.concat(&dir.path().join("list.txt"), &output, &mut |_: &str| {});
        match result {
            Err(MergeError::ExternalToolMissing { program, source }) => {
                assert_eq!(program, tool.program());
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected ExternalToolMissing, got {:?}", other),
        }
    }
}
