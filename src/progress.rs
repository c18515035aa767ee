// src/progress.rs

use crate::config::PROGRESS_BAR_TICKS;
use dialoguer::console::Term;
use indicatif::{
    FormattedDuration, HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle,
};
use std::{
    io::{self, Write},
    time::Duration,
};

/// One piece of information recognized in a line of ffmpeg status output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusUpdate {
    /// Media time written to the output so far.
    Elapsed(Duration),
    /// Bytes written to the output so far.
    BytesWritten(u64),
    /// ffmpeg reported `progress=end`.
    Ended,
}

/// Parses `HH:MM:SS[.fraction]` into a duration.
/// Negative, malformed or out-of-range values yield `None`.
pub fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    let whole = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?;
    let fraction = Duration::try_from_secs_f64(seconds).ok()?;
    Duration::from_secs(whole).checked_add(fraction)
}

/// Parses a stats-line size such as `1024kB`, `2048KiB` or `512B`.
fn parse_size(value: &str) -> Option<u64> {
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(digits_end);
    let number: u64 = number.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        "" | "b" => Some(number),
        "kb" | "kib" => number.checked_mul(1024),
        "mb" | "mib" => number.checked_mul(1024 * 1024),
        _ => None,
    }
}

fn parse_pair(key: &str, value: &str) -> Option<StatusUpdate> {
    match key {
        // ffmpeg emits microseconds under both keys.
        "out_time_us" | "out_time_ms" => value
            .parse::<u64>()
            .ok()
            .map(|us| StatusUpdate::Elapsed(Duration::from_micros(us))),
        "out_time" | "time" => parse_timestamp(value).map(StatusUpdate::Elapsed),
        "total_size" => value.parse::<u64>().ok().map(StatusUpdate::BytesWritten),
        "size" | "Lsize" => parse_size(value).map(StatusUpdate::BytesWritten),
        "progress" if value == "end" => Some(StatusUpdate::Ended),
        _ => None,
    }
}

/// Extracts every recognized token from one line of ffmpeg output.
///
/// Handles both the `-progress` form (`key=value`, one per line) and the
/// classic stats line (`frame=  42 fps=0.0 size=  1024kB time=00:00:01.23 ...`),
/// where ffmpeg pads values with spaces after the `=`.
/// Anything unrecognized is dropped.
pub fn parse_status_line(line: &str) -> Vec<StatusUpdate> {
    let mut updates = Vec::new();
    let mut tokens = line.split_whitespace();

    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let value = if value.is_empty() {
            match tokens.next() {
                Some(v) => v,
                None => break,
            }
        } else {
            value
        };
        if let Some(update) = parse_pair(key, value) {
            updates.push(update);
        }
    }
    updates
}

/// Counters for one merge, derived from the tool's status stream.
#[derive(Debug, Clone)]
pub struct ProgressState {
    expected_duration: Option<Duration>,
    expected_bytes: u64,
    elapsed: Duration,
    bytes_written: u64,
    finished: bool,
}

/// What a sink gets to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion in `[0, 1]`, if there is anything to measure against.
    pub fraction: Option<f64>,
    pub elapsed: Duration,
    pub expected_duration: Option<Duration>,
    pub bytes_written: u64,
    pub expected_bytes: u64,
    pub finished: bool,
}

impl ProgressState {
    pub fn new(expected_duration: Option<Duration>, expected_bytes: u64) -> Self {
        ProgressState {
            expected_duration: expected_duration.filter(|d| !d.is_zero()),
            expected_bytes,
            elapsed: Duration::ZERO,
            bytes_written: 0,
            finished: false,
        }
    }

    pub fn apply(&mut self, update: StatusUpdate) {
        match update {
            StatusUpdate::Elapsed(elapsed) => self.elapsed = elapsed,
            StatusUpdate::BytesWritten(bytes) => self.bytes_written = bytes,
            StatusUpdate::Ended => self.finished = true,
        }
    }

    /// Media time is preferred; byte counts are the fallback when ffprobe couldn't read the durations.
    pub fn fraction(&self) -> Option<f64> {
        if self.finished {
            return Some(1.0);
        }
        let raw = match self.expected_duration {
            Some(total) => self.elapsed.as_secs_f64() / total.as_secs_f64(),
            None if self.expected_bytes > 0 => {
                self.bytes_written as f64 / self.expected_bytes as f64
            }
            None => return None,
        };
        Some(raw.clamp(0.0, 1.0))
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            fraction: self.fraction(),
            elapsed: self.elapsed,
            expected_duration: self.expected_duration,
            bytes_written: self.bytes_written,
            expected_bytes: self.expected_bytes,
            finished: self.finished,
        }
    }
}

/// Something that displays progress updates.
pub trait ProgressSink {
    /// Called whenever a status line changed the progress state.
    fn consume(&mut self, snapshot: &ProgressSnapshot);

    /// Called once after the tool exits, whatever the outcome.
    fn finish(&mut self, _snapshot: &ProgressSnapshot) {}
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn consume(&mut self, snapshot: &ProgressSnapshot) {
        (**self).consume(snapshot)
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        (**self).finish(snapshot)
    }
}

/// Feeds status lines into a `ProgressState` and forwards changes to a sink.
pub struct ProgressReporter<S: ProgressSink> {
    state: ProgressState,
    sink: S,
}

impl<S: ProgressSink> ProgressReporter<S> {
    pub fn new(state: ProgressState, sink: S) -> Self {
        ProgressReporter { state, sink }
    }

    /// Handles one line of tool output. Lines without known tokens are ignored.
    pub fn render(&mut self, line: &str) {
        let updates = parse_status_line(line);
        if updates.is_empty() {
            return;
        }
        for update in updates {
            self.state.apply(update);
        }
        self.sink.consume(&self.state.snapshot());
    }

    pub fn finish(&mut self) {
        self.sink.finish(&self.state.snapshot());
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// The line `PlainSink` prints for one update.
pub fn describe(snapshot: &ProgressSnapshot) -> String {
    match snapshot.fraction {
        Some(fraction) => format!(
            "{:6.2}%  {} of {}",
            fraction * 100.0,
            HumanBytes(snapshot.bytes_written),
            HumanBytes(snapshot.expected_bytes)
        ),
        None => format!(
            "{} of video merged, {} written",
            FormattedDuration(snapshot.elapsed),
            HumanBytes(snapshot.bytes_written)
        ),
    }
}

fn duration_units(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Redraws an `indicatif` bar in place. Its unit is microseconds of media
/// time when ffprobe read every input's duration, bytes otherwise.
pub struct TerminalSink {
    bar: ProgressBar,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        let template = format!(
            "[{{elapsed_precise}}] [{{bar:{}.cyan/blue}}] {{percent:>3}}%  {{msg}}  ETA:{{eta_precise}}",
            PROGRESS_BAR_TICKS
        );
        bar.set_style(
            ProgressStyle::with_template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        TerminalSink { bar }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalSink {
    fn consume(&mut self, snapshot: &ProgressSnapshot) {
        let (length, position) = match snapshot.expected_duration {
            Some(total) => (duration_units(total), duration_units(snapshot.elapsed)),
            None => (snapshot.expected_bytes, snapshot.bytes_written),
        };
        if length > 0 && self.bar.length() != Some(length) {
            self.bar.set_length(length);
        }
        self.bar.set_position(position.min(length));
        self.bar.set_message(format!(
            "{} / {}",
            HumanBytes(snapshot.bytes_written),
            HumanBytes(snapshot.expected_bytes)
        ));
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        if snapshot.finished {
            if let Some(length) = self.bar.length() {
                self.bar.set_position(length);
            }
            self.bar.finish();
        } else {
            self.bar.finish_and_clear();
        }
    }
}

/// Writes a new line only when the whole percentage (or whole second of
/// media time, when no total is known) changes. Suited for logs and pipes.
pub struct PlainSink<W: Write> {
    out: W,
    last_key: Option<u64>,
}

impl<W: Write> PlainSink<W> {
    pub fn new(out: W) -> Self {
        PlainSink {
            out,
            last_key: None,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for PlainSink<W> {
    fn consume(&mut self, snapshot: &ProgressSnapshot) {
        let key = match snapshot.fraction {
            Some(fraction) => (fraction * 100.0).floor() as u64,
            None => snapshot.elapsed.as_secs(),
        };
        if self.last_key == Some(key) {
            return;
        }
        self.last_key = Some(key);
        let _ = writeln!(self.out, "{}", describe(snapshot));
    }

    fn finish(&mut self, _snapshot: &ProgressSnapshot) {
        let _ = self.out.flush();
    }
}

/// Picks the in-place bar when stderr is a terminal, unless `force_plain` is set.
pub fn select_sink(force_plain: bool) -> Box<dyn ProgressSink> {
    if !force_plain && Term::stderr().is_term() {
        Box::new(TerminalSink::new())
    } else {
        Box::new(PlainSink::new(io::stderr()))
    }
}
