//! Call-site traces attached to history entries.

use std::backtrace::{Backtrace, BacktraceStatus};

use serde::{Deserialize, Serialize};

/// First words of the trace attached when no backtrace could be captured.
pub const UNAVAILABLE: &str = "Stack not available";

/// Frames from these modules belong to the logging machinery itself.
const INTERNAL_MARKERS: &[&str] = &[
    "atama::history::",
    "std::backtrace",
    "std::backtrace_rs",
    "__rust_begin_short_backtrace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Never capture; attach the placeholder.
    Disabled,
    /// Capture when `RUST_LIB_BACKTRACE`/`RUST_BACKTRACE` allow it.
    #[default]
    Environment,
    /// Always capture regardless of the environment.
    Forced,
}

pub(crate) fn capture(mode: TraceMode) -> Vec<String> {
    let backtrace = match mode {
        TraceMode::Disabled => return unavailable("capture disabled"),
        TraceMode::Environment => Backtrace::capture(),
        TraceMode::Forced => Backtrace::force_capture(),
    };
    match backtrace.status() {
        BacktraceStatus::Captured => clean_trace(Some(&backtrace.to_string()), 0),
        BacktraceStatus::Disabled => unavailable("set RUST_LIB_BACKTRACE=1 to record traces"),
        _ => unavailable("backtraces are not supported on this platform"),
    }
}

fn unavailable(reason: &str) -> Vec<String> {
    vec![format!("{UNAVAILABLE}: {reason}")]
}

/// Turn a raw multi-line trace into one string per frame.
///
/// Drops the first `skip` frames, empty lines, and any frame that belongs to
/// the history machinery. Source locations (`at file:line`) are folded into
/// the frame above them.
///
/// # Example
///
/// ```
/// use atama::history::clean_trace;
///
/// let frames = clean_trace(Some("remove me\nHello\n\nThere!"), 1);
/// assert_eq!(frames, vec!["Hello", "There!"]);
///
/// let frames = clean_trace(None, 0);
/// assert!(frames[0].starts_with("Stack not available"));
/// ```
pub fn clean_trace(raw: Option<&str>, skip: usize) -> Vec<String> {
    let Some(raw) = raw else {
        return unavailable("no trace was provided");
    };
    let mut frames: Vec<String> = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match frames.last_mut() {
            Some(frame) if line.starts_with("at ") => {
                frame.push(' ');
                frame.push_str(line);
            }
            _ => frames.push(line.to_string()),
        }
    }
    frames
        .into_iter()
        .skip(skip)
        .filter(|frame| !INTERNAL_MARKERS.iter().any(|m| frame.contains(m)))
        .collect()
}
