//! Process-wide log of captured failures.
//!
//! Records are keyed by capture time in milliseconds. Two captures within
//! the same millisecond collapse into one record (the later one wins); the
//! log is never pruned while the process runs.

use parking_lot::RwLock;
use serde::Serialize;
use std::any::{type_name, Any};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::platform::{UiCommand, UiDispatcher};

/// Kind reported for causes reached through `Error::source`, whose concrete
/// type is erased behind a trait object.
pub const OPAQUE_CAUSE: &str = "dyn std::error::Error";

/// Kind reported for a caught panic.
pub const PANIC_KIND: &str = "panic";

/// A captured failure: its kind, message, cause chain and stack frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Fully-qualified type name of the failure.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message, if the failure carried one.
    pub message: Option<String>,
    /// The failure that caused this one.
    pub cause: Option<Box<Failure>>,
    /// Stack frames at capture time (empty unless backtraces are enabled).
    #[serde(rename = "stacktrace")]
    pub stack_frames: Vec<String>,
}

impl Failure {
    /// Creates a failure of the given kind with a message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: non_empty(message.into()),
            cause: None,
            stack_frames: capture_frames(),
        }
    }

    /// Captures a typed error together with its `source()` chain.
    pub fn from_error<E: StdError + 'static>(error: &E) -> Self {
        Self {
            kind: type_name::<E>().to_string(),
            message: non_empty(error.to_string()),
            cause: error.source().map(|source| Box::new(Self::from_source(source))),
            stack_frames: capture_frames(),
        }
    }

    /// Captures the payload of a caught panic.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            Some((*s).to_string())
        } else {
            payload.downcast_ref::<String>().cloned()
        };

        Self {
            kind: PANIC_KIND.to_string(),
            message,
            cause: None,
            stack_frames: capture_frames(),
        }
    }

    /// Attaches a cause to this failure.
    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    fn from_source(error: &(dyn StdError + 'static)) -> Self {
        Self {
            kind: OPAQUE_CAUSE.to_string(),
            message: non_empty(error.to_string()),
            cause: error.source().map(|source| Box::new(Self::from_source(source))),
            stack_frames: Vec::new(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => f.write_str(&self.kind),
        }
    }
}

/// A failure as exposed by [`ErrorLog::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Capture time, milliseconds since the Unix epoch.
    pub time: u64,
    #[serde(flatten)]
    pub failure: Failure,
}

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

/// Store of captured failures, safe to share across request tasks.
pub struct ErrorLog {
    records: RwLock<BTreeMap<u64, Failure>>,
    clock: Clock,
}

impl ErrorLog {
    /// Creates an empty log keyed by wall-clock milliseconds.
    pub fn new() -> Self {
        Self::with_clock(wall_clock_millis)
    }

    /// Creates an empty log with a custom millisecond clock.
    pub fn with_clock(clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            clock: Box::new(clock),
        }
    }

    /// Records a failure. Never fails and never touches the UI.
    pub fn record(&self, failure: Failure) {
        let time = (self.clock)();
        tracing::error!(
            time,
            kind = %failure.kind,
            detail = failure.message.as_deref().unwrap_or_default(),
            "Failure captured"
        );

        if self.records.write().insert(time, failure).is_some() {
            tracing::warn!(time, "Failure replaced an earlier capture from the same millisecond");
        }
    }

    /// Records a typed error.
    pub fn record_error<E: StdError + 'static>(&self, error: &E) {
        self.record(Failure::from_error(error));
    }

    /// Snapshot of all records, oldest first.
    pub fn list(&self) -> Vec<ErrorRecord> {
        self.records
            .read()
            .iter()
            .map(|(time, failure)| ErrorRecord {
                time: *time,
                failure: failure.clone(),
            })
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Asks the UI to show the diagnostic page.
    ///
    /// A dispatch failure is only logged: recording it here could loop if
    /// the diagnostic page itself cannot be shown.
    pub fn notify_ui(&self, dispatcher: &dyn UiDispatcher) {
        if let Err(e) = dispatcher.dispatch(UiCommand::ShowErrors) {
            tracing::warn!(error = %e, "Could not show the diagnostic page");
        }
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorLog")
            .field("records", &self.len())
            .finish()
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn capture_frames() -> Vec<String> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }

    backtrace
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(message: String) -> Option<String> {
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}
