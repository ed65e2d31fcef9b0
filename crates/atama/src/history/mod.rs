//! Change history log.
//!
//! An append-only record of what happened to a state tree, kept for
//! debugging and inspection. Every entry carries the dotted key it touched,
//! the value involved, a millisecond timestamp and the call-site trace.
//!
//! The log is bounded: once more than `limit` entries are held, the oldest
//! ones are evicted first. Filters never mutate the source log; they return a
//! new one and can be chained:
//!
//! ```
//! use atama::history::{EventKind, History, NewEntry};
//!
//! let mut log = History::new(Some(100));
//! log.add(NewEntry::new(EventKind::Create, "user").with_value(serde_json::json!({})));
//! log.add(NewEntry::new(EventKind::Update, "user.name"));
//! log.add(NewEntry::new(EventKind::Update, "team.name"));
//!
//! assert_eq!(log.by_type(EventKind::Update).by_key_prefix("user").len(), 1);
//! ```

mod trace;

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use trace::{clean_trace, TraceMode, UNAVAILABLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Read,
    Create,
    Update,
    Delete,
    Listen,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Read => "read",
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Listen => "listen",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub kind: EventKind,
    pub key: String,
    pub value: Option<Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub stack: Vec<String>,
}

/// An entry before it is normalized by [`History::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub kind: EventKind,
    pub key: String,
    pub value: Option<Value>,
    /// Overrides the current time when set.
    pub timestamp: Option<i64>,
}

impl NewEntry {
    pub fn new(kind: EventKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: None,
            timestamp: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    limit: Option<usize>,
    traces: TraceMode,
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl History {
    /// Create an empty log. `None` keeps every entry.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            traces: TraceMode::default(),
        }
    }

    pub fn with_traces(mut self, traces: TraceMode) -> Self {
        self.traces = traces;
        self
    }

    fn derive(&self, entries: VecDeque<HistoryEntry>) -> Self {
        Self {
            entries,
            limit: self.limit,
            traces: self.traces,
        }
    }

    /// Append an entry, stamping it with the time and a cleaned trace, then
    /// evict from the front until the log fits its limit.
    pub fn add(&mut self, entry: NewEntry) -> &mut Self {
        let stack = trace::capture(self.traces);
        self.entries.push_back(HistoryEntry {
            kind: entry.kind,
            key: entry.key,
            value: entry.value,
            timestamp: entry.timestamp.unwrap_or_else(now_millis),
            stack,
        });
        self.evict();
        self
    }

    fn evict(&mut self) {
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
        self.evict();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn filter(&self, mut keep: impl FnMut(&HistoryEntry) -> bool) -> Self {
        self.derive(self.entries.iter().filter(|e| keep(e)).cloned().collect())
    }

    pub fn by_type(&self, kind: EventKind) -> Self {
        self.filter(|e| e.kind == kind)
    }

    /// Entries whose key, cut to as many segments as `key` has, equals `key`.
    pub fn by_key_prefix(&self, key: &str) -> Self {
        self.filter(|e| atama_path::key_has_prefix(&e.key, key))
    }

    /// Entries younger than `window`; `None` keeps everything.
    pub fn recent(&self, window: Option<Duration>) -> Self {
        self.recent_at(now_millis(), window)
    }

    pub fn recent_at(&self, now: i64, window: Option<Duration>) -> Self {
        let Some(window) = window else {
            return self.clone();
        };
        let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        self.filter(|e| now.saturating_sub(e.timestamp) < window)
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::collections::vec_deque::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
