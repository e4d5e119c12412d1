use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, IdGenerator};

pub const PLACEHOLDER_LABEL: &str = "Untitled goal";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Created,
    Increment,
    Decrement,
    Completed,
    Archived,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Created => "created",
            LogAction::Increment => "increment",
            LogAction::Decrement => "decrement",
            LogAction::Completed => "completed",
            LogAction::Archived => "archived",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub action: LogAction,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    pub id: String,
    pub label: String,
    pub target: i64,
    pub current: i64,
    pub created_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub archived_at: Option<i64>,
    /// Oldest first. Entries are only ever appended.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl Tracker {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn can_increment(&self) -> bool {
        !self.is_archived() && self.current < self.target
    }

    pub fn can_decrement(&self) -> bool {
        !self.is_archived() && self.current > 0
    }

    pub fn remaining(&self) -> i64 {
        self.target.saturating_sub(self.current).max(0)
    }

    /// Whole-number progress, clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        if self.target <= 0 {
            return 0;
        }
        let ratio = (self.current.max(0) as i128 * 100) / self.target as i128;
        ratio.clamp(0, 100) as u8
    }

    pub fn last_log(&self) -> Option<&LogEntry> {
        self.logs.last()
    }
}

/// Reads the leading integer of `input`: whitespace, an optional sign, then
/// digits. Anything after the digits is ignored (`"20 reps"` is 20).
/// Returns `None` unless the result is at least 1.
pub fn parse_target(input: &str) -> Option<i64> {
    static LEADING_INT: OnceLock<Regex> = OnceLock::new();
    let re = LEADING_INT.get_or_init(|| Regex::new(r"^\s*([+-]?\d+)").expect("regex"));
    let digits = re.captures(input)?.get(1)?.as_str();
    let value = digits.parse::<i64>().ok()?;
    (value >= 1).then_some(value)
}

pub fn resolve_label(label: &str) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Applies state transitions to trackers. Every operation returns a new
/// value and leaves its input untouched; `None` means the call was a no-op.
#[derive(Debug)]
pub struct TrackerEngine<C, G> {
    clock: C,
    ids: G,
}

impl<C: Clock, G: IdGenerator> TrackerEngine<C, G> {
    pub fn new(clock: C, ids: G) -> Self {
        Self { clock, ids }
    }

    fn entry(&self, timestamp: i64, action: LogAction, detail: String) -> LogEntry {
        LogEntry {
            id: self.ids.next_id(),
            timestamp,
            action,
            detail,
        }
    }

    pub fn create(&self, label: &str, target_input: &str) -> Option<Tracker> {
        let Some(target) = parse_target(target_input) else {
            debug!(input = target_input, "create ignored: target is not a whole number >= 1");
            return None;
        };
        let label = resolve_label(label);
        let now = self.clock.now_millis();
        let created = self.entry(
            now,
            LogAction::Created,
            format!("Started \"{label}\" with a target of {target}"),
        );
        let tracker = Tracker {
            id: self.ids.next_id(),
            label,
            target,
            current: 0,
            created_at: now,
            completed_at: None,
            archived_at: None,
            logs: vec![created],
        };
        debug!(tracker = %tracker.id, target, "tracker created");
        Some(tracker)
    }

    pub fn increment(&self, tracker: &Tracker) -> Option<Tracker> {
        if !tracker.can_increment() {
            return None;
        }
        let now = self.clock.now_millis();
        let current = tracker.current + 1;
        let mut logs = tracker.logs.clone();
        logs.push(self.entry(
            now,
            LogAction::Increment,
            format!("Progress {}/{}", current, tracker.target),
        ));
        let mut completed_at = tracker.completed_at;
        if current == tracker.target {
            completed_at = Some(now);
            logs.push(self.entry(
                now,
                LogAction::Completed,
                format!("Reached target of {}", tracker.target),
            ));
            debug!(tracker = %tracker.id, "tracker completed");
        }
        Some(Tracker {
            current,
            completed_at,
            logs,
            ..tracker.clone()
        })
    }

    pub fn decrement(&self, tracker: &Tracker) -> Option<Tracker> {
        if !tracker.can_decrement() {
            return None;
        }
        let now = self.clock.now_millis();
        let current = tracker.current - 1;
        let mut logs = tracker.logs.clone();
        logs.push(self.entry(
            now,
            LogAction::Decrement,
            format!("Stepped back to {}/{}", current, tracker.target),
        ));
        let completed_at = if current < tracker.target {
            None
        } else {
            tracker.completed_at
        };
        Some(Tracker {
            current,
            completed_at,
            logs,
            ..tracker.clone()
        })
    }

    /// Stamps the tracker as archived. Callers must only pass the active
    /// tracker; handing it to the history is the caller's job. A tracker
    /// that already carries `archivedAt` comes back unchanged.
    pub fn archive(&self, tracker: &Tracker) -> Tracker {
        if tracker.is_archived() {
            debug!(tracker = %tracker.id, "already archived; keeping original stamp");
            return tracker.clone();
        }
        let now = self.clock.now_millis();
        let mut logs = tracker.logs.clone();
        logs.push(self.entry(
            now,
            LogAction::Archived,
            format!("Archived at {}/{}", tracker.current, tracker.target),
        ));
        Tracker {
            archived_at: Some(now),
            logs,
            ..tracker.clone()
        }
    }
}
