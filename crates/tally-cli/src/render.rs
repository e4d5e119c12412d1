use chrono::{DateTime, Local};

use tally_core::history::History;
use tally_core::tracker::Tracker;

pub fn format_millis(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => format!("@{millis}"),
    }
}

fn status(tracker: &Tracker) -> &'static str {
    if tracker.is_archived() {
        "archived"
    } else if tracker.is_completed() {
        "completed"
    } else {
        "in progress"
    }
}

pub fn tracker_line(tracker: &Tracker) -> String {
    format!(
        "{} {}/{} ({}%) [{}]",
        tracker.label,
        tracker.current,
        tracker.target,
        tracker.percent(),
        status(tracker)
    )
}

pub fn tracker_detail(tracker: &Tracker) -> String {
    let mut out = vec![
        tracker_line(tracker),
        format!("id: {}", tracker.id),
        format!("started: {}", format_millis(tracker.created_at)),
    ];
    if let Some(at) = tracker.completed_at {
        out.push(format!("completed: {}", format_millis(at)));
    }
    if let Some(at) = tracker.archived_at {
        out.push(format!("archived: {}", format_millis(at)));
    }
    if !tracker.is_completed() && !tracker.is_archived() {
        out.push(format!("remaining: {}", tracker.remaining()));
    }
    out.push("log:".to_string());
    for entry in &tracker.logs {
        out.push(format!(
            "  {} {:<9} {}",
            format_millis(entry.timestamp),
            entry.action,
            entry.detail
        ));
    }
    out.join("\n")
}

pub fn history_lines(history: &History) -> String {
    if history.is_empty() {
        return "History is empty.".to_string();
    }
    let mut lines = Vec::with_capacity(history.len());
    for tracker in history {
        let archived = tracker
            .archived_at
            .map(format_millis)
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!("{}  {}  {}", tracker.id, archived, tracker_line(tracker)));
    }
    lines.join("\n")
}
