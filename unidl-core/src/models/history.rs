use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub format_id: String,
    pub date: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(title: String, url: String, format_id: String) -> Self {
        let date = Utc::now();
        Self {
            id: date.timestamp_millis(),
            title,
            url,
            format_id,
            date,
        }
    }
}

/// Newest first, one entry per (title, format), at most `limit` entries.
pub fn push_entry(entries: &mut Vec<HistoryEntry>, entry: HistoryEntry, limit: usize) {
    entries.retain(|e| !(e.title == entry.title && e.format_id == entry.format_id));
    entries.insert(0, entry);
    entries.truncate(limit);
}
