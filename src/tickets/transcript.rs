//! Captured ticket messages and their plain-text rendering.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::channels::ChannelId;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub author_tag: String,
    pub content: String,
    pub attachments: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHeader {
    pub channel_name: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub closed_by: String,
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn artifact_name(channel_name: &str) -> String {
    format!("transcript-{channel_name}.txt")
}

pub fn render(header: &TranscriptHeader, entries: &[TranscriptEntry]) -> String {
    let mut out = String::from("=== TICKET TRANSCRIPT ===\n\n");
    out.push_str(&format!("Channel: {}\n", header.channel_name));
    out.push_str(&format!("Opened at: {}\n", format_timestamp(&header.opened_at)));
    out.push_str(&format!("Closed at: {}\n", format_timestamp(&header.closed_at)));
    out.push_str(&format!("Closed by: {}\n\n", header.closed_by));
    out.push_str("=== MESSAGES ===\n");

    for entry in entries {
        out.push('\n');
        out.push_str(&format!(
            "[{}] {}: {}\n",
            format_timestamp(&entry.captured_at),
            entry.author_tag,
            entry.content
        ));
        if !entry.attachments.is_empty() {
            out.push_str(&format!("  Attachments: {}\n", entry.attachments.join(", ")));
        }
    }

    out
}

/// Append-only message logs for the tickets that are currently open.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    logs: RwLock<HashMap<ChannelId, Vec<TranscriptEntry>>>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an empty log. Opening an already open key keeps its entries.
    pub async fn open(&self, key: &ChannelId) {
        self.logs.write().await.entry(key.clone()).or_default();
    }

    /// Returns false when the key has no open log.
    pub async fn append(&self, key: &ChannelId, entry: TranscriptEntry) -> bool {
        match self.logs.write().await.get_mut(key) {
            Some(log) => {
                log.push(entry);
                true
            }
            None => false,
        }
    }

    pub async fn is_open(&self, key: &ChannelId) -> bool {
        self.logs.read().await.contains_key(key)
    }

    pub async fn entries(&self, key: &ChannelId) -> Option<Vec<TranscriptEntry>> {
        self.logs.read().await.get(key).cloned()
    }

    /// Renders and removes the log in one step; only the first caller gets the text.
    pub async fn render_and_close(
        &self,
        key: &ChannelId,
        header: &TranscriptHeader,
    ) -> Option<String> {
        let entries = self.logs.write().await.remove(key)?;
        debug!("Rendering transcript for {key} ({} entries)", entries.len());
        Some(render(header, &entries))
    }

    /// Drops a log without rendering it.
    pub async fn discard(&self, key: &ChannelId) -> bool {
        self.logs.write().await.remove(key).is_some()
    }

    pub async fn open_count(&self) -> usize {
        self.logs.read().await.len()
    }
}
