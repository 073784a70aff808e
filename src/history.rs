//! Bounded log of frames exchanged with the hub, for diagnostics.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction of a message in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Request written to the hub.
    Send,
    /// Reply to one of our requests.
    Receive,
    /// Unsolicited state change.
    Push,
}

/// A recorded message in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub msg_type: MessageType,
    /// Wire `type` of the message
    pub kind: String,
    pub message: Value,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// The most recent messages, oldest first, plus the last error seen.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    last_error: Option<String>,
    started: Instant,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }
}

impl MessageHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        MessageHistory {
            entries: VecDeque::with_capacity(max_entries.min(Self::DEFAULT_MAX_ENTRIES)),
            max_entries,
            last_error: None,
            started: Instant::now(),
        }
    }

    /// Record a message, evicting the oldest once full.
    ///
    /// Messages without a string `type` field are ignored.
    pub fn record(&mut self, msg_type: MessageType, message: &Value) {
        let Some(kind) = message.get("type").and_then(Value::as_str) else {
            return;
        };
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        if self.max_entries > 0 {
            self.entries.push_back(HistoryEntry {
                msg_type,
                kind: kind.to_string(),
                message: message.clone(),
                timestamp: self.started.elapsed().as_secs_f64(),
            });
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    /// Most recent retained message of the given direction and wire type.
    pub fn last(&self, msg_type: MessageType, kind: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.msg_type == msg_type && e.kind == kind)
            .map(|e| &e.message)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        let mut summary = HistorySummary {
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
            ..HistorySummary::default()
        };
        for entry in &self.entries {
            match entry.msg_type {
                MessageType::Send => summary.send_count += 1,
                MessageType::Receive => summary.receive_count += 1,
                MessageType::Push => summary.push_count += 1,
            }
        }
        summary
    }
}

/// Per-direction counts over the retained entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistorySummary {
    pub send_count: usize,
    pub receive_count: usize,
    pub push_count: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_message() {
        let mut history = MessageHistory::new();
        history.record(
            MessageType::Send,
            &json!({"type": "DEVICE_LIST", "dst": "deako", "src": "test"}),
        );

        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].kind, "DEVICE_LIST");
        assert!(history.last(MessageType::Send, "DEVICE_LIST").is_some());
        assert!(history.last(MessageType::Push, "DEVICE_LIST").is_none());
    }

    #[test]
    fn test_untyped_message_ignored() {
        let mut history = MessageHistory::new();
        history.record(MessageType::Receive, &json!({"status": "ok"}));
        assert!(history.is_empty());
    }

    #[test]
    fn test_record_error() {
        let mut history = MessageHistory::new();
        history.record_error("Connection reset");
        assert_eq!(history.last_error(), Some("Connection reset"));
        history.clear();
        assert_eq!(history.last_error(), None);
    }

    #[test]
    fn test_oldest_entries_evicted() {
        let mut history = MessageHistory::with_max_entries(2);
        history.record(MessageType::Send, &json!({"type": "DEVICE_LIST"}));
        for i in 0..5 {
            history.record(
                MessageType::Push,
                &json!({"type": "EVENT", "uuid": format!("dev{}", i)}),
            );
        }

        let summary = history.summary();
        assert_eq!(summary.total_entries, 2);
        assert_eq!(summary.push_count, 2);
        assert_eq!(summary.send_count, 0);
        assert!(history.last(MessageType::Send, "DEVICE_LIST").is_none());
        assert_eq!(history.last(MessageType::Push, "EVENT").unwrap()["uuid"], "dev4");
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = MessageHistory::with_max_entries(0);
        history.record(MessageType::Push, &json!({"type": "EVENT"}));
        assert!(history.is_empty());
    }
}
