use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// 执行/同步历史保留条数
pub const LOG_CAPACITY: usize = 100;

/// 写入历史的单条消息上限
pub const MAX_MESSAGE_LEN: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Success,
    Error,
}

/// One recorded outcome of a clone, command or failed file operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 固定容量的环形历史，超出容量时淘汰最旧条目
pub struct LogRingBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

pub type SharedLogs = Arc<LogRingBuffer>;

impl Default for LogRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRingBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// 追加一条记录；追加与淘汰在同一把锁内完成
    pub fn append(&self, kind: LogKind, message: impl Into<String>) {
        let entry = LogEntry {
            kind,
            message: truncate_message(message.into()),
            timestamp: Utc::now(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.append(LogKind::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(LogKind::Error, message);
    }

    /// Entries ordered oldest to newest
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn truncate_message(mut message: String) -> String {
    if message.len() <= MAX_MESSAGE_LEN {
        return message;
    }
    let mut cut = MAX_MESSAGE_LEN;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    message.truncate(cut);
    message.push_str("... [truncated]");
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_most_recent_in_order() {
        let logs = LogRingBuffer::new();
        for i in 0..250 {
            logs.success(format!("entry {}", i));
        }

        let snapshot = logs.snapshot();
        assert_eq!(snapshot.len(), LOG_CAPACITY);
        assert_eq!(snapshot.first().unwrap().message, "entry 150");
        assert_eq!(snapshot.last().unwrap().message, "entry 249");
        for (offset, entry) in snapshot.iter().enumerate() {
            assert_eq!(entry.message, format!("entry {}", 150 + offset));
        }
    }

    #[test]
    fn test_under_capacity_keeps_everything() {
        let logs = LogRingBuffer::new();
        logs.success("cloned");
        logs.error("boom");

        let snapshot = logs.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].kind, LogKind::Success);
        assert_eq!(snapshot[1].kind, LogKind::Error);
        assert!(snapshot[0].timestamp <= snapshot[1].timestamp);
    }

    #[test]
    fn test_concurrent_appends_stay_bounded() {
        let logs = Arc::new(LogRingBuffer::with_capacity(10));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logs = logs.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        logs.success(format!("{}-{}", t, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(logs.len(), 10);
    }

    #[test]
    fn test_long_message_truncated() {
        let logs = LogRingBuffer::new();
        logs.error("é".repeat(MAX_MESSAGE_LEN));
        let entry = &logs.snapshot()[0];
        assert!(entry.message.ends_with("... [truncated]"));
        assert!(entry.message.len() <= MAX_MESSAGE_LEN + "... [truncated]".len());
    }

    #[test]
    fn test_entry_serializes_kind_lowercase() {
        let logs = LogRingBuffer::new();
        logs.success("ok");
        let json = serde_json::to_value(&logs.snapshot()[0]).unwrap();
        assert_eq!(json["kind"], "success");
        assert_eq!(json["message"], "ok");
        assert!(json["timestamp"].is_string());
    }
}
