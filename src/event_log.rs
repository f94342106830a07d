//! 事件日志 (只追加, 有上限)
//! Operator-facing event log; every entry is mirrored to `tracing`

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Task,
    Alert,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventLevel::Info => "info",
            EventLevel::Task => "task",
            EventLevel::Alert => "alert",
        };
        f.pad(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLogItem {
    pub t_sec: f64,
    pub level: EventLevel,
    pub msg: String,
}

pub struct EventLog {
    items: VecDeque<EventLogItem>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, level: EventLevel, t_sec: f64, msg: impl Into<String>) {
        let msg = msg.into();
        info!(target: "turnaround::events", t = t_sec, %level, "{}", msg);
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(EventLogItem { t_sec, level, msg });
    }

    /// 最近 n 条, 按时间先后
    pub fn recent(&self, n: usize) -> Vec<EventLogItem> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventLogItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_keeps_most_recent() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.push(EventLevel::Task, i as f64, format!("event {}", i));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].msg, "event 3");
        assert_eq!(recent[1].msg, "event 4");
        assert_eq!(log.recent(10).len(), 3);
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let item = EventLogItem {
            t_sec: 1.0,
            level: EventLevel::Alert,
            msg: "x".into(),
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"level\":\"alert\""));
    }
}
