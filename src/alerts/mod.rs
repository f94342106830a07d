/// 告警引擎 (Alert engine)
///
/// 按 id 去重; OPEN 期间严重度只升不降; 关闭不删除历史
pub mod safety;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event_log::{EventLevel, EventLog};

pub use safety::{default_safety_rules, evaluate_safety, SafetyRule};

// ========== 严重度 ==========

/// 排序: INFO < WARNING < CRITICAL
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    pub id: String,
    pub severity: Severity,
    pub rule_id: String,
    pub message: String,
    pub first_seen: f64,
    pub last_seen: f64,
    pub status: AlertStatus,
}

impl AlertItem {
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

/// 规则/状态机产生的告警意图, 由调用方交给告警引擎
#[derive(Clone, Debug, PartialEq)]
pub enum AlertIntent {
    Raise {
        id: String,
        severity: Severity,
        rule_id: String,
        message: String,
    },
    Clear {
        id: String,
    },
}

impl AlertIntent {
    pub fn raise(
        id: impl Into<String>,
        severity: Severity,
        rule_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AlertIntent::Raise {
            id: id.into(),
            severity,
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }

    pub fn clear(id: impl Into<String>) -> Self {
        AlertIntent::Clear { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            AlertIntent::Raise { id, .. } | AlertIntent::Clear { id } => id,
        }
    }
}

/// 告警表的一行 (t_first, t_last, severity, rule, message, id)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertRow {
    pub t_first: f64,
    pub t_last: f64,
    pub severity: Severity,
    pub rule: String,
    pub message: String,
    pub id: String,
}

// ========== 告警引擎 ==========

/// 历史条目上限 (告警反复开关时丢弃最旧的)
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

pub struct AlertEngine {
    /// id → 当前条目 (OPEN 或最近一次 CLOSED)
    alerts: BTreeMap<String, AlertItem>,
    /// 被重新打开而替换掉的已关闭条目
    history: VecDeque<AlertItem>,
    history_capacity: usize,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            alerts: BTreeMap::new(),
            history: VecDeque::new(),
            history_capacity,
        }
    }

    pub fn upsert(
        &mut self,
        id: &str,
        severity: Severity,
        rule_id: &str,
        message: &str,
        now_t: f64,
        log: &mut EventLog,
    ) {
        if let Some(item) = self.alerts.get_mut(id) {
            if item.is_open() {
                item.last_seen = now_t;
                if severity > item.severity {
                    warn!(id, from = %item.severity, to = %severity, "⬆️ 告警升级");
                    item.severity = severity;
                    item.message = message.to_string();
                }
                return;
            }
        }

        if let Some(closed) = self.alerts.remove(id) {
            if self.history_capacity > 0 {
                if self.history.len() >= self.history_capacity {
                    self.history.pop_front();
                }
                self.history.push_back(closed);
            }
        }
        info!(id, %severity, rule_id, "🚨 新告警");
        self.alerts.insert(
            id.to_string(),
            AlertItem {
                id: id.to_string(),
                severity,
                rule_id: rule_id.to_string(),
                message: message.to_string(),
                first_seen: now_t,
                last_seen: now_t,
                status: AlertStatus::Open,
            },
        );
        log.push(EventLevel::Alert, now_t, format!("[{}] {}", severity, message));
    }

    /// 关闭告警; 不存在或已关闭时无操作
    pub fn close(&mut self, id: &str, now_t: f64) {
        match self.alerts.get_mut(id) {
            Some(item) if item.is_open() => {
                info!(id, t = now_t, "✅ 告警关闭");
                item.status = AlertStatus::Closed;
            }
            _ => debug!(id, "关闭: 无打开的告警"),
        }
    }

    pub fn apply(&mut self, intents: &[AlertIntent], now_t: f64, log: &mut EventLog) {
        for intent in intents {
            match intent {
                AlertIntent::Raise {
                    id,
                    severity,
                    rule_id,
                    message,
                } => self.upsert(id, *severity, rule_id, message, now_t, log),
                AlertIntent::Clear { id } => self.close(id, now_t),
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&AlertItem> {
        self.alerts.get(id)
    }

    /// 打开的告警: 严重度降序, 再按 last_seen 降序
    pub fn open_alerts(&self) -> Vec<&AlertItem> {
        let mut open: Vec<&AlertItem> = self.alerts.values().filter(|a| a.is_open()).collect();
        open.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.last_seen.total_cmp(&a.last_seen))
        });
        open
    }

    /// 当前条目 + 历史条目
    pub fn all(&self) -> Vec<AlertItem> {
        self.history
            .iter()
            .chain(self.alerts.values())
            .cloned()
            .collect()
    }

    pub fn history(&self) -> impl Iterator<Item = &AlertItem> {
        self.history.iter()
    }

    pub fn table(&self) -> Vec<AlertRow> {
        self.open_alerts()
            .into_iter()
            .map(|a| AlertRow {
                t_first: a.first_seen,
                t_last: a.last_seen,
                severity: a.severity,
                rule: a.rule_id.clone(),
                message: a.message.clone(),
                id: a.id.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
        self.history.clear();
    }
}
