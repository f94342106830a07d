/// 地面保障任务 (Ground-service tasks)
///
/// - debounce: 迟滞去抖计数器
/// - catalog:  任务目录 (角色/类别 + ROI)
/// - engine:   ROI门控 + 去抖的任务引擎
pub mod catalog;
pub mod debounce;
pub mod engine;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::event_log::{EventLevel, EventLog};

pub use catalog::{default_tasks, TaskSpec, TaskSubject};
pub use debounce::DebounceCounter;
pub use engine::TaskEngine;

// ========== 任务状态 ==========

/// 任务状态
///
/// 前四个由任务引擎与流程状态机使用; 其余为客流/廊桥检测写入的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotStarted,
    Active,
    Inactive,
    Done,
    Started,
    Ongoing,
    NotConnected,
    Operating,
    Connected,
}

impl TaskStatus {
    /// 流程状态机眼中的"进行中"
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Active
                | TaskStatus::Started
                | TaskStatus::Ongoing
                | TaskStatus::Operating
                | TaskStatus::Connected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Inactive => "INACTIVE",
            TaskStatus::Done => "DONE",
            TaskStatus::Started => "STARTED",
            TaskStatus::Ongoing => "ONGOING",
            TaskStatus::NotConnected => "NOT_CONNECTED",
            TaskStatus::Operating => "OPERATING",
            TaskStatus::Connected => "CONNECTED",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::NotStarted
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ========== 任务记录 ==========

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub since: Option<f64>,
    pub last_seen: Option<f64>,
}

/// 任务记录存储: 首次评估时创建, 运行期间不删除
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct TaskStore {
    records: BTreeMap<String, TaskRecord>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&mut self, key: &str) -> &mut TaskRecord {
        self.records.entry(key.to_string()).or_default()
    }

    pub fn get(&self, key: &str) -> Option<&TaskRecord> {
        self.records.get(key)
    }

    pub fn status(&self, key: &str) -> TaskStatus {
        self.records.get(key).map(|r| r.status).unwrap_or_default()
    }

    /// 写入检测器给出的阶段状态: 状态变化时更新 since 并记录事件
    ///
    /// 已完成(DONE)的任务不会被改回
    pub fn apply_phase(&mut self, key: &str, status: TaskStatus, now_t: f64, log: &mut EventLog) {
        let record = self.ensure(key);
        if record.status != status && record.status != TaskStatus::Done {
            info!(task = key, from = %record.status, to = %status, "阶段变化");
            record.status = status;
            record.since = Some(now_t);
            log.push(EventLevel::Task, now_t, format!("{} => {}", key, status));
        }
        record.last_seen = Some(now_t);
    }

    /// 流程状态机标记完成
    pub fn mark_done(&mut self, key: &str, now_t: f64, log: &mut EventLog) {
        let record = self.ensure(key);
        if record.status == TaskStatus::Done {
            return;
        }
        info!(task = key, t = now_t, "任务完成");
        record.status = TaskStatus::Done;
        record.since = Some(now_t);
        log.push(EventLevel::Task, now_t, format!("{} => {}", key, TaskStatus::Done));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn to_map(&self) -> BTreeMap<String, TaskRecord> {
        self.records.clone()
    }
}
