//! 任务目录
//! Fixed catalog of ROI-gated tasks

use crate::roles::Role;

/// 任务证据来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskSubject {
    /// 已标注角色的车辆
    Role(Role),
    /// 行人 (不标注, 按类别判断; 用于安全任务)
    Person,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaskSpec {
    pub key: &'static str,
    pub title: &'static str,
    pub subject: TaskSubject,
    pub roi: &'static str,
}

impl TaskSpec {
    const fn new(key: &'static str, title: &'static str, subject: TaskSubject, roi: &'static str) -> Self {
        Self {
            key,
            title,
            subject,
            roi,
        }
    }
}

pub fn default_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("fueling", "Fueling", TaskSubject::Role(Role::FuelTruck), "fuel"),
        TaskSpec::new("gpu", "GPU connected", TaskSubject::Role(Role::GpuTruck), "nose"),
        TaskSpec::new(
            "baggage",
            "Baggage unloading/loading",
            TaskSubject::Role(Role::BeltLoader),
            "belly",
        ),
        TaskSpec::new("pushback", "Pushback", TaskSubject::Role(Role::PushbackTug), "aircraft"),
        // 安全任务: ACTIVE 表示有人在区域内
        TaskSpec::new(
            "safety_engine_clear",
            "Safety: Engine zone clear",
            TaskSubject::Person,
            "engine",
        ),
        TaskSpec::new(
            "safety_pushback_clear",
            "Safety: Pushback area clear",
            TaskSubject::Person,
            "pushback",
        ),
        TaskSpec::new(
            "safety_airside_presence",
            "Safety: Airside presence",
            TaskSubject::Person,
            "aircraft",
        ),
    ]
}
