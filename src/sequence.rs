//! 过站流程状态机
//! Ordered turnaround sequence: prerequisites, deadlines and DONE inference
//!
//! 每帧按顺序执行四步:
//! 1. 记录开始时间, 前置步骤未完成则产生"顺序错误"告警
//! 2. 完成判定: 开始后持续足够久, 然后变为 INACTIVE → DONE
//! 3. 截止检查: 到截止时间仍未开始 → 告警
//! 4. 推进 current_idx (只用于显示"下一步")

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::alerts::{AlertIntent, Severity};
use crate::config::SequenceConfig;
use crate::event_log::EventLog;
use crate::tasks::{TaskStatus, TaskStore};

// ========== 步骤定义 ==========

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SequenceStep {
    pub key: &'static str,
    pub title: &'static str,
    /// 必须在此时间(秒)前开始
    pub deadline: Option<f64>,
    /// 必须先完成的任务
    pub requires: Vec<&'static str>,
}

impl SequenceStep {
    fn new(key: &'static str, title: &'static str, deadline: Option<f64>, requires: &[&'static str]) -> Self {
        Self {
            key,
            title,
            deadline,
            requires: requires.to_vec(),
        }
    }
}

/// 默认过站顺序 (安全任务只产生告警, 不参与排序)
pub fn default_sequence() -> Vec<SequenceStep> {
    vec![
        SequenceStep::new("passenger_deboarding", "Passenger Deboarding", Some(180.0), &[]),
        SequenceStep::new("gpu", "GPU connected", Some(120.0), &[]),
        SequenceStep::new("fueling", "Fueling", None, &["gpu"]),
        SequenceStep::new("baggage", "Baggage unloading/loading", None, &["gpu"]),
        SequenceStep::new("passenger_boarding", "Passenger Boarding", None, &["baggage"]),
        SequenceStep::new(
            "pushback",
            "Pushback",
            None,
            &["fueling", "baggage", "passenger_boarding"],
        ),
    ]
}

// ========== 状态 ==========

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SequenceState {
    pub current_idx: usize,
    pub started_at: BTreeMap<String, f64>,
    pub done_at: BTreeMap<String, f64>,
}

/// 步骤显示标签
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepLabel {
    Done,
    Active,
    Blocked,
    Overdue,
    Waiting,
}

impl StepLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepLabel::Done => "DONE",
            StepLabel::Active => "ACTIVE",
            StepLabel::Blocked => "BLOCKED",
            StepLabel::Overdue => "OVERDUE",
            StepLabel::Waiting => "WAITING",
        }
    }
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 单个步骤的展示视图
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepView {
    pub key: &'static str,
    pub title: &'static str,
    pub label: StepLabel,
    pub hint: String,
    pub requires: Vec<&'static str>,
    pub deadline: Option<f64>,
    pub started_at: Option<f64>,
    pub done_at: Option<f64>,
}

// ========== 状态机 ==========

pub struct SequenceMachine {
    steps: Vec<SequenceStep>,
    state: SequenceState,
    min_active_sec_for_done: f64,
}

impl SequenceMachine {
    pub fn new(config: &SequenceConfig) -> Self {
        Self::with_steps(default_sequence(), config)
    }

    pub fn with_steps(steps: Vec<SequenceStep>, config: &SequenceConfig) -> Self {
        Self {
            steps,
            state: SequenceState::default(),
            min_active_sec_for_done: config.min_active_sec_for_done,
        }
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn state(&self) -> &SequenceState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = SequenceState::default();
    }

    fn is_done(&self, key: &str, store: &TaskStore) -> bool {
        self.state.done_at.contains_key(key) || store.status(key) == TaskStatus::Done
    }

    fn missing_prerequisites(&self, step: &SequenceStep, store: &TaskStore) -> Vec<&'static str> {
        step.requires
            .iter()
            .copied()
            .filter(|k| !self.is_done(k, store))
            .collect()
    }

    pub fn update(&mut self, now_t: f64, store: &mut TaskStore, log: &mut EventLog) -> Vec<AlertIntent> {
        let mut intents = Vec::new();

        // 1) 开始 + 顺序检查
        for step in &self.steps {
            if !store.status(step.key).is_active() || self.state.started_at.contains_key(step.key) {
                continue;
            }
            self.state.started_at.insert(step.key.to_string(), now_t);
            info!(step = step.key, t = now_t, "流程步骤开始");

            let missing = self.missing_prerequisites(step, store);
            if !missing.is_empty() {
                intents.push(AlertIntent::raise(
                    format!("seq_out_of_order_{}", step.key),
                    Severity::Warning,
                    "sequence_order",
                    format!("{} started before prerequisites DONE: {}", step.title, missing.join(", ")),
                ));
            }
        }

        // 2) 完成判定
        for step in &self.steps {
            if self.state.done_at.contains_key(step.key) {
                continue;
            }
            let status = store.status(step.key);
            if status == TaskStatus::Done {
                // 由客流检测直接写入的完成
                self.state.done_at.insert(step.key.to_string(), now_t);
                continue;
            }
            let Some(&started) = self.state.started_at.get(step.key) else {
                continue;
            };
            if status == TaskStatus::Inactive && now_t - started >= self.min_active_sec_for_done {
                store.mark_done(step.key, now_t, log);
                self.state.done_at.insert(step.key.to_string(), now_t);
            }
        }

        // 3) 截止检查
        for step in &self.steps {
            let Some(deadline) = step.deadline else { continue };
            if self.state.started_at.contains_key(step.key) || now_t < deadline {
                continue;
            }
            intents.push(AlertIntent::raise(
                format!("seq_deadline_{}", step.key),
                Severity::Warning,
                "sequence_deadline",
                format!("{} not started by t={:.0}s", step.title, deadline),
            ));
        }

        // 4) 推进指针
        while let Some(step) = self.steps.get(self.state.current_idx) {
            if !self.is_done(step.key, store) {
                break;
            }
            self.state.current_idx += 1;
        }

        intents
    }

    /// 下一个期望的步骤 (全部完成时为 None)
    pub fn next_step(&self) -> Option<&SequenceStep> {
        self.steps.get(self.state.current_idx)
    }

    pub fn step_label(&self, step: &SequenceStep, store: &TaskStore, now_t: f64) -> (StepLabel, String) {
        if self.is_done(step.key, store) {
            return (StepLabel::Done, "completed".to_string());
        }
        if store.status(step.key).is_active() {
            return (StepLabel::Active, "in progress".to_string());
        }
        if !self.missing_prerequisites(step, store).is_empty() {
            return (StepLabel::Blocked, "waiting for prerequisites".to_string());
        }
        if let Some(deadline) = step.deadline {
            if now_t >= deadline && !self.state.started_at.contains_key(step.key) {
                return (StepLabel::Overdue, format!("deadline t={:.0}s", deadline));
            }
        }
        (StepLabel::Waiting, "next in queue".to_string())
    }

    pub fn step_views(&self, store: &TaskStore, now_t: f64) -> Vec<StepView> {
        self.steps
            .iter()
            .map(|step| {
                let (label, hint) = self.step_label(step, store, now_t);
                StepView {
                    key: step.key,
                    title: step.title,
                    label,
                    hint,
                    requires: step.requires.clone(),
                    deadline: step.deadline,
                    started_at: self.state.started_at.get(step.key).copied(),
                    done_at: self.state.done_at.get(step.key).copied(),
                }
            })
            .collect()
    }
}
