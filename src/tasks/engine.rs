//! ROI门控 + 去抖的任务引擎
//!
//! 每个任务: "是否有符合角色/类别的目标中心点落在指定ROI内" → 去抖 → 状态转换

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::catalog::{default_tasks, TaskSpec, TaskSubject};
use super::debounce::DebounceCounter;
use super::{TaskStatus, TaskStore};
use crate::config::DebounceConfig;
use crate::detection::{RoiSet, TrackedDetection};
use crate::event_log::{EventLevel, EventLog};
use crate::roles::RoleAssignment;

pub struct TaskEngine {
    tasks: Vec<TaskSpec>,
    counters: BTreeMap<&'static str, DebounceCounter>,
    on_n: u32,
    off_n: u32,
    person_class: String,
}

impl TaskEngine {
    pub fn new(debounce: &DebounceConfig, person_class: &str) -> Self {
        Self::with_tasks(default_tasks(), debounce, person_class)
    }

    pub fn with_tasks(tasks: Vec<TaskSpec>, debounce: &DebounceConfig, person_class: &str) -> Self {
        Self {
            tasks,
            counters: BTreeMap::new(),
            on_n: debounce.on_n,
            off_n: debounce.off_n,
            person_class: person_class.to_string(),
        }
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn counter(&self, key: &str) -> Option<&DebounceCounter> {
        self.counters.get(key)
    }

    /// 清空去抖计数器
    pub fn reset(&mut self) {
        self.counters.clear();
    }

    /// 原始观测: ROI 缺失时为 false
    pub fn raw_signal(
        &self,
        spec: &TaskSpec,
        tracked: &[TrackedDetection],
        rois: &RoiSet,
        roles: &RoleAssignment,
    ) -> bool {
        let Some(roi) = rois.get(spec.roi) else {
            return false;
        };
        tracked.iter().any(|det| {
            let subject_ok = match spec.subject {
                TaskSubject::Person => det.is_class(&self.person_class),
                TaskSubject::Role(role) => roles.role_of(det.track_id) == role,
            };
            subject_ok && roi.contains_center(&det.bbox)
        })
    }

    pub fn evaluate(
        &mut self,
        tracked: &[TrackedDetection],
        rois: &RoiSet,
        roles: &RoleAssignment,
        now_t: f64,
        store: &mut TaskStore,
        log: &mut EventLog,
    ) {
        for spec in &self.tasks {
            let raw = self.raw_signal(spec, tracked, rois, roles);
            let counter = self.counters.entry(spec.key).or_default();
            let stable = counter.observe(raw, self.on_n, self.off_n);
            let record = store.ensure(spec.key);

            match stable {
                Some(true) => {
                    if matches!(record.status, TaskStatus::NotStarted | TaskStatus::Inactive) {
                        record.status = TaskStatus::Active;
                        if record.since.is_none() {
                            record.since = Some(now_t);
                        }
                        info!(task = spec.key, t = now_t, "▶️ 任务激活");
                        log.push(EventLevel::Task, now_t, format!("{} => ACTIVE", spec.key));
                    }
                    record.last_seen = Some(now_t);
                }
                Some(false) => {
                    if record.status == TaskStatus::Active {
                        record.status = TaskStatus::Inactive;
                        info!(task = spec.key, t = now_t, "⏸️ 任务停止");
                        log.push(EventLevel::Task, now_t, format!("{} => INACTIVE", spec.key));
                    }
                }
                None => {
                    debug!(task = spec.key, raw, on = counter.on, off = counter.off, "去抖中");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection, Roi};
    use crate::roles::Role;

    fn rois() -> RoiSet {
        let mut set = RoiSet::new();
        set.insert("fuel", Roi::new(600.0, 150.0, 1000.0, 550.0).unwrap());
        set.insert("engine", Roi::new(300.0, 300.0, 600.0, 600.0).unwrap());
        set
    }

    fn truck_in_fuel(tid: u32) -> TrackedDetection {
        TrackedDetection::new(
            tid,
            &Detection::new("truck", 0.9, BBox::new(700.0, 300.0, 800.0, 400.0)),
        )
    }

    fn engine() -> TaskEngine {
        TaskEngine::new(&DebounceConfig::default(), "person")
    }

    #[test]
    fn test_task_activates_after_on_n() {
        let mut eng = engine();
        let mut store = TaskStore::new();
        let mut log = EventLog::new(50);
        let mut roles = RoleAssignment::new();
        roles.assign(1, Role::FuelTruck);
        let frame = [truck_in_fuel(1)];

        for t in 0..2 {
            eng.evaluate(&frame, &rois(), &roles, t as f64, &mut store, &mut log);
            assert_eq!(store.status("fueling"), TaskStatus::NotStarted);
        }
        eng.evaluate(&frame, &rois(), &roles, 2.0, &mut store, &mut log);
        let rec = store.get("fueling").unwrap();
        assert_eq!(rec.status, TaskStatus::Active);
        assert_eq!(rec.since, Some(2.0));
        assert_eq!(rec.last_seen, Some(2.0));
    }

    #[test]
    fn test_untagged_vehicle_gives_no_evidence() {
        let mut eng = engine();
        let mut store = TaskStore::new();
        let mut log = EventLog::new(50);
        let roles = RoleAssignment::new();
        for t in 0..5 {
            eng.evaluate(&[truck_in_fuel(1)], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        assert_eq!(store.status("fueling"), TaskStatus::NotStarted);
    }

    #[test]
    fn test_active_to_inactive_keeps_since() {
        let mut eng = engine();
        let mut store = TaskStore::new();
        let mut log = EventLog::new(50);
        let mut roles = RoleAssignment::new();
        roles.assign(1, Role::FuelTruck);

        for t in 0..3 {
            eng.evaluate(&[truck_in_fuel(1)], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        for t in 3..6 {
            eng.evaluate(&[], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        let rec = store.get("fueling").unwrap();
        assert_eq!(rec.status, TaskStatus::Inactive);
        assert_eq!(rec.since, Some(2.0));
        assert_eq!(rec.last_seen, Some(2.0));

        for t in 6..9 {
            eng.evaluate(&[truck_in_fuel(1)], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        let rec = store.get("fueling").unwrap();
        assert_eq!(rec.status, TaskStatus::Active);
        assert_eq!(rec.since, Some(2.0));
    }

    #[test]
    fn test_done_is_never_overwritten() {
        let mut eng = engine();
        let mut store = TaskStore::new();
        let mut log = EventLog::new(50);
        let mut roles = RoleAssignment::new();
        roles.assign(1, Role::FuelTruck);
        store.mark_done("fueling", 0.0, &mut log);

        for t in 1..8 {
            eng.evaluate(&[truck_in_fuel(1)], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        assert_eq!(store.status("fueling"), TaskStatus::Done);
    }

    #[test]
    fn test_person_centroid_gates_safety_task() {
        let mut eng = engine();
        let mut store = TaskStore::new();
        let mut log = EventLog::new(50);
        let roles = RoleAssignment::new();
        // 框与ROI重叠, 但中心点在外
        let edge = TrackedDetection::new(
            4,
            &Detection::new("person", 0.8, BBox::new(560.0, 500.0, 700.0, 700.0)),
        );
        for t in 0..4 {
            eng.evaluate(&[edge.clone()], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        assert_eq!(store.status("safety_engine_clear"), TaskStatus::NotStarted);

        let inside = TrackedDetection::new(
            4,
            &Detection::new("person", 0.8, BBox::new(400.0, 400.0, 440.0, 500.0)),
        );
        for t in 4..7 {
            eng.evaluate(&[inside.clone()], &rois(), &roles, t as f64, &mut store, &mut log);
        }
        assert_eq!(store.status("safety_engine_clear"), TaskStatus::Active);
    }

    #[test]
    fn test_missing_roi_is_false() {
        let mut eng = engine();
        let mut store = TaskStore::new();
        let mut log = EventLog::new(50);
        let mut roles = RoleAssignment::new();
        roles.assign(1, Role::GpuTruck);
        for t in 0..5 {
            eng.evaluate(&[truck_in_fuel(1)], &RoiSet::new(), &roles, t as f64, &mut store, &mut log);
        }
        assert_eq!(store.status("gpu"), TaskStatus::NotStarted);
        assert_eq!(store.len(), eng.tasks().len());
    }
}
