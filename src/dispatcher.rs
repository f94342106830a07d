//! 调度上下文 (Run context)
//!
//! 拥有一次运行的全部可变状态, 每帧按固定顺序驱动各组件:
//! 跟踪 → 角色交接 → 流检测 → 任务引擎 → 流程状态机 → 告警

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::alerts::{default_safety_rules, evaluate_safety, AlertEngine, AlertItem, AlertRow, SafetyRule};
use crate::config::EngineConfig;
use crate::detection::{Detection, IouTracker, RoiSet, TrackedDetection, Tracker};
use crate::event_log::{EventLevel, EventLog, EventLogItem};
use crate::flow::{FingerdockDetector, PassengerFlowDetector, FINGERDOCK_TASK};
use crate::roles::{Handoff, Role, RoleAssignment, RoleHandoff};
use crate::sequence::{SequenceMachine, SequenceState, StepView};
use crate::tasks::{TaskEngine, TaskRecord, TaskStatus, TaskStore};

/// 重置方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    /// 全部清空, 包括角色标注
    Full,
    /// 保留角色标注; 清空角色记忆/跟踪器/任务/告警/流程
    KeepRoles,
    /// 循环重播: 保留跟踪器和角色, 只清空时间相关状态
    KeepTracking,
}

/// 单帧处理结果
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub now_t: f64,
    pub tracked: Vec<TrackedDetection>,
    pub handoffs: Vec<Handoff>,
    /// 本帧新打开的告警 id
    pub opened_alerts: Vec<String>,
    pub next_step: Option<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SequenceSnapshot {
    pub current_idx: usize,
    pub started_at: BTreeMap<String, f64>,
    pub done_at: BTreeMap<String, f64>,
    pub next_step: Option<&'static str>,
    pub steps: Vec<StepView>,
}

/// 一次运行的完整导出
#[derive(Clone, Debug, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub timestamp: String,
    pub current_time_sec: f64,
    pub asset_roles: BTreeMap<String, Role>,
    pub task_history: BTreeMap<String, TaskRecord>,
    pub sequence_state: SequenceSnapshot,
    pub alerts: Vec<AlertItem>,
    pub open_alerts: Vec<AlertRow>,
    pub events: Vec<EventLogItem>,
}

pub struct Dispatcher {
    config: EngineConfig,
    rois: RoiSet,
    run_id: String,
    now_t: f64,
    ticks: u64,

    // ========== 组件 ==========
    tracker: Box<dyn Tracker + Send>,
    roles: RoleAssignment,
    handoff: RoleHandoff,
    passenger: PassengerFlowDetector,
    fingerdock: FingerdockDetector,
    tasks: TaskEngine,
    store: TaskStore,
    sequence: SequenceMachine,
    alerts: AlertEngine,
    safety_rules: Vec<SafetyRule>,
    log: EventLog,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        let rois = config.roi_set();
        let tracker = Self::build_tracker(&config);
        Self {
            rois,
            run_id: crate::gen_time_string("-"),
            now_t: 0.0,
            ticks: 0,
            tracker,
            roles: RoleAssignment::new(),
            handoff: RoleHandoff::new(&config.handoff, &config.vehicle_classes),
            passenger: PassengerFlowDetector::new(&config.passenger_flow, &config.person_class),
            fingerdock: FingerdockDetector::new(&config.fingerdock),
            tasks: TaskEngine::new(&config.debounce, &config.person_class),
            store: TaskStore::new(),
            sequence: SequenceMachine::new(&config.sequence),
            alerts: AlertEngine::new(),
            safety_rules: default_safety_rules(),
            log: EventLog::new(config.event_log_capacity),
            config,
        }
    }

    fn build_tracker(config: &EngineConfig) -> Box<dyn Tracker + Send> {
        Box::new(IouTracker::new(
            config.tracker.iou_match_threshold,
            config.tracker.max_missed,
        ))
    }

    /// 帧号 → 逻辑时间
    pub fn frame_time(&self, frame_idx: u64) -> f64 {
        let fps = if self.config.fps > 0.0 { self.config.fps } else { 1.0 };
        frame_idx as f64 / fps
    }

    pub fn tick_frame(&mut self, frame_idx: u64, detections: &[Detection]) -> TickReport {
        let now_t = self.frame_time(frame_idx);
        self.tick(detections, now_t)
    }

    /// 处理一帧; 不会失败
    pub fn tick(&mut self, detections: &[Detection], now_t: f64) -> TickReport {
        self.now_t = now_t;
        self.ticks += 1;

        // 1) 跟踪
        let tracked = self.tracker.update(detections);

        // 2) 角色交接
        self.handoff.update_memory(&tracked, &self.roles, now_t);
        let handoffs = self
            .handoff
            .reconcile(&tracked, &mut self.roles, now_t, &mut self.log);

        // 3) 流检测
        let flow = self.passenger.update(&tracked, &self.rois, now_t);
        for (key, status) in flow.entries() {
            self.store.apply_phase(key, status, now_t, &mut self.log);
        }
        let dock = self.fingerdock.update(&tracked, &self.rois, now_t);
        if self.fingerdock.has_sighting() {
            self.store.apply_phase(FINGERDOCK_TASK, dock, now_t, &mut self.log);
        }

        // 4) 任务引擎
        self.tasks.evaluate(
            &tracked,
            &self.rois,
            &self.roles,
            now_t,
            &mut self.store,
            &mut self.log,
        );

        // 5) 流程状态机
        let mut intents = self.sequence.update(now_t, &mut self.store, &mut self.log);

        // 6) 告警
        intents.extend(evaluate_safety(&self.safety_rules, &self.store));
        let before: Vec<String> = self.alerts.open_alerts().iter().map(|a| a.id.clone()).collect();
        self.alerts.apply(&intents, now_t, &mut self.log);
        let opened_alerts: Vec<String> = self
            .alerts
            .open_alerts()
            .iter()
            .filter(|a| a.first_seen == now_t && !before.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();

        debug!(
            t = now_t,
            detections = detections.len(),
            tracked = tracked.len(),
            open_alerts = self.alerts.open_alerts().len(),
            "帧处理完成"
        );

        TickReport {
            now_t,
            tracked,
            handoffs,
            opened_alerts,
            next_step: self.sequence.next_step().map(|s| s.key),
        }
    }

    // ========== 操作员 ==========

    pub fn assign_role(&mut self, track_id: u32, role: Role) {
        info!(track_id, %role, "🏷️ 角色标注");
        let previous = self.roles.role_of(track_id);
        if previous.is_assigned() && previous != role {
            self.handoff.forget(previous);
        }
        self.roles.assign(track_id, role);
        self.log.push(
            EventLevel::Info,
            self.now_t,
            format!("Track {} tagged as {}", track_id, role),
        );
    }

    pub fn reset(&mut self, mode: ResetMode) {
        match mode {
            ResetMode::Full => {
                self.roles.clear();
                self.handoff.clear();
                self.tracker = Self::build_tracker(&self.config);
            }
            ResetMode::KeepRoles => {
                self.handoff.clear();
                self.tracker.reset();
            }
            ResetMode::KeepTracking => {
                // 时间轴回到0, 旧记忆的时间戳不再可比
                self.handoff.clear();
            }
        }

        self.tasks.reset();
        self.store.clear();
        self.sequence.reset();
        self.alerts.clear();
        self.passenger.reset();
        self.fingerdock.reset();
        self.log.clear();
        self.now_t = 0.0;
        self.ticks = 0;
        self.run_id = crate::gen_time_string("-");

        info!(?mode, run_id = %self.run_id, "🔄 运行已重置");
        let msg = match mode {
            ResetMode::Full => "Full reset",
            ResetMode::KeepRoles => "Playback reset",
            ResetMode::KeepTracking => "Loop restart: state reset (tracker+tagging kept)",
        };
        self.log.push(EventLevel::Info, 0.0, msg);
    }

    // ========== 只读视图 ==========

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rois(&self) -> &RoiSet {
        &self.rois
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn now(&self) -> f64 {
        self.now_t
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn roles(&self) -> &RoleAssignment {
        &self.roles
    }

    pub fn handoff(&self) -> &RoleHandoff {
        &self.handoff
    }

    pub fn tracker(&self) -> &dyn Tracker {
        self.tracker.as_ref()
    }

    pub fn task_store(&self) -> &TaskStore {
        &self.store
    }

    pub fn task_status(&self, key: &str) -> TaskStatus {
        self.store.status(key)
    }

    pub fn task_engine(&self) -> &TaskEngine {
        &self.tasks
    }

    pub fn sequence(&self) -> &SequenceMachine {
        &self.sequence
    }

    pub fn sequence_state(&self) -> &SequenceState {
        self.sequence.state()
    }

    pub fn step_views(&self) -> Vec<StepView> {
        self.sequence.step_views(&self.store, self.now_t)
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn open_alerts(&self) -> Vec<&AlertItem> {
        self.alerts.open_alerts()
    }

    pub fn alert_table(&self) -> Vec<AlertRow> {
        self.alerts.table()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn passenger_flow(&self) -> &PassengerFlowDetector {
        &self.passenger
    }

    pub fn fingerdock(&self) -> &FingerdockDetector {
        &self.fingerdock
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let seq = self.sequence.state();
        RunSnapshot {
            run_id: self.run_id.clone(),
            timestamp: chrono::Local::now().to_rfc3339(),
            current_time_sec: self.now_t,
            asset_roles: self
                .roles
                .iter()
                .map(|(tid, role)| (tid.to_string(), role))
                .collect(),
            task_history: self.store.to_map(),
            sequence_state: SequenceSnapshot {
                current_idx: seq.current_idx,
                started_at: seq.started_at.clone(),
                done_at: seq.done_at.clone(),
                next_step: self.sequence.next_step().map(|s| s.key),
                steps: self.step_views(),
            },
            alerts: self.alerts.all(),
            open_alerts: self.alerts.table(),
            events: self.log.recent(self.log.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn truck_in_fuel() -> Detection {
        Detection::new("truck", 0.9, BBox::new(700.0, 300.0, 800.0, 400.0))
    }

    #[test]
    fn test_tagged_truck_activates_fueling() {
        let mut d = Dispatcher::new(EngineConfig::default());
        let report = d.tick_frame(0, &[truck_in_fuel()]);
        let tid = report.tracked[0].track_id;
        d.assign_role(tid, Role::FuelTruck);

        for frame in 1..5 {
            d.tick_frame(frame, &[truck_in_fuel()]);
        }
        assert_eq!(d.task_status("fueling"), TaskStatus::Active);
        assert_eq!(d.task_store().get("fueling").unwrap().since, Some(3.0));
    }

    #[test]
    fn test_frame_time_uses_fps() {
        let config = EngineConfig {
            fps: 4.0,
            ..EngineConfig::default()
        };
        let d = Dispatcher::new(config);
        assert_eq!(d.frame_time(10), 2.5);
    }

    #[test]
    fn test_reset_modes() {
        let mut d = Dispatcher::new(EngineConfig::default());
        let report = d.tick(&[truck_in_fuel()], 0.0);
        let tid = report.tracked[0].track_id;
        d.assign_role(tid, Role::FuelTruck);
        for t in 1..4 {
            d.tick(&[truck_in_fuel()], t as f64);
        }
        assert_eq!(d.task_status("fueling"), TaskStatus::Active);

        d.reset(ResetMode::KeepTracking);
        assert_eq!(d.task_status("fueling"), TaskStatus::NotStarted);
        assert_eq!(d.roles().role_of(tid), Role::FuelTruck);
        assert_eq!(d.tracker().track_count(), 1);
        // 跟踪器保留: 同一ID继续
        let report = d.tick(&[truck_in_fuel()], 0.0);
        assert_eq!(report.tracked[0].track_id, tid);

        d.reset(ResetMode::KeepRoles);
        assert_eq!(d.roles().role_of(tid), Role::FuelTruck);
        assert_eq!(d.tracker().track_count(), 0);
        assert!(d.handoff().memory().is_empty());

        d.reset(ResetMode::Full);
        assert!(d.roles().is_empty());
        assert!(d.open_alerts().is_empty());
        assert_eq!(d.event_log().len(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut d = Dispatcher::new(EngineConfig::default());
        d.assign_role(1, Role::GpuTruck);
        d.tick(&[truck_in_fuel()], 0.0);
        let snap = d.snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        for key in [
            "run_id",
            "timestamp",
            "current_time_sec",
            "alerts",
            "task_history",
            "sequence_state",
            "asset_roles",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["asset_roles"]["1"], "GPU_TRUCK");
        assert_eq!(json["sequence_state"]["current_idx"], 0);
        assert_eq!(json["sequence_state"]["next_step"], "passenger_deboarding");
    }

    #[test]
    fn test_untag_is_not_undone_by_handoff() {
        let mut d = Dispatcher::new(EngineConfig::default());
        d.tick(&[truck_in_fuel()], 0.0);
        d.assign_role(1, Role::FuelTruck);
        d.tick(&[truck_in_fuel()], 1.0);
        assert!(d.handoff().memory().contains_key(&Role::FuelTruck));

        d.assign_role(1, Role::Unassigned);
        assert!(d.handoff().memory().is_empty());
        let report = d.tick(&[truck_in_fuel()], 2.0);
        assert!(report.handoffs.is_empty());
        assert_eq!(d.roles().role_of(1), Role::Unassigned);
    }

    #[test]
    fn test_retag_forgets_previous_role() {
        let mut d = Dispatcher::new(EngineConfig::default());
        d.tick(&[truck_in_fuel()], 0.0);
        d.assign_role(1, Role::FuelTruck);
        d.tick(&[truck_in_fuel()], 1.0);

        d.assign_role(1, Role::GpuTruck);
        assert!(!d.handoff().memory().contains_key(&Role::FuelTruck));
        d.tick(&[truck_in_fuel()], 2.0);
        assert_eq!(d.roles().role_of(1), Role::GpuTruck);
        assert_eq!(d.roles().tracks_with(Role::FuelTruck).count(), 0);
    }

    #[test]
    fn test_loop_restart_drops_role_memory() {
        let mut d = Dispatcher::new(EngineConfig::default());
        d.tick(&[truck_in_fuel()], 200.0);
        d.assign_role(1, Role::FuelTruck);
        d.tick(&[truck_in_fuel()], 201.0);

        d.reset(ResetMode::KeepTracking);
        assert!(d.handoff().memory().is_empty());
        assert_eq!(d.roles().role_of(1), Role::FuelTruck);

        // 同一位置出现另一类车辆 → 新轨迹, 不应继承角色
        let car = Detection::new("car", 0.9, BBox::new(700.0, 300.0, 800.0, 400.0));
        let report = d.tick(&[car], 100.0);
        assert_eq!(report.tracked[0].track_id, 2);
        assert!(report.handoffs.is_empty());
        assert_eq!(d.roles().role_of(2), Role::Unassigned);
    }
}
