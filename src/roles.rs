//! 资产角色与角色交接
//! Operator-assigned roles and role handoff across tracker identity churn
//!
//! 人工标注角色代价很高: 跟踪ID因短暂遮挡变化时, 根据最近记忆的
//! 边界框把角色自动转移到新的轨迹上, 无需重新标注。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use phf::phf_map;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::HandoffConfig;
use crate::detection::{compute_iou, BBox, TrackedDetection};
use crate::event_log::{EventLevel, EventLog};

// ========== 角色 ==========

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Unassigned,
    FuelTruck,
    GpuTruck,
    BeltLoader,
    PushbackTug,
    Stairs,
    Other,
}

/// 角色键 → 角色 (操作员输入解析)
static ROLE_KEYS: phf::Map<&'static str, Role> = phf_map! {
    "UNASSIGNED" => Role::Unassigned,
    "FUEL_TRUCK" => Role::FuelTruck,
    "GPU_TRUCK" => Role::GpuTruck,
    "BELT_LOADER" => Role::BeltLoader,
    "PUSHBACK_TUG" => Role::PushbackTug,
    "STAIRS" => Role::Stairs,
    "OTHER" => Role::Other,
};

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Unassigned,
        Role::FuelTruck,
        Role::GpuTruck,
        Role::BeltLoader,
        Role::PushbackTug,
        Role::Stairs,
        Role::Other,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Role::Unassigned => "UNASSIGNED",
            Role::FuelTruck => "FUEL_TRUCK",
            Role::GpuTruck => "GPU_TRUCK",
            Role::BeltLoader => "BELT_LOADER",
            Role::PushbackTug => "PUSHBACK_TUG",
            Role::Stairs => "STAIRS",
            Role::Other => "OTHER",
        }
    }

    /// 显示名称
    pub fn label(&self) -> &'static str {
        match self {
            Role::Unassigned => "Unassigned",
            Role::FuelTruck => "Fuel Truck",
            Role::GpuTruck => "GPU",
            Role::BeltLoader => "Belt / Baggage",
            Role::PushbackTug => "Tug / Pushback",
            Role::Stairs => "Stairs (proxy)",
            Role::Other => "Other",
        }
    }

    pub fn is_assigned(&self) -> bool {
        *self != Role::Unassigned
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.key())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        ROLE_KEYS
            .get(key.as_str())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("未知角色: {}", s))
    }
}

// ========== 角色分配 ==========

/// track_id → 角色 (由操作员维护; 引擎只在交接时改写键)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    roles: BTreeMap<u32, Role>,
}

impl RoleAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配角色; UNASSIGNED 等同于删除
    pub fn assign(&mut self, track_id: u32, role: Role) {
        if role.is_assigned() {
            self.roles.insert(track_id, role);
        } else {
            self.roles.remove(&track_id);
        }
    }

    pub fn unassign(&mut self, track_id: u32) -> Option<Role> {
        self.roles.remove(&track_id)
    }

    pub fn role_of(&self, track_id: u32) -> Role {
        self.roles.get(&track_id).copied().unwrap_or(Role::Unassigned)
    }

    pub fn tracks_with(&self, role: Role) -> impl Iterator<Item = u32> + '_ {
        self.roles
            .iter()
            .filter(move |(_, r)| **r == role)
            .map(|(tid, _)| *tid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Role)> + '_ {
        self.roles.iter().map(|(tid, r)| (*tid, *r))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn clear(&mut self) {
        self.roles.clear();
    }
}

// ========== 角色记忆 ==========

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoleMemoryEntry {
    pub track_id: u32,
    pub bbox: BBox,
    pub last_seen_t: f64,
}

/// 一次交接记录
#[derive(Clone, Debug, PartialEq)]
pub struct Handoff {
    pub role: Role,
    pub from_track: u32,
    pub to_track: u32,
    pub iou: f32,
}

/// 角色交接器: role → 最近一次可见的 {track_id, bbox, 时间}
pub struct RoleHandoff {
    memory: BTreeMap<Role, RoleMemoryEntry>,
    iou_threshold: f32,
    max_age_sec: f64,
    vehicle_classes: Vec<String>,
}

impl RoleHandoff {
    pub fn new(config: &HandoffConfig, vehicle_classes: &[String]) -> Self {
        Self {
            memory: BTreeMap::new(),
            iou_threshold: config.iou_threshold,
            max_age_sec: config.max_age_sec,
            vehicle_classes: vehicle_classes.to_vec(),
        }
    }

    pub fn memory(&self) -> &BTreeMap<Role, RoleMemoryEntry> {
        &self.memory
    }

    pub fn clear(&mut self) {
        self.memory.clear();
    }

    /// 操作员撤销/更换角色时丢弃该角色的记忆, 防止被交接回来
    pub fn forget(&mut self, role: Role) -> Option<RoleMemoryEntry> {
        self.memory.remove(&role)
    }

    fn is_vehicle(&self, det: &TrackedDetection) -> bool {
        self.vehicle_classes.iter().any(|c| *c == det.class_name)
    }

    /// 记录当前可见的已分配角色的位置
    pub fn update_memory(&mut self, tracked: &[TrackedDetection], roles: &RoleAssignment, now_t: f64) {
        for det in tracked {
            let role = roles.role_of(det.track_id);
            if !role.is_assigned() {
                continue;
            }
            self.memory.insert(
                role,
                RoleMemoryEntry {
                    track_id: det.track_id,
                    bbox: det.bbox,
                    last_seen_t: now_t,
                },
            );
        }
    }

    /// 角色丢失时, 在未分配的车辆中按IOU寻找接替者
    pub fn reconcile(
        &mut self,
        tracked: &[TrackedDetection],
        roles: &mut RoleAssignment,
        now_t: f64,
        log: &mut EventLog,
    ) -> Vec<Handoff> {
        let mut handoffs = Vec::new();
        if self.memory.is_empty() || tracked.is_empty() {
            return handoffs;
        }

        let mut present: BTreeSet<Role> = tracked
            .iter()
            .map(|d| roles.role_of(d.track_id))
            .filter(Role::is_assigned)
            .collect();

        let pending: Vec<(Role, RoleMemoryEntry)> = self
            .memory
            .iter()
            .filter(|(role, mem)| {
                **role != Role::Other
                    && !present.contains(*role)
                    && (0.0..=self.max_age_sec).contains(&(now_t - mem.last_seen_t))
            })
            .map(|(role, mem)| (*role, mem.clone()))
            .collect();

        for (role, mem) in pending {
            if present.contains(&role) {
                continue;
            }

            let mut best: Option<(&TrackedDetection, f32)> = None;
            for det in tracked {
                // 只交接给新的轨迹ID
                if det.track_id == mem.track_id
                    || !self.is_vehicle(det)
                    || roles.role_of(det.track_id).is_assigned()
                {
                    continue;
                }
                let iou = compute_iou(&mem.bbox, &det.bbox);
                if best.map_or(iou > 0.0, |(_, b)| iou > b) {
                    best = Some((det, iou));
                }
            }

            let Some((det, iou)) = best else { continue };
            if iou < self.iou_threshold {
                continue;
            }

            if roles.role_of(mem.track_id) == role {
                roles.unassign(mem.track_id);
            }
            roles.assign(det.track_id, role);
            self.memory.insert(
                role,
                RoleMemoryEntry {
                    track_id: det.track_id,
                    bbox: det.bbox,
                    last_seen_t: now_t,
                },
            );
            present.insert(role);

            info!(%role, from = mem.track_id, to = det.track_id, iou, "角色交接");
            log.push(
                EventLevel::Info,
                now_t,
                format!(
                    "Role handoff: {} moved {} → {} (IoU {:.2})",
                    role, mem.track_id, det.track_id, iou
                ),
            );
            handoffs.push(Handoff {
                role,
                from_track: mem.track_id,
                to_track: det.track_id,
                iou,
            });
        }

        handoffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;

    fn tracked(tid: u32, cls: &str, bbox: BBox) -> TrackedDetection {
        TrackedDetection::new(tid, &Detection::new(cls, 0.9, bbox))
    }

    fn handoff() -> RoleHandoff {
        let classes: Vec<String> = ["truck", "car", "bus", "train"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        RoleHandoff::new(&HandoffConfig::default(), &classes)
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("FUEL_TRUCK".parse::<Role>().unwrap(), Role::FuelTruck);
        assert_eq!("gpu truck".parse::<Role>().unwrap(), Role::GpuTruck);
        assert!("SPACESHIP".parse::<Role>().is_err());
        for role in Role::ALL {
            assert_eq!(role.key().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_assign_unassigned_removes() {
        let mut roles = RoleAssignment::new();
        roles.assign(3, Role::GpuTruck);
        assert_eq!(roles.role_of(3), Role::GpuTruck);
        roles.assign(3, Role::Unassigned);
        assert!(roles.is_empty());
        assert_eq!(roles.role_of(3), Role::Unassigned);
    }

    #[test]
    fn test_handoff_to_new_track_id() {
        let mut h = handoff();
        let mut roles = RoleAssignment::new();
        let mut log = EventLog::new(10);
        roles.assign(1, Role::FuelTruck);

        let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);
        h.update_memory(&[tracked(1, "truck", bbox)], &roles, 0.0);

        // 遮挡后出现新ID
        let now = [tracked(7, "truck", bbox.shifted(5.0, 0.0))];
        h.update_memory(&now, &roles, 1.0);
        let done = h.reconcile(&now, &mut roles, 1.0, &mut log);

        assert_eq!(done.len(), 1);
        assert_eq!(done[0].from_track, 1);
        assert_eq!(done[0].to_track, 7);
        assert_eq!(roles.role_of(7), Role::FuelTruck);
        assert_eq!(roles.role_of(1), Role::Unassigned);
        assert_eq!(h.memory()[&Role::FuelTruck].track_id, 7);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_no_handoff_when_memory_too_old() {
        let mut h = handoff();
        let mut roles = RoleAssignment::new();
        let mut log = EventLog::new(10);
        roles.assign(1, Role::GpuTruck);
        let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);
        h.update_memory(&[tracked(1, "truck", bbox)], &roles, 0.0);

        let now = [tracked(9, "truck", bbox)];
        let done = h.reconcile(&now, &mut roles, 20.0, &mut log);
        assert!(done.is_empty());
        assert_eq!(roles.role_of(9), Role::Unassigned);
    }

    #[test]
    fn test_no_handoff_when_role_still_visible_or_low_iou() {
        let mut h = handoff();
        let mut roles = RoleAssignment::new();
        let mut log = EventLog::new(10);
        roles.assign(1, Role::BeltLoader);
        let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);
        h.update_memory(&[tracked(1, "truck", bbox)], &roles, 0.0);

        // 角色仍可见
        let visible = [tracked(1, "truck", bbox), tracked(2, "truck", bbox)];
        assert!(h.reconcile(&visible, &mut roles, 1.0, &mut log).is_empty());

        // 不可见, 但候选框离得太远
        let far = [tracked(3, "truck", bbox.shifted(500.0, 0.0))];
        assert!(h.reconcile(&far, &mut roles, 2.0, &mut log).is_empty());
        assert_eq!(roles.role_of(1), Role::BeltLoader);
    }

    #[test]
    fn test_handoff_ignores_people_and_tagged_tracks() {
        let mut h = handoff();
        let mut roles = RoleAssignment::new();
        let mut log = EventLog::new(10);
        roles.assign(1, Role::FuelTruck);
        roles.assign(5, Role::GpuTruck);
        let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);
        h.update_memory(&[tracked(1, "truck", bbox)], &roles, 0.0);

        let now = [tracked(4, "person", bbox), tracked(5, "truck", bbox)];
        assert!(h.reconcile(&now, &mut roles, 1.0, &mut log).is_empty());
        assert_eq!(roles.role_of(4), Role::Unassigned);
        assert_eq!(roles.role_of(5), Role::GpuTruck);
    }

    #[test]
    fn test_untagged_track_keeps_no_role() {
        let mut h = handoff();
        let mut roles = RoleAssignment::new();
        let mut log = EventLog::new(10);
        roles.assign(1, Role::FuelTruck);
        let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);
        h.update_memory(&[tracked(1, "truck", bbox)], &roles, 0.0);

        // 记忆仍在, 但同一轨迹不能接回自己的角色
        roles.assign(1, Role::Unassigned);
        let now = [tracked(1, "truck", bbox)];
        assert!(h.reconcile(&now, &mut roles, 1.0, &mut log).is_empty());
        assert_eq!(roles.role_of(1), Role::Unassigned);

        assert!(h.forget(Role::FuelTruck).is_some());
        assert!(h.memory().is_empty());
    }

    #[test]
    fn test_no_handoff_from_future_memory() {
        let mut h = handoff();
        let mut roles = RoleAssignment::new();
        let mut log = EventLog::new(10);
        roles.assign(1, Role::FuelTruck);
        let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);
        h.update_memory(&[tracked(1, "truck", bbox)], &roles, 201.0);

        // 时间轴回绕后记忆年龄为负
        let now = [tracked(2, "car", bbox)];
        assert!(h.reconcile(&now, &mut roles, 100.0, &mut log).is_empty());
        assert_eq!(roles.role_of(2), Role::Unassigned);
    }
}
