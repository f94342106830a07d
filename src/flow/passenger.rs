//! 客流方向检测
//! Passenger flow at the door ROI: deboarding, boarding and ground-staff prep
//!
//! 方向按最近 min_samples 个位置的平均 x 位移判断:
//! - 左→右: 下客信号
//! - 右→左: 下客开始前为地勤准备, 之后为上客信号

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, info};

use crate::config::PassengerFlowConfig;
use crate::detection::{RoiSet, TrackedDetection};
use crate::tasks::TaskStatus;

pub const GROUND_STAFF_TASK: &str = "ground_staff_prep";
pub const DEBOARDING_TASK: &str = "passenger_deboarding";
pub const BOARDING_TASK: &str = "passenger_boarding";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

/// 按最近 min_samples 个样本的平均 x 位移判断方向; 样本不足或移动太慢返回 None
pub fn movement_direction(
    positions: &VecDeque<(f32, f32, f64)>,
    min_samples: usize,
    threshold: f32,
) -> Option<Direction> {
    let n = min_samples.max(2);
    if positions.len() < n {
        return None;
    }
    let recent: Vec<f32> = positions.iter().skip(positions.len() - n).map(|p| p.0).collect();
    let total: f32 = recent.windows(2).map(|w| w[1] - w[0]).sum();
    let avg = total / (n - 1) as f32;

    if avg > threshold {
        Some(Direction::LeftToRight)
    } else if avg < -threshold {
        Some(Direction::RightToLeft)
    } else {
        None
    }
}

/// 三个客流任务的当前阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassengerFlowStatus {
    pub ground_staff_prep: TaskStatus,
    pub passenger_deboarding: TaskStatus,
    pub passenger_boarding: TaskStatus,
}

impl Default for PassengerFlowStatus {
    fn default() -> Self {
        Self {
            ground_staff_prep: TaskStatus::NotStarted,
            passenger_deboarding: TaskStatus::NotStarted,
            passenger_boarding: TaskStatus::NotStarted,
        }
    }
}

impl PassengerFlowStatus {
    /// (任务键, 状态), 用于写入任务存储
    pub fn entries(&self) -> [(&'static str, TaskStatus); 3] {
        [
            (GROUND_STAFF_TASK, self.ground_staff_prep),
            (DEBOARDING_TASK, self.passenger_deboarding),
            (BOARDING_TASK, self.passenger_boarding),
        ]
    }
}

pub struct PassengerFlowDetector {
    config: PassengerFlowConfig,
    person_class: String,

    // ========== 轨迹历史 ==========
    /// track_id → [(cx, cy, t), ...]
    histories: BTreeMap<u32, VecDeque<(f32, f32, f64)>>,

    // ========== 信号时间 ==========
    last_ground_staff_signal: Option<f64>,
    last_deboarding_signal: Option<f64>,
    last_boarding_signal: Option<f64>,
    boarding_signal_since: Option<f64>,

    status: PassengerFlowStatus,
}

impl PassengerFlowDetector {
    pub fn new(config: &PassengerFlowConfig, person_class: &str) -> Self {
        Self {
            config: config.clone(),
            person_class: person_class.to_string(),
            histories: BTreeMap::new(),
            last_ground_staff_signal: None,
            last_deboarding_signal: None,
            last_boarding_signal: None,
            boarding_signal_since: None,
            status: PassengerFlowStatus::default(),
        }
    }

    pub fn roi_name(&self) -> &str {
        &self.config.roi
    }

    pub fn status(&self) -> PassengerFlowStatus {
        self.status
    }

    pub fn history_len(&self, track_id: u32) -> usize {
        self.histories.get(&track_id).map_or(0, |h| h.len())
    }

    pub fn tracked_people(&self) -> usize {
        self.histories.len()
    }

    pub fn reset(&mut self) {
        self.histories.clear();
        self.last_ground_staff_signal = None;
        self.last_deboarding_signal = None;
        self.last_boarding_signal = None;
        self.boarding_signal_since = None;
        self.status = PassengerFlowStatus::default();
    }

    /// 每帧调用一次; 没有门口ROI时保持上次状态
    pub fn update(&mut self, tracked: &[TrackedDetection], rois: &RoiSet, now_t: f64) -> PassengerFlowStatus {
        let Some(roi) = rois.get(&self.config.roi) else {
            return self.status;
        };

        // ========== 更新位置历史 ==========
        let mut current = BTreeSet::new();
        for det in tracked {
            if !det.is_class(&self.person_class) || !roi.contains_center(&det.bbox) {
                continue;
            }
            let (cx, cy) = det.center();
            let history = self.histories.entry(det.track_id).or_default();
            history.push_back((cx, cy, now_t));
            while history.len() > self.config.history_len.max(1) {
                history.pop_front();
            }
            current.insert(det.track_id);
        }

        let stale = self.config.stale_track_sec;
        self.histories.retain(|tid, h| {
            current.contains(tid) || h.back().map_or(false, |p| now_t - p.2 <= stale)
        });

        // ========== 方向统计 ==========
        let mut left_to_right = 0;
        let mut right_to_left = 0;
        for tid in &current {
            let Some(history) = self.histories.get(tid) else { continue };
            match movement_direction(history, self.config.min_samples, self.config.px_per_frame_threshold) {
                Some(Direction::LeftToRight) => left_to_right += 1,
                Some(Direction::RightToLeft) => right_to_left += 1,
                None => {}
            }
        }
        if left_to_right + right_to_left > 0 {
            debug!(left_to_right, right_to_left, t = now_t, "客流方向");
        }

        self.apply_signals(left_to_right > 0, right_to_left > 0, now_t);
        self.status
    }

    fn apply_signals(&mut self, deboarding_signal: bool, inbound_signal: bool, now_t: f64) {
        let deboarding_started = self.status.passenger_deboarding != TaskStatus::NotStarted;
        let boarding_window_open = if self.config.boarding_requires_deboarding_done {
            self.status.passenger_deboarding == TaskStatus::Done
        } else {
            deboarding_started
        };

        if deboarding_signal {
            self.last_deboarding_signal = Some(now_t);
        }

        // 右→左: 下客前算地勤, 之后算上客
        if inbound_signal {
            if !deboarding_started {
                self.last_ground_staff_signal = Some(now_t);
            } else if boarding_window_open {
                let gap = self.config.boarding_gap_sec;
                let fresh = self.last_boarding_signal.map_or(true, |last| now_t - last > gap);
                if fresh || self.boarding_signal_since.is_none() {
                    self.boarding_signal_since = Some(now_t);
                }
                self.last_boarding_signal = Some(now_t);
            }
        } else if let (Some(last), Some(_)) = (self.last_boarding_signal, self.boarding_signal_since) {
            if now_t - last > self.config.boarding_gap_sec {
                self.boarding_signal_since = None;
            }
        }

        self.update_ground_staff(now_t);
        self.update_deboarding(now_t);
        self.update_boarding(now_t);
    }

    // ========== 地勤准备 ==========
    fn update_ground_staff(&mut self, now_t: f64) {
        let current = self.status.ground_staff_prep;
        if current == TaskStatus::Done {
            return;
        }
        let next = match self.last_ground_staff_signal {
            None => TaskStatus::NotStarted,
            // 下客已开始: 准备阶段结束
            Some(_) if self.last_deboarding_signal.is_some() => TaskStatus::Done,
            Some(last) if now_t - last > self.config.ground_staff_quiet_sec => TaskStatus::Done,
            Some(_) => TaskStatus::Ongoing,
        };
        self.set_phase(GROUND_STAFF_TASK, next, now_t);
    }

    // ========== 下客 ==========
    fn update_deboarding(&mut self, now_t: f64) {
        let current = self.status.passenger_deboarding;
        if current == TaskStatus::Done {
            return;
        }
        let next = match (current, self.last_deboarding_signal) {
            (_, None) => TaskStatus::NotStarted,
            (TaskStatus::NotStarted, Some(_)) => TaskStatus::Started,
            (_, Some(last)) if now_t - last >= self.config.deboarding_timeout_sec => TaskStatus::Done,
            (_, Some(_)) => TaskStatus::Ongoing,
        };
        self.set_phase(DEBOARDING_TASK, next, now_t);
    }

    // ========== 上客 ==========
    fn update_boarding(&mut self, now_t: f64) {
        let next = match self.status.passenger_boarding {
            TaskStatus::Started | TaskStatus::Ongoing => TaskStatus::Ongoing,
            _ => match self.boarding_signal_since {
                Some(since) if now_t - since >= self.config.boarding_sustain_sec => TaskStatus::Started,
                _ => TaskStatus::NotStarted,
            },
        };
        self.set_phase(BOARDING_TASK, next, now_t);
    }

    fn set_phase(&mut self, key: &'static str, next: TaskStatus, now_t: f64) {
        let slot = match key {
            GROUND_STAFF_TASK => &mut self.status.ground_staff_prep,
            DEBOARDING_TASK => &mut self.status.passenger_deboarding,
            _ => &mut self.status.passenger_boarding,
        };
        if *slot != next {
            info!(task = key, from = %slot, to = %next, t = now_t, "🚶 客流阶段变化");
            *slot = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection, Roi};

    fn rois() -> RoiSet {
        let mut set = RoiSet::new();
        set.insert("passenger_door", Roi::new(900.0, 100.0, 1200.0, 400.0).unwrap());
        set
    }

    fn person_at(tid: u32, cx: f32) -> TrackedDetection {
        TrackedDetection::new(
            tid,
            &Detection::new("person", 0.8, BBox::new(cx - 10.0, 200.0, cx + 10.0, 260.0)),
        )
    }

    fn detector() -> PassengerFlowDetector {
        PassengerFlowDetector::new(&PassengerFlowConfig::default(), "person")
    }

    #[test]
    fn test_movement_direction() {
        let mut h = VecDeque::new();
        for (i, x) in [100.0, 110.0, 121.0].iter().enumerate() {
            h.push_back((*x, 0.0, i as f64));
        }
        assert_eq!(movement_direction(&h, 3, 5.0), Some(Direction::LeftToRight));

        let mut h = VecDeque::new();
        for (i, x) in [100.0, 90.0, 80.0].iter().enumerate() {
            h.push_back((*x, 0.0, i as f64));
        }
        assert_eq!(movement_direction(&h, 3, 5.0), Some(Direction::RightToLeft));

        let mut h = VecDeque::new();
        for (i, x) in [100.0, 102.0, 104.0].iter().enumerate() {
            h.push_back((*x, 0.0, i as f64));
        }
        assert_eq!(movement_direction(&h, 3, 5.0), None);
        h.pop_back();
        assert_eq!(movement_direction(&h, 3, 5.0), None);
    }

    #[test]
    fn test_history_bounded_and_pruned() {
        let mut d = detector();
        for t in 0..15 {
            d.update(&[person_at(1, 1000.0)], &rois(), t as f64);
        }
        assert_eq!(d.history_len(1), 10);

        // 5秒内仍保留, 超过后清除
        d.update(&[], &rois(), 19.0);
        assert_eq!(d.tracked_people(), 1);
        d.update(&[], &rois(), 20.5);
        assert_eq!(d.tracked_people(), 0);
    }

    #[test]
    fn test_deboarding_started_ongoing_done() {
        let mut d = detector();
        let mut seen = Vec::new();
        for t in 0..6 {
            let s = d.update(&[person_at(1, 950.0 + 20.0 * t as f32)], &rois(), t as f64);
            seen.push(s.passenger_deboarding);
        }
        // 第三个样本才有方向
        assert_eq!(seen[1], TaskStatus::NotStarted);
        assert_eq!(seen[2], TaskStatus::Started);
        assert_eq!(seen[3], TaskStatus::Ongoing);

        // 最后信号在 t=5, 50秒后完成
        let s = d.update(&[], &rois(), 54.0);
        assert_eq!(s.passenger_deboarding, TaskStatus::Ongoing);
        let s = d.update(&[], &rois(), 55.0);
        assert_eq!(s.passenger_deboarding, TaskStatus::Done);
    }

    #[test]
    fn test_ground_staff_before_deboarding() {
        let mut d = detector();
        for t in 0..4 {
            d.update(&[person_at(1, 1150.0 - 20.0 * t as f32)], &rois(), t as f64);
        }
        assert_eq!(d.status().ground_staff_prep, TaskStatus::Ongoing);
        assert_eq!(d.status().passenger_deboarding, TaskStatus::NotStarted);
        assert_eq!(d.status().passenger_boarding, TaskStatus::NotStarted);

        // 最后信号 t=3, 静默超过10秒
        d.update(&[], &rois(), 13.0);
        assert_eq!(d.status().ground_staff_prep, TaskStatus::Ongoing);
        d.update(&[], &rois(), 13.5);
        assert_eq!(d.status().ground_staff_prep, TaskStatus::Done);
    }

    #[test]
    fn test_boarding_needs_deboarding_done_and_sustained_signal() {
        let mut d = detector();
        for t in 0..4 {
            d.update(&[person_at(1, 950.0 + 20.0 * t as f32)], &rois(), t as f64);
        }
        // 下客进行中: 右→左 不算上客
        for t in 4..20 {
            let x = 1150.0 - 10.0 * (t - 4) as f32;
            d.update(&[person_at(2, x)], &rois(), t as f64);
        }
        assert_eq!(d.status().passenger_boarding, TaskStatus::NotStarted);

        d.update(&[], &rois(), 60.0);
        assert_eq!(d.status().passenger_deboarding, TaskStatus::Done);

        let mut started_at = None;
        for t in 61..80 {
            let x = 1150.0 - 8.0 * (t - 61) as f32;
            let s = d.update(&[person_at(3, x)], &rois(), t as f64);
            if s.passenger_boarding == TaskStatus::Started && started_at.is_none() {
                started_at = Some(t);
            }
        }
        // 第一个方向信号在 t=63, 持续10秒
        assert_eq!(started_at, Some(73));
        assert_eq!(d.status().passenger_boarding, TaskStatus::Ongoing);
    }

    #[test]
    fn test_no_roi_keeps_status() {
        let mut d = detector();
        for t in 0..4 {
            d.update(&[person_at(1, 950.0 + 20.0 * t as f32)], &rois(), t as f64);
        }
        let before = d.status();
        let after = d.update(&[], &RoiSet::new(), 200.0);
        assert_eq!(before, after);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut d = detector();
        for t in 0..4 {
            d.update(&[person_at(1, 950.0 + 20.0 * t as f32)], &rois(), t as f64);
        }
        d.reset();
        assert_eq!(d.status(), PassengerFlowStatus::default());
        assert_eq!(d.tracked_people(), 0);
    }
}
