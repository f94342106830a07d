//! 廊桥位置检测
//! Fingerdock: NOT_CONNECTED → OPERATING → CONNECTED
//!
//! 没有专用模型时, 廊桥常被识别为 truck/bus/train; 通过中心点位移判断是否在移动。

use serde::Serialize;
use tracing::info;

use crate::config::FingerdockConfig;
use crate::detection::{RoiSet, TrackedDetection};
use crate::tasks::TaskStatus;

pub const FINGERDOCK_TASK: &str = "fingerdock";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FingerdockState {
    pub status: TaskStatus,
    pub first_detected: Option<f64>,
    pub connected_at: Option<f64>,
    pub last_position: Option<(f32, f32)>,
    pub last_position_time: Option<f64>,
    pub is_moving: bool,
}

impl Default for FingerdockState {
    fn default() -> Self {
        Self {
            status: TaskStatus::NotConnected,
            first_detected: None,
            connected_at: None,
            last_position: None,
            last_position_time: None,
            is_moving: false,
        }
    }
}

pub struct FingerdockDetector {
    config: FingerdockConfig,
    state: FingerdockState,
}

impl FingerdockDetector {
    pub fn new(config: &FingerdockConfig) -> Self {
        Self {
            config: config.clone(),
            state: FingerdockState::default(),
        }
    }

    pub fn state(&self) -> &FingerdockState {
        &self.state
    }

    /// 尚未看到廊桥时不写任务存储
    pub fn has_sighting(&self) -> bool {
        self.state.first_detected.is_some()
    }

    pub fn reset(&mut self) {
        self.state = FingerdockState::default();
    }

    /// ROI内第一个候选目标的中心点
    fn locate(&self, tracked: &[TrackedDetection], rois: &RoiSet) -> Option<(f32, f32)> {
        let roi = rois.get(&self.config.roi)?;
        tracked
            .iter()
            .find(|det| {
                self.config.classes.iter().any(|c| det.is_class(c)) && roi.contains_center(&det.bbox)
            })
            .map(|det| det.center())
    }

    pub fn update(&mut self, tracked: &[TrackedDetection], rois: &RoiSet, now_t: f64) -> TaskStatus {
        // 无ROI/无候选: 保持上次状态
        let Some(position) = self.locate(tracked, rois) else {
            return self.state.status;
        };
        if self.state.status == TaskStatus::Connected {
            return self.state.status;
        }

        let previous = self.state.status;
        let state = &mut self.state;

        match (state.first_detected, state.last_position) {
            (Some(first), Some(last)) => {
                let dx = position.0 - last.0;
                let dy = position.1 - last.1;
                let distance = (dx * dx + dy * dy).sqrt();

                if distance > self.config.movement_px {
                    state.is_moving = true;
                    state.status = TaskStatus::Operating;
                    state.last_position = Some(position);
                    state.last_position_time = Some(now_t);
                } else if state.is_moving {
                    // 移动后停止: 静止足够久才算连接
                    let stationary = now_t - state.last_position_time.unwrap_or(now_t);
                    if stationary >= self.config.settle_sec {
                        state.status = TaskStatus::Connected;
                        state.is_moving = false;
                    } else {
                        state.status = TaskStatus::Operating;
                    }
                } else if state.status == TaskStatus::NotConnected
                    && self.config.assume_connected_when_static
                    && now_t - first >= self.config.assume_connected_after_sec
                {
                    // 从未移动: 检测开始前可能已经连接
                    state.status = TaskStatus::Connected;
                }
            }
            _ => {
                state.first_detected = Some(now_t);
                state.last_position = Some(position);
                state.last_position_time = Some(now_t);
                state.status = TaskStatus::NotConnected;
            }
        }

        if state.status == TaskStatus::Connected && state.connected_at.is_none() {
            state.connected_at = Some(now_t);
        }
        if state.status != previous {
            info!(from = %previous, to = %state.status, t = now_t, "🛬 廊桥状态变化");
        }
        state.status
    }
}
