//! 多目标跟踪
//! Class-gated greedy IoU tracker
//!
//! 核心思想:
//! 1. 只与同类别轨迹匹配 (卡车与小汽车重叠时不会互换ID)
//! 2. 按检测输入顺序贪心选取IOU最大的未匹配轨迹
//! 3. 连续丢失超过 `max_missed` 帧的轨迹被删除, ID永不复用

use std::collections::BTreeMap;

use tracing::debug;

use super::geometry::compute_iou;
use super::types::{BBox, Detection, TrackedDetection};

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 更新跟踪器 (每帧调用一次)
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测框, 按输入顺序处理
    ///
    /// # 返回
    /// 与输入一一对应的带ID检测
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackedDetection>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 轨迹 ==========

/// 跟踪器内部轨迹; 类别在生命周期内不变
#[derive(Clone, Debug)]
pub struct Track {
    pub track_id: u32,
    pub last_bbox: BBox,
    pub class_name: String,
    /// 连续未匹配帧数
    pub missed_count: u32,
}

// ========== IOU 跟踪器 ==========

pub struct IouTracker {
    /// 按ID排序, 保证同分时的匹配顺序确定
    tracks: BTreeMap<u32, Track>,

    /// 下一个分配的ID (单调递增)
    next_id: u32,

    /// 匹配所需最小IOU
    iou_match_threshold: f32,

    /// 最大允许丢失帧数
    max_missed: u32,
}

impl IouTracker {
    pub fn new(iou_match_threshold: f32, max_missed: u32) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            iou_match_threshold,
            max_missed,
        }
    }

    pub fn track(&self, track_id: u32) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// 在同类别、本帧未匹配的轨迹中寻找IOU最大者
    fn best_match(&self, det: &Detection, matched: &[u32]) -> Option<(u32, f32)> {
        let mut best: Option<(u32, f32)> = None;
        for (tid, track) in &self.tracks {
            if matched.contains(tid) || track.class_name != det.class_name {
                continue;
            }
            let iou = compute_iou(&det.bbox, &track.last_bbox);
            let better = match best {
                Some((_, best_iou)) => iou > best_iou,
                None => iou > 0.0,
            };
            if better {
                best = Some((*tid, iou));
            }
        }
        best
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(0.35, 10)
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackedDetection> {
        // 1. 所有轨迹先累计丢失帧, 删除丢失太久的轨迹
        for track in self.tracks.values_mut() {
            track.missed_count += 1;
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|tid, t| {
            let keep = t.missed_count <= max_missed;
            if !keep {
                debug!(track_id = tid, class = %t.class_name, "轨迹丢失, 删除");
            }
            keep
        });

        // 2. 按输入顺序贪心匹配
        let mut matched: Vec<u32> = Vec::with_capacity(detections.len());
        let mut output = Vec::with_capacity(detections.len());

        for det in detections {
            let track_id = match self.best_match(det, &matched) {
                Some((tid, iou)) if iou >= self.iou_match_threshold => {
                    if let Some(track) = self.tracks.get_mut(&tid) {
                        track.last_bbox = det.bbox;
                        track.missed_count = 0;
                    }
                    tid
                }
                _ => {
                    // 3. 未匹配 → 新建轨迹
                    let tid = self.next_id;
                    self.next_id += 1;
                    self.tracks.insert(
                        tid,
                        Track {
                            track_id: tid,
                            last_bbox: det.bbox,
                            class_name: det.class_name.clone(),
                            missed_count: 0,
                        },
                    );
                    debug!(track_id = tid, class = %det.class_name, "新建轨迹");
                    tid
                }
            };
            matched.push(track_id);
            output.push(TrackedDetection::new(track_id, det));
        }

        output
    }

    fn reset(&mut self) {
        // ID计数不回退, 重置后也不会复用旧ID
        self.tracks.clear();
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
