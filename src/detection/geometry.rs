//! 几何工具: IOU、ROI 判定与解析
//! Geometry helpers shared by every stage of the engine

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::BBox;

/// "x1,y1,x2,y2" 格式 (允许空格与负号)
static ROI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d+)\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*$")
        .expect("ROI 正则无效")
});

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

// ========== ROI ==========

/// 感兴趣区域 (轴对齐矩形, x1<x2, y1<y2)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Roi {
    /// 坐标自动排序; 面积为零时返回 None
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    /// 点是否在ROI内 (含边界)
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }

    /// 检测框中心点是否在ROI内
    pub fn contains_center(&self, bbox: &BBox) -> bool {
        let (cx, cy) = bbox.center();
        self.contains_point(cx, cy)
    }
}

/// 解析 "x1,y1,x2,y2"; 格式错误或退化矩形返回 None (不报错)
pub fn parse_roi(text: &str) -> Option<Roi> {
    let caps = ROI_PATTERN.captures(text)?;
    let mut v = [0i64; 4];
    for (i, slot) in v.iter_mut().enumerate() {
        *slot = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    Roi::new(v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32)
}

/// 命名ROI集合 (每次运行静态不变)
#[derive(Clone, Debug, Default)]
pub struct RoiSet {
    rois: BTreeMap<String, Roi>,
}

impl RoiSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从文本配置构建; 无效条目视为未设置, 只警告一次
    pub fn from_text<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut set = Self::new();
        for (name, text) in entries {
            match parse_roi(text) {
                Some(roi) => {
                    set.rois.insert(name.clone(), roi);
                }
                None => warn!(roi = %name, text = %text, "ROI 无效, 视为未设置"),
            }
        }
        set
    }

    pub fn insert(&mut self, name: impl Into<String>, roi: Roi) {
        self.rois.insert(name.into(), roi);
    }

    pub fn get(&self, name: &str) -> Option<&Roi> {
        self.rois.get(name)
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Roi)> {
        self.rois.iter()
    }
}
