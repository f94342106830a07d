/// 检测数据结构定义
/// Data structures shared by the tracker and every downstream stage
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 行人类别名 (安全任务与客流检测使用)
pub const PERSON_CLASS: &str = "person";

// ========== 数据结构 ==========

/// 检测框 (x1, y1, x2, y2), 像素坐标
///
/// 构造时保证 `x1 <= x2`, `y1 <= y2`; 序列化为 `[x1, y1, x2, y2]`
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 中心点 (ROI判定只看中心点, 不看角点)
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 平移 (demo 与测试用)
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// 单帧检测结果 (外部检测器 → 引擎), 不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_name == PERSON_CLASS
    }
}

/// 带跟踪ID的检测 (跟踪器 → 下游各模块, 只读)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    /// 唯一跟踪ID (>= 1, 存活轨迹之间不重复)
    pub track_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl TrackedDetection {
    pub fn new(track_id: u32, det: &Detection) -> Self {
        Self {
            track_id,
            class_name: det.class_name.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    pub fn is_class(&self, class_name: &str) -> bool {
        self.class_name == class_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_normalizes_corners() {
        let b = BBox::new(200.0, 180.0, 100.0, 120.0);
        assert_eq!(b, BBox::new(100.0, 120.0, 200.0, 180.0));
        assert_eq!(b.width(), 100.0);
        assert_eq!(b.height(), 60.0);
        assert_eq!(b.center(), (150.0, 150.0));
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let det = Detection::new("truck", 0.9, BBox::new(1.0, 2.0, 3.0, 4.0));
        let json = serde_json::to_string(&det).unwrap();
        assert!(json.contains("\"bbox\":[1.0,2.0,3.0,4.0]"));

        let back: Detection =
            serde_json::from_str(r#"{"class_name":"car","confidence":0.5,"bbox":[30,40,10,20]}"#)
                .unwrap();
        assert_eq!(back.bbox, BBox::new(10.0, 20.0, 30.0, 40.0));
    }

    #[test]
    fn test_confidence_clamped() {
        let det = Detection::new("person", 1.7, BBox::default());
        assert_eq!(det.confidence, 1.0);
        assert!(det.is_person());
    }
}
