/// 检测与跟踪 (Detection & Tracking)
///
/// - types:    检测框与检测结果
/// - geometry: IOU 与 ROI 判定
/// - tracker:  目标追踪 (同类别贪心IOU匹配)
pub mod geometry;
pub mod tracker;
pub mod types;

pub use geometry::{compute_iou, parse_roi, Roi, RoiSet};
pub use tracker::{IouTracker, Track, Tracker};
pub use types::{BBox, Detection, TrackedDetection, PERSON_CLASS};
