//! 引擎配置 - 通过JSON文件调整参数
//! Engine configuration, loaded from / saved to a JSON file

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::RoiSet;

// ========== 分组参数 ==========

/// 跟踪器参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_match_threshold: f32, // 同类别匹配最小IOU
    pub max_missed: u32,          // 最大丢失帧数
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_match_threshold: 0.25,
            max_missed: 40,
        }
    }
}

/// 角色交接参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub iou_threshold: f32, // 记忆框与候选框最小IOU
    pub max_age_sec: f64,   // 记忆有效期(秒)
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.20,
            max_age_sec: 8.0,
        }
    }
}

/// 去抖参数 (连续N次相同观测才切换)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub on_n: u32,
    pub off_n: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { on_n: 3, off_n: 3 }
    }
}

/// 流程状态机参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// ACTIVE 持续多久后停止才算完成
    pub min_active_sec_for_done: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            min_active_sec_for_done: 6.0,
        }
    }
}

/// 客流方向检测参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PassengerFlowConfig {
    pub roi: String,                      // 使用的ROI名称
    pub history_len: usize,               // 每个轨迹保留的位置数
    pub min_samples: usize,               // 判断方向所需最少样本
    pub px_per_frame_threshold: f32,      // 平均位移阈值(像素/帧)
    pub stale_track_sec: f64,             // 轨迹多久不见则清除
    pub ground_staff_quiet_sec: f64,      // 地勤准备: 静默多久算完成
    pub deboarding_timeout_sec: f64,      // 下客: 静默多久算完成
    pub boarding_sustain_sec: f64,        // 上客: 持续多久才确认开始
    pub boarding_gap_sec: f64,            // 上客: 信号中断多久重新计时
    pub boarding_requires_deboarding_done: bool,
}

impl Default for PassengerFlowConfig {
    fn default() -> Self {
        Self {
            roi: "passenger_door".to_string(),
            history_len: 10,
            min_samples: 3,
            px_per_frame_threshold: 5.0,
            stale_track_sec: 5.0,
            ground_staff_quiet_sec: 10.0,
            deboarding_timeout_sec: 50.0,
            boarding_sustain_sec: 10.0,
            boarding_gap_sec: 10.0,
            boarding_requires_deboarding_done: true,
        }
    }
}

/// 廊桥检测参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerdockConfig {
    pub roi: String,
    pub classes: Vec<String>,             // 廊桥可能被识别为的大型车辆类别
    pub movement_px: f32,                 // 中心点位移超过此值视为移动
    pub settle_sec: f64,                  // 移动后静止多久视为已连接
    pub assume_connected_after_sec: f64,  // 从未移动时, 可见多久视为已连接
    pub assume_connected_when_static: bool,
}

impl Default for FingerdockConfig {
    fn default() -> Self {
        Self {
            roi: "fingerdock".to_string(),
            classes: vec!["truck".into(), "bus".into(), "train".into()],
            movement_px: 15.0,
            settle_sec: 10.0,
            assume_connected_after_sec: 15.0,
            assume_connected_when_static: true,
        }
    }
}

// ========== 总配置 ==========

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 帧率: t_sec = frame_idx / fps
    pub fps: f64,
    pub event_log_capacity: usize,
    pub person_class: String,
    pub vehicle_classes: Vec<String>,

    pub tracker: TrackerConfig,
    pub handoff: HandoffConfig,
    pub debounce: DebounceConfig,
    pub sequence: SequenceConfig,
    pub passenger_flow: PassengerFlowConfig,
    pub fingerdock: FingerdockConfig,

    /// ROI名称 → "x1,y1,x2,y2"
    pub rois: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let rois = [
            ("nose", "260,250,620,520"),
            ("fuel", "620,170,980,520"),
            ("belly", "250,320,520,650"),
            ("aircraft", "250,120,980,690"),
            ("engine", "330,300,620,560"),
            ("pushback", "120,420,330,680"),
            ("passenger_door", "920,140,1120,380"),
            ("fingerdock", "820,160,1080,500"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            fps: 1.0,
            event_log_capacity: 500,
            person_class: "person".to_string(),
            vehicle_classes: vec!["truck".into(), "car".into(), "bus".into(), "train".into()],
            tracker: TrackerConfig::default(),
            handoff: HandoffConfig::default(),
            debounce: DebounceConfig::default(),
            sequence: SequenceConfig::default(),
            passenger_flow: PassengerFlowConfig::default(),
            fingerdock: FingerdockConfig::default(),
            rois,
        }
    }
}

impl EngineConfig {
    /// 默认配置路径: <config_dir>/turnaround/config.json
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("turnaround")
            .join("config.json")
    }

    /// 严格解析 (出错返回错误)
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("配置文件解析失败")
    }

    /// 从JSON文件加载配置; 不存在则创建默认配置, 解析失败则使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    info!(path = %path.display(), "✅ 配置已加载");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "⚠️ 配置文件解析失败, 使用默认值");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "📝 配置文件不存在, 创建默认配置");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!(error = %e, "❌ 保存默认配置失败");
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("创建目录失败: {}", dir.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入配置失败: {}", path.display()))?;
        info!(path = %path.display(), "💾 配置已保存");
        Ok(())
    }

    /// 解析ROI文本 (无效项只记录一次警告)
    pub fn roi_set(&self) -> RoiSet {
        RoiSet::from_text(&self.rois)
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            fps = self.fps,
            iou_match = self.tracker.iou_match_threshold,
            max_missed = self.tracker.max_missed,
            on_n = self.debounce.on_n,
            off_n = self.debounce.off_n,
            min_active_sec_for_done = self.sequence.min_active_sec_for_done,
            rois = self.rois.len(),
            "🎛️ 当前引擎配置"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.tracker.max_missed, 40);
        assert_eq!(config.debounce.on_n, 3);
        assert_eq!(config.rois.len(), 8);
        assert_eq!(config.roi_set().len(), 8);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            EngineConfig::from_json(r#"{"fps": 4.0, "debounce": {"on_n": 5}}"#).unwrap();
        assert_eq!(config.fps, 4.0);
        assert_eq!(config.debounce.on_n, 5);
        assert_eq!(config.debounce.off_n, 3);
        assert_eq!(config.handoff.max_age_sec, 8.0);
        assert!(config.fingerdock.assume_connected_when_static);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(EngineConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("turnaround-cfg-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = EngineConfig::default();
        config.sequence.min_active_sec_for_done = 9.5;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path);
        assert_eq!(loaded.sequence.min_active_sec_for_done, 9.5);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_creates_default() {
        let dir = std::env::temp_dir().join(format!("turnaround-miss-{}", std::process::id()));
        let path = dir.join("config.json");
        let _ = fs::remove_dir_all(&dir);
        let loaded = EngineConfig::load(&path);
        assert_eq!(loaded.tracker.max_missed, 40);
        assert!(path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
