//! 演示模式: 脚本化的过站场景
//!
//! 按固定剧本生成每帧检测 (可复现的随机抖动与漏检),
//! 并模拟操作员在车辆首次出现时标注角色。

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::detection::{BBox, Detection};
use crate::dispatcher::{Dispatcher, TickReport};
use crate::replay::FrameDetections;
use crate::roles::Role;

/// 剧本中的一个目标
#[derive(Clone, Debug)]
pub struct Actor {
    pub class_name: &'static str,
    pub role: Option<Role>,
    pub start: f64,
    pub end: f64,
    /// 出现时的中心点
    pub from: (f32, f32),
    /// 速度 (像素/秒)
    pub velocity: (f32, f32),
    /// 移动多久后停下 (None = 一直移动)
    pub move_for: Option<f64>,
    pub size: (f32, f32),
}

impl Actor {
    fn fixed(class_name: &'static str, role: Option<Role>, span: (f64, f64), at: (f32, f32), size: (f32, f32)) -> Self {
        Self {
            class_name,
            role,
            start: span.0,
            end: span.1,
            from: at,
            velocity: (0.0, 0.0),
            move_for: None,
            size,
        }
    }

    fn walker(start: f64, from: (f32, f32), vx: f32) -> Self {
        Self {
            class_name: "person",
            role: None,
            start,
            end: start + 15.0,
            from,
            velocity: (vx, 0.0),
            move_for: None,
            size: (40.0, 90.0),
        }
    }

    pub fn visible_at(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    pub fn center_at(&self, t: f64) -> (f32, f32) {
        let mut elapsed = (t - self.start).max(0.0);
        if let Some(limit) = self.move_for {
            elapsed = elapsed.min(limit);
        }
        let e = elapsed as f32;
        (self.from.0 + self.velocity.0 * e, self.from.1 + self.velocity.1 * e)
    }
}

/// 默认剧本 (坐标对应默认ROI布局)
pub fn turnaround_script() -> Vec<Actor> {
    let mut actors = vec![
        // 廊桥: 先移动8秒再停靠
        Actor {
            class_name: "bus",
            role: None,
            start: 0.0,
            end: f64::INFINITY,
            from: (1060.0, 330.0),
            velocity: (-20.0, 0.0),
            move_for: Some(8.0),
            size: (120.0, 140.0),
        },
        // 开门前的地勤 (右→左)
        Actor {
            end: 6.0,
            ..Actor::walker(0.0, (1100.0, 270.0), -12.0)
        },
        Actor::fixed("truck", Some(Role::GpuTruck), (20.0, 70.0), (440.0, 400.0), (140.0, 90.0)),
        Actor::fixed("truck", Some(Role::FuelTruck), (40.0, 110.0), (790.0, 440.0), (160.0, 90.0)),
        Actor::fixed("truck", Some(Role::BeltLoader), (85.0, 150.0), (380.0, 560.0), (150.0, 80.0)),
        // 发动机区域闯入
        Actor::fixed("person", None, (95.0, 101.0), (470.0, 430.0), (40.0, 90.0)),
        // 推出区域有人
        Actor::fixed("person", None, (190.0, 196.0), (220.0, 550.0), (40.0, 90.0)),
        Actor::fixed("truck", Some(Role::PushbackTug), (200.0, 260.0), (420.0, 620.0), (120.0, 70.0)),
    ];

    // 下客: 左→右
    for k in 0..6 {
        actors.push(Actor::walker(5.0 + 6.0 * k as f64, (930.0, 260.0), 12.0));
    }
    // 上客: 右→左
    for k in 0..12 {
        actors.push(Actor::walker(110.0 + 5.0 * k as f64, (1110.0, 250.0), -12.0));
    }
    actors
}

/// 一帧演示数据: 检测 + 对应的角色提示 (一一对应)
#[derive(Clone, Debug)]
pub struct DemoFrame {
    pub frame: FrameDetections,
    pub role_hints: Vec<Option<Role>>,
}

pub struct DemoScript {
    actors: Vec<Actor>,
    rng: StdRng,
    fps: f64,
    jitter_px: f32,
    dropout: f64,
}

impl DemoScript {
    pub fn new(seed: u64, fps: f64) -> Self {
        Self::with_actors(turnaround_script(), seed, fps)
    }

    pub fn with_actors(actors: Vec<Actor>, seed: u64, fps: f64) -> Self {
        Self {
            actors,
            rng: StdRng::seed_from_u64(seed),
            fps: if fps > 0.0 { fps } else { 1.0 },
            jitter_px: 2.0,
            dropout: 0.03,
        }
    }

    /// 关闭抖动与漏检 (测试用)
    pub fn without_noise(mut self) -> Self {
        self.jitter_px = 0.0;
        self.dropout = 0.0;
        self
    }

    pub fn generate(&mut self, frame_idx: u64) -> DemoFrame {
        let t = frame_idx as f64 / self.fps;
        let mut detections = Vec::new();
        let mut role_hints = Vec::new();

        for actor in &self.actors {
            if !actor.visible_at(t) {
                continue;
            }
            if self.dropout > 0.0 && self.rng.gen_bool(self.dropout) {
                continue;
            }
            let (mut cx, mut cy) = actor.center_at(t);
            if self.jitter_px > 0.0 {
                cx += self.rng.gen_range(-self.jitter_px..=self.jitter_px);
                cy += self.rng.gen_range(-self.jitter_px..=self.jitter_px);
            }
            let (w, h) = actor.size;
            let confidence = self.rng.gen_range(0.55f32..0.95);
            detections.push(Detection::new(
                actor.class_name,
                confidence,
                BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            ));
            role_hints.push(actor.role);
        }

        DemoFrame {
            frame: FrameDetections {
                frame: frame_idx,
                t_sec: Some(t),
                detections,
            },
            role_hints,
        }
    }

    pub fn frames(mut self, count: u64) -> impl Iterator<Item = DemoFrame> {
        (0..count).map(move |i| self.generate(i))
    }
}

/// 模拟操作员: 每个角色只在首次看到时标注一次, 之后依赖角色交接
#[derive(Default)]
pub struct DemoOperator {
    tagged: BTreeSet<Role>,
}

impl DemoOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回本帧新标注的数量
    pub fn observe(&mut self, dispatcher: &mut Dispatcher, report: &TickReport, hints: &[Option<Role>]) -> usize {
        let mut count = 0;
        for (det, hint) in report.tracked.iter().zip(hints) {
            let Some(role) = *hint else { continue };
            if self.tagged.contains(&role) || dispatcher.roles().role_of(det.track_id).is_assigned() {
                continue;
            }
            info!(track_id = det.track_id, %role, "👷 模拟操作员标注");
            dispatcher.assign_role(det.track_id, role);
            self.tagged.insert(role);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_frames() {
        let a: Vec<_> = DemoScript::new(7, 1.0).frames(30).map(|f| f.frame).collect();
        let b: Vec<_> = DemoScript::new(7, 1.0).frames(30).map(|f| f.frame).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_actor_motion() {
        let bus = &turnaround_script()[0];
        assert_eq!(bus.center_at(0.0), (1060.0, 330.0));
        assert_eq!(bus.center_at(4.0), (980.0, 330.0));
        assert_eq!(bus.center_at(30.0), (900.0, 330.0));
    }

    #[test]
    fn test_hints_align_with_detections() {
        let mut script = DemoScript::new(1, 1.0).without_noise();
        let frame = script.generate(45);
        assert_eq!(frame.frame.detections.len(), frame.role_hints.len());
        assert!(frame.role_hints.contains(&Some(Role::GpuTruck)));
        assert!(frame.role_hints.contains(&Some(Role::FuelTruck)));
    }

    #[test]
    fn test_operator_tags_once() {
        let mut dispatcher = Dispatcher::new(crate::config::EngineConfig::default());
        let mut operator = DemoOperator::new();
        let mut script = DemoScript::new(3, 1.0).without_noise();

        let mut total = 0;
        for i in 20..25 {
            let f = script.generate(i);
            let report = dispatcher.tick_frame(i, &f.frame.detections);
            total += operator.observe(&mut dispatcher, &report, &f.role_hints);
        }
        assert_eq!(total, 1);
        assert_eq!(dispatcher.roles().tracks_with(Role::GpuTruck).count(), 1);
    }
}
