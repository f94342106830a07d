//! 迟滞去抖 (Hysteresis debounce)
//!
//! 连续 on_n 次为真才翻转为真, 连续 off_n 次为假才翻转为假;
//! 其间视为"不稳定", 调用方保持原状态。

use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DebounceCounter {
    /// 连续为真次数
    pub on: u32,
    /// 连续为假次数
    pub off: u32,
    /// 最近一次稳定值
    pub last: Option<bool>,
}

impl DebounceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入一次原始观测, 返回稳定值 (None = 不稳定)
    pub fn observe(&mut self, raw: bool, on_n: u32, off_n: u32) -> Option<bool> {
        if raw {
            self.on = self.on.saturating_add(1);
            self.off = 0;
        } else {
            self.off = self.off.saturating_add(1);
            self.on = 0;
        }

        let stable = if self.on >= on_n.max(1) {
            Some(true)
        } else if self.off >= off_n.max(1) {
            Some(false)
        } else {
            None
        };

        if stable.is_some() {
            self.last = stable;
        }
        stable
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
