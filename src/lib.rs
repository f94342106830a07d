// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alerts; // 告警引擎 + 安全规则
pub mod config; // 引擎配置参数
pub mod demo; // 演示剧本
pub mod detection; // 检测结构、几何与跟踪
pub mod dispatcher; // 运行上下文与逐帧调度
pub mod event_log; // 事件日志
pub mod flow; // 客流/廊桥检测
pub mod replay; // 检测回放输入
pub mod roles; // 角色标注与交接
pub mod sequence; // 过站流程状态机
pub mod tasks; // 任务引擎

pub use crate::alerts::{AlertEngine, AlertIntent, AlertItem, AlertStatus, Severity};
pub use crate::config::EngineConfig;
pub use crate::detection::{BBox, Detection, IouTracker, Roi, RoiSet, TrackedDetection, Tracker};
pub use crate::dispatcher::{Dispatcher, ResetMode, RunSnapshot, TickReport};
pub use crate::event_log::{EventLevel, EventLog};
pub use crate::roles::{Role, RoleAssignment};
pub use crate::sequence::{SequenceMachine, SequenceState, StepLabel};
pub use crate::tasks::{TaskRecord, TaskStatus, TaskStore};

/// 本地时间字符串, 各字段以 `delimiter` 分隔 (用作 run_id)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_time_string() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 7);
    }
}
