/// 方向/位置流检测 (Directional flow detectors)
///
/// 各检测器只看一个ROI, 维护自己的历史, 输出写入同一个任务存储的阶段状态
pub mod fingerdock;
pub mod passenger;

pub use fingerdock::{FingerdockDetector, FingerdockState, FINGERDOCK_TASK};
pub use passenger::{
    Direction, PassengerFlowDetector, PassengerFlowStatus, BOARDING_TASK, DEBOARDING_TASK,
    GROUND_STAFF_TASK,
};
