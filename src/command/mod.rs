/// 指令系统 (Command System)
///
/// 目标 → 归一化意图 → 平滑 → 物理速度指令
/// - CommandGenerator: 位置/尺寸 → Intent (含死区)
/// - TemporalSmoother: 基于跟踪历史的简单低通
/// - VelocityCommand:  Intent 映射到机体速度并裁剪
pub mod generator;
pub mod intent;
pub mod smoother;

pub use generator::{CommandConfig, CommandGenerator};
pub use intent::{
    CommandHistory, Intent, VelocityCommand, VelocityLimits, FORWARD_LIMIT, LATERAL_LIMIT,
    VERTICAL_LIMIT, YAW_LIMIT,
};
pub use smoother::{SmoothingConfig, TemporalSmoother};
