//! 错误分类 (Error taxonomy)
//!
//! - Perception:      无帧/检测失败 → 本周期视为无目标,不致命
//! - ActuatorCommand: 单次飞控调用失败 → 记录日志,本周期无指令,下周期自然重发
//! - SafetyViolation: 安全违规 → 驱动飞行模式切换,绝不静默丢弃
//! - Initialization:  连接/GPS/解锁/起飞前置条件不满足 → 中止启动流程

use thiserror::Error;

use crate::safety::Severity;

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("perception failure: {0}")]
    Perception(String),

    #[error("actuator command `{command}` failed: {reason}")]
    ActuatorCommand {
        command: &'static str,
        reason: String,
    },

    #[error("safety violation ({severity:?}): {reason}")]
    SafetyViolation { severity: Severity, reason: String },

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PilotError {
    pub fn actuator(command: &'static str, reason: impl Into<String>) -> Self {
        PilotError::ActuatorCommand {
            command,
            reason: reason.into(),
        }
    }

    /// 组件级故障 (感知/单次飞控调用) 由循环吸收,不向上传播
    pub fn is_absorbable(&self) -> bool {
        matches!(
            self,
            PilotError::Perception(_) | PilotError::ActuatorCommand { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PilotError>;
