//! 命令组合模式
//!
//! 一次 control/read 调用中，哪些回调槽位被占用。

use franka_protocol::{CommandKind, MotionGeneratorKind};

/// 命令组合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombinationMode {
    /// 只读循环，不发送命令
    ReadOnly,
    /// 仅力矩回调
    TorqueOnly,
    /// 仅运动生成器回调
    Motion(MotionGeneratorKind),
    /// 运动生成器 + 力矩叠加
    MotionWithTorque(MotionGeneratorKind),
}

impl CombinationMode {
    /// 由槽位占用情况构造
    pub fn new(motion: Option<MotionGeneratorKind>, torque: bool) -> Self {
        match (motion, torque) {
            (None, false) => CombinationMode::ReadOnly,
            (None, true) => CombinationMode::TorqueOnly,
            (Some(kind), false) => CombinationMode::Motion(kind),
            (Some(kind), true) => CombinationMode::MotionWithTorque(kind),
        }
    }

    pub fn motion_kind(self) -> Option<MotionGeneratorKind> {
        match self {
            CombinationMode::Motion(kind) | CombinationMode::MotionWithTorque(kind) => Some(kind),
            CombinationMode::ReadOnly | CombinationMode::TorqueOnly => None,
        }
    }

    pub fn uses_torque(self) -> bool {
        matches!(
            self,
            CombinationMode::TorqueOnly | CombinationMode::MotionWithTorque(_)
        )
    }

    pub fn is_read_only(self) -> bool {
        self == CombinationMode::ReadOnly
    }

    /// 运动槽期望的命令类型
    pub fn expected_motion(self) -> Option<CommandKind> {
        self.motion_kind().map(CommandKind::Motion)
    }
}

impl std::fmt::Display for CombinationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombinationMode::ReadOnly => write!(f, "read-only"),
            CombinationMode::TorqueOnly => write!(f, "torque"),
            CombinationMode::Motion(kind) => write!(f, "{:?}", kind),
            CombinationMode::MotionWithTorque(kind) => write!(f, "{:?} + torque", kind),
        }
    }
}
