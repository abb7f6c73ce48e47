//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use franka_sdk::prelude::*;
//! ```

// 会话
pub use crate::client::{Robot, SessionConfig, RealtimeConfig, CombinationMode, LoopPhase};

// 回调输入 / 输出
pub use crate::protocol::{
    CartesianPose, CartesianVelocities, Command, ControllerFault, JointValues, JointVelocities,
    MotionGeneratorKind, RobotState, Torques,
};

// 错误类型
pub use crate::client::{ErrorKind, FrankaError};
