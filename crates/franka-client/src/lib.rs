//! # Franka Client
//!
//! 控制器会话管理：连接与版本握手、实时控制循环、只读循环。
//!
//! ## 模块
//!
//! - `robot`: 会话门面 `Robot`（control / read / read_once / server_version）
//! - `handshake`: 版本协商
//! - `engine`: 控制循环状态机
//! - `mode`: 命令组合模式
//! - `realtime`: 实时调度适配
//! - `config`: 会话配置（TOML）
//! - `library`: 模型库加载
//! - `error`: 错误分类
//!
//! ## 使用场景
//!
//! 大多数用户只需要 `Robot` 的类型化入口（`control_torques`、
//! `control_joint_positions` 等）；需要按运行时选择组合模式时使用
//! `Robot::control_with_mode`。

pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod library;
pub mod mode;
pub mod realtime;
pub mod robot;

pub use config::{ConfigError, RealtimeConfig, SessionConfig};
pub use engine::{ControlLoop, CycleCallback, LoopPhase};
pub use error::{ErrorKind, FrankaError, Result};
pub use library::{LibraryError, LibraryLoader, LibraryProvider};
pub use mode::CombinationMode;
pub use realtime::{RealtimeScheduler, ThreadPriorityScheduler};
pub use robot::Robot;

// 回调中使用的协议类型
pub use franka_protocol::{
    CartesianPose, CartesianVelocities, Command, ControllerFault, JointValues, JointVelocities,
    MotionGeneratorKind, RobotState, ServerVersion, Torques,
};
