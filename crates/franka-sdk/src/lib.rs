//! Franka SDK - 机械臂控制器会话 Rust SDK
//!
//! 与机械臂控制器建立会话、协商协议版本，并以固定周期交换
//! 机器人状态与用户计算的命令（关节力矩 / 运动生成器设定值）。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 消息编码/解码
//! - **传输层** (`net`): TCP 服务通道 + UDP 实时通道
//! - **客户端层** (`client`): 会话、握手、控制循环
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use franka_sdk::prelude::*;
//!
//! franka_sdk::init_logger();
//! let mut robot = Robot::connect("172.16.0.2", RealtimeConfig::Enforce)?;
//! let state = robot.read_once()?;
//! robot.control_joint_positions(move |_, _| JointValues::new(state.q).finished())?;
//! # Ok::<(), FrankaError>(())
//! ```

pub use franka_client as client;
pub use franka_net as net;
pub use franka_protocol as protocol;

pub mod prelude;

pub use client::{
    CombinationMode, ErrorKind, FrankaError, RealtimeConfig, Result, Robot, SessionConfig,
};
pub use protocol::{PROTOCOL_VERSION, ProtocolError};

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGER: Once = Once::new();

/// 初始化日志
///
/// 安装 `tracing-subscriber` fmt 订阅者，过滤规则取自 `RUST_LOG`
/// （未设置时为 `info`），并把 `log` 记录桥接到 `tracing`。
/// 多次调用只生效一次；已有全局订阅者时不覆盖。
pub fn init_logger() {
    LOGGER.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            let _ = tracing_log::LogTracer::init();
        }
    });
}
