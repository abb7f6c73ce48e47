//! # Franka Protocol
//!
//! 控制器会话协议定义（无网络依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（版本号、关节数、消息长度）
//! - `header`: 消息头与消息类型
//! - `handshake`: 连接握手请求/响应
//! - `state`: 机器人状态解码（`RobotState`）
//! - `command`: 控制命令编码（`RobotCommand`）
//!
//! ## 字节序
//!
//! 协议所有整数与浮点数均使用小端字节序（Little Endian）。
//! 编码是确定性的：同一命令多次编码得到完全相同的字节序列。

pub mod command;
pub mod constants;
pub mod handshake;
pub mod header;
pub mod state;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use handshake::*;
pub use header::*;
pub use state::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated message: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid payload length for {kind:?}: expected {expected}, got {actual}")]
    InvalidLength {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown message kind: 0x{0:02X}")]
    UnknownKind(u8),

    #[error("Unexpected message kind: expected {expected:?}, got {actual:?}")]
    UnexpectedKind {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u8 },
}

/// 从切片读取固定长度的 `f64` 数组（小端）
///
/// 调用方必须保证 `buf` 中剩余字节足够。
pub(crate) fn get_f64_array<const N: usize>(buf: &mut impl bytes::Buf) -> [f64; N] {
    let mut values = [0.0; N];
    for value in values.iter_mut() {
        *value = buf.get_f64_le();
    }
    values
}

/// 写入 `f64` 切片（小端）
pub(crate) fn put_f64_slice(buf: &mut impl bytes::BufMut, values: &[f64]) {
    for &value in values {
        buf.put_f64_le(value);
    }
}
