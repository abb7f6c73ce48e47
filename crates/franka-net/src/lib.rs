//! # Franka Transport Layer
//!
//! 控制器会话的传输层抽象。
//!
//! 会话使用两条通道：
//!
//! - **Service**：TCP，承载一次性握手，帧格式为 `u32` (LE) 长度前缀 + 消息
//! - **Realtime**：UDP，承载每周期的 State / Command 数据报
//!
//! 上层只依赖 `Transport` / `Connector` trait，便于在测试中替换为
//! `MockTransport`（需要启用 `mock` feature）。

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod network;

pub use network::{ConnectOptions, NetworkConnector, NetworkTransport};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockConnector, MockTransport, ScriptedReply, SentLog};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Receive timeout after {0:?}")]
    Timeout(Duration),
    #[error("Connection closed by peer")]
    Closed,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Realtime peer unknown: no datagram received yet")]
    NoPeer,
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
}

impl NetError {
    /// 是否为接收超时（错过周期截止时间）
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout(_))
    }
}

/// 逻辑通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// 服务通道（握手）
    Service,
    /// 实时通道（State / Command）
    Realtime,
}

/// 与控制器之间的双向消息链路
///
/// 每次 `send` / `receive` 处理一条完整消息，分帧由实现负责。
pub trait Transport {
    /// 在指定通道上发送一条消息
    fn send(&mut self, channel: Channel, message: &[u8]) -> Result<(), NetError>;

    /// 在指定通道上接收一条消息，超过 `timeout` 返回 `NetError::Timeout`
    fn receive(&mut self, channel: Channel, timeout: Duration) -> Result<Bytes, NetError>;

    /// 本地实时通道端口（握手时告知控制器）
    fn realtime_port(&self) -> u16;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, channel: Channel, message: &[u8]) -> Result<(), NetError> {
        (**self).send(channel, message)
    }

    fn receive(&mut self, channel: Channel, timeout: Duration) -> Result<Bytes, NetError> {
        (**self).receive(channel, timeout)
    }

    fn realtime_port(&self) -> u16 {
        (**self).realtime_port()
    }
}

/// 传输工厂
///
/// 会话持有 `Connector`，从而可以在 `NetworkFailure` 之后重新建立链路。
pub trait Connector {
    type Transport: Transport;

    /// 打开到 `address` 的链路
    fn connect(&mut self, address: &str) -> Result<Self::Transport, NetError>;
}
