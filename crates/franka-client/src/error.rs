//! 会话错误类型
//!
//! 所有失败统一为 `FrankaError { kind, message }`，`kind` 区分失败来源：
//!
//! | kind | 来源 | 会话是否可继续 |
//! |---|---|---|
//! | `Network` | 链路断开、超时、收发失败 | 可 `reconnect()` |
//! | `Protocol` | 消息结构异常 | 否 |
//! | `IncompatibleVersion` | 握手版本不一致 | 否 |
//! | `Control` | 回调产生非法命令 / 控制器拒绝运动 | 链路仍可用 |
//! | `Realtime` | `Enforce` 下无法提升调度优先级 | 链路仍可用 |
//! | `ModelLibrary` | 模型库加载/符号查找失败 | 与会话无关 |
//! | `InvalidArgument` | 调用前置条件不满足 | 链路仍可用 |
//!
//! 会话从不自动重试，是否重连由调用方决定。

use crate::config::ConfigError;
use crate::library::LibraryError;
use franka_net::NetError;
use franka_protocol::ProtocolError;
use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Protocol,
    IncompatibleVersion,
    Control,
    Realtime,
    ModelLibrary,
    InvalidArgument,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorKind::Network => "network failure",
            ErrorKind::Protocol => "protocol failure",
            ErrorKind::IncompatibleVersion => "incompatible version",
            ErrorKind::Control => "control failure",
            ErrorKind::Realtime => "realtime failure",
            ErrorKind::ModelLibrary => "model library failure",
            ErrorKind::InvalidArgument => "invalid argument",
        };
        f.write_str(text)
    }
}

/// 会话错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FrankaError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FrankaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn control(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Control, message)
    }

    pub fn realtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Realtime, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// 版本不一致，消息中同时给出双方版本
    pub fn incompatible_version(client: u16, server: u16) -> Self {
        Self::new(
            ErrorKind::IncompatibleVersion,
            format!(
                "incompatible library version (client: {}, server: {})",
                client, server
            ),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 调用方能否通过重连恢复
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    /// 发生后当前会话不可继续使用（只能丢弃）
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Protocol | ErrorKind::IncompatibleVersion
        )
    }
}

impl From<NetError> for FrankaError {
    fn from(err: NetError) -> Self {
        Self::network(err.to_string())
    }
}

impl From<ProtocolError> for FrankaError {
    fn from(err: ProtocolError) -> Self {
        Self::protocol(err.to_string())
    }
}

impl From<LibraryError> for FrankaError {
    fn from(err: LibraryError) -> Self {
        Self::new(ErrorKind::ModelLibrary, err.to_string())
    }
}

impl From<ConfigError> for FrankaError {
    fn from(err: ConfigError) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

/// 会话结果类型
pub type Result<T> = std::result::Result<T, FrankaError>;
