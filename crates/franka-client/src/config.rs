//! 会话配置
//!
//! 可直接构造，也可从 TOML 加载：
//!
//! ```toml
//! realtime = "ignore"
//! service_port = 1337
//! cycle_timeout_ms = 100
//! ```
//!
//! 未给出的字段使用默认值。

use franka_protocol::DEFAULT_SERVICE_PORT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 实时调度策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeConfig {
    /// 无法提升优先级时拒绝进入力矩控制循环
    #[default]
    Enforce,
    /// 无法提升优先级时以默认优先级继续
    Ignore,
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub realtime: RealtimeConfig,
    /// 服务通道端口（地址中未指定端口时使用）
    pub service_port: u16,
    /// 本地实时通道端口，0 表示由系统分配
    pub realtime_port: u16,
    pub connect_timeout_ms: u64,
    /// 等待握手响应的超时
    pub handshake_timeout_ms: u64,
    /// 每周期等待状态消息的截止时间
    pub cycle_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            realtime: RealtimeConfig::Enforce,
            service_port: DEFAULT_SERVICE_PORT,
            realtime_port: 0,
            connect_timeout_ms: 5000,
            handshake_timeout_ms: 5000,
            cycle_timeout_ms: 100,
        }
    }
}

impl SessionConfig {
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 校验：所有超时必须大于 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("cycle_timeout_ms", self.cycle_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}
